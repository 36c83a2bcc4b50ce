//! Security event model.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest free-text value recorded in an event, in characters.
pub const MAX_FIELD_CHARS: usize = 512;

/// Extra key/value context attached to an event.
pub type Details = BTreeMap<String, String>;

/// What kind of security-relevant thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    InjectionAttempt,
    PathTraversal,
    SuspiciousUserAgent,
    SuspiciousHeaders,
    RateLimitExceeded,
    SensitiveDataAccess,
    InternalFault,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::InjectionAttempt => "INJECTION_ATTEMPT",
            ViolationKind::PathTraversal => "PATH_TRAVERSAL",
            ViolationKind::SuspiciousUserAgent => "SUSPICIOUS_USER_AGENT",
            ViolationKind::SuspiciousHeaders => "SUSPICIOUS_HEADERS",
            ViolationKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ViolationKind::SensitiveDataAccess => "SENSITIVE_DATA_ACCESS",
            ViolationKind::InternalFault => "INTERNAL_FAULT",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit channel an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditChannel {
    Violation,
    Suspicious,
    RateLimit,
    DataAccess,
    Fault,
}

/// An event before it has been sequenced and sealed into the chain.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub(crate) kind: ViolationKind,
    pub(crate) channel: AuditChannel,
    pub(crate) message: String,
    pub(crate) client: String,
    pub(crate) method: Option<String>,
    pub(crate) uri: Option<String>,
    pub(crate) resource_id: Option<u64>,
    pub(crate) request_id: Option<String>,
    pub(crate) details: Details,
}

impl EventDraft {
    pub fn new(kind: ViolationKind, channel: AuditChannel, message: &str, client: &str) -> Self {
        Self {
            kind,
            channel,
            message: bounded(message),
            client: bounded(client),
            method: None,
            uri: None,
            resource_id: None,
            request_id: None,
            details: Details::new(),
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(bounded(method));
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(bounded(uri));
        self
    }

    pub fn resource_id(mut self, id: Option<u64>) -> Self {
        self.resource_id = id;
        self
    }

    pub fn request_id(mut self, id: Option<&str>) -> Self {
        self.request_id = id.map(bounded);
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        for (key, value) in details {
            self.details.insert(bounded(&key), bounded(&value));
        }
        self
    }
}

/// A sealed, immutable security event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub(crate) id: Uuid,
    pub(crate) sequence: u64,
    pub(crate) kind: ViolationKind,
    pub(crate) channel: AuditChannel,
    pub(crate) message: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) client: String,
    pub(crate) method: Option<String>,
    pub(crate) uri: Option<String>,
    pub(crate) resource_id: Option<u64>,
    pub(crate) request_id: Option<String>,
    pub(crate) details: Details,
    pub(crate) previous_digest: String,
    pub(crate) digest: String,
}

impl SecurityEvent {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Position in the audit chain, starting at zero.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn channel(&self) -> AuditChannel {
        self.channel
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn resource_id(&self) -> Option<u64> {
        self.resource_id
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn previous_digest(&self) -> &str {
        &self.previous_digest
    }

    /// Hex SHA-256 over this event's content and the previous digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Truncate to [`MAX_FIELD_CHARS`] characters and drop control characters.
fn bounded(value: &str) -> String {
    let mut out: String = value
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FIELD_CHARS)
        .collect();
    if value.chars().filter(|c| !c.is_control()).count() > MAX_FIELD_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ViolationKind::SuspiciousUserAgent).unwrap();
        assert_eq!(json, "\"SUSPICIOUS_USER_AGENT\"");
        assert_eq!(ViolationKind::InjectionAttempt.to_string(), "INJECTION_ATTEMPT");
    }

    #[test]
    fn test_channel_serialization() {
        let json = serde_json::to_string(&AuditChannel::RateLimit).unwrap();
        assert_eq!(json, "\"rate-limit\"");
    }

    #[test]
    fn test_draft_bounds_fields() {
        let long = "x".repeat(MAX_FIELD_CHARS + 100);
        let draft = EventDraft::new(
            ViolationKind::InjectionAttempt,
            AuditChannel::Violation,
            "line\nbreak\r",
            "1.2.3.4",
        )
        .uri(&long);
        assert_eq!(draft.message, "linebreak");
        let uri = draft.uri.unwrap();
        assert_eq!(uri.chars().count(), MAX_FIELD_CHARS + 1);
        assert!(uri.ends_with('…'));
    }
}
