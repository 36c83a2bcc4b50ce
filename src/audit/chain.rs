//! Tamper-evident hash chain over audit events.
//!
//! Each event's digest covers its own content plus the previous event's
//! digest. Removing, reordering or editing any event breaks every digest
//! after it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::event::{AuditChannel, Details, EventDraft, SecurityEvent, ViolationKind};

/// Digest that the first event in a chain links to.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// A chain failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("event {sequence}: content does not match its digest")]
    DigestMismatch { sequence: u64 },
    #[error("event {sequence}: does not link to the previous event")]
    BrokenLink { sequence: u64 },
    #[error("expected sequence {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
}

/// Sequencer that seals drafts into chained events.
#[derive(Debug)]
pub struct AuditChain {
    next_sequence: u64,
    last_digest: String,
}

impl AuditChain {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            last_digest: GENESIS_DIGEST.to_string(),
        }
    }

    /// Assign id, timestamp and sequence, then compute the digest.
    pub fn seal(&mut self, draft: EventDraft) -> SecurityEvent {
        let mut event = SecurityEvent {
            id: Uuid::new_v4(),
            sequence: self.next_sequence,
            kind: draft.kind,
            channel: draft.channel,
            message: draft.message,
            timestamp: Utc::now(),
            client: draft.client,
            method: draft.method,
            uri: draft.uri,
            resource_id: draft.resource_id,
            request_id: draft.request_id,
            details: draft.details,
            previous_digest: self.last_digest.clone(),
            digest: String::new(),
        };
        event.digest = compute_digest(&event);

        self.next_sequence += 1;
        self.last_digest = event.digest.clone();
        event
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Every field except the digest itself, in a fixed order.
#[derive(Serialize)]
struct DigestInput<'a> {
    id: &'a Uuid,
    sequence: u64,
    kind: &'a ViolationKind,
    channel: &'a AuditChannel,
    message: &'a str,
    timestamp: &'a DateTime<Utc>,
    client: &'a str,
    method: &'a Option<String>,
    uri: &'a Option<String>,
    resource_id: Option<u64>,
    request_id: &'a Option<String>,
    details: &'a Details,
    previous_digest: &'a str,
}

/// Hex SHA-256 of an event's canonical JSON form, excluding its digest.
pub fn compute_digest(event: &SecurityEvent) -> String {
    let input = DigestInput {
        id: &event.id,
        sequence: event.sequence,
        kind: &event.kind,
        channel: &event.channel,
        message: &event.message,
        timestamp: &event.timestamp,
        client: &event.client,
        method: &event.method,
        uri: &event.uri,
        resource_id: event.resource_id,
        request_id: &event.request_id,
        details: &event.details,
        previous_digest: &event.previous_digest,
    };
    // Serializing plain strings, numbers and a BTreeMap cannot fail.
    let bytes = serde_json::to_vec(&input).unwrap_or_default();
    to_hex(&Sha256::digest(&bytes))
}

/// Check that `events` form an unbroken chain.
///
/// The first event's `previous_digest` is taken as the anchor, so a suffix of
/// a longer chain verifies on its own.
pub fn verify_chain(events: &[SecurityEvent]) -> Result<(), ChainError> {
    let Some(first) = events.first() else {
        return Ok(());
    };

    let mut expected_sequence = first.sequence;
    let mut expected_previous = first.previous_digest.as_str();

    for event in events {
        if event.sequence != expected_sequence {
            return Err(ChainError::SequenceGap {
                expected: expected_sequence,
                found: event.sequence,
            });
        }
        if event.previous_digest != expected_previous {
            return Err(ChainError::BrokenLink {
                sequence: event.sequence,
            });
        }
        if compute_digest(event) != event.digest {
            return Err(ChainError::DigestMismatch {
                sequence: event.sequence,
            });
        }
        expected_sequence += 1;
        expected_previous = event.digest.as_str();
    }
    Ok(())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(message: &str) -> EventDraft {
        EventDraft::new(
            ViolationKind::PathTraversal,
            AuditChannel::Violation,
            message,
            "10.0.0.1",
        )
        .uri("/api/files/../../etc/passwd")
    }

    fn chain_of(n: usize) -> Vec<SecurityEvent> {
        let mut chain = AuditChain::new();
        (0..n).map(|i| chain.seal(draft(&format!("event {i}")))).collect()
    }

    #[test]
    fn test_seal_links_events() {
        let events = chain_of(3);
        assert_eq!(events[0].previous_digest(), GENESIS_DIGEST);
        assert_eq!(events[1].previous_digest(), events[0].digest());
        assert_eq!(events[2].sequence(), 2);
        assert_eq!(events[0].digest().len(), 64);
        assert!(verify_chain(&events).is_ok());
    }

    #[test]
    fn test_edit_detected() {
        let mut events = chain_of(3);
        events[1].message = "nothing to see".into();
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::DigestMismatch { sequence: 1 })
        );
    }

    #[test]
    fn test_removal_detected() {
        let mut events = chain_of(4);
        events.remove(2);
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::SequenceGap {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_relinked_forgery_detected() {
        let mut events = chain_of(3);
        events[2].previous_digest = GENESIS_DIGEST.into();
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::BrokenLink { sequence: 2 })
        );
    }

    #[test]
    fn test_suffix_verifies() {
        let events = chain_of(5);
        assert!(verify_chain(&events[2..]).is_ok());
        assert!(verify_chain(&[]).is_ok());
    }

    #[test]
    fn test_survives_json_round_trip() {
        let events = chain_of(2);
        let json = serde_json::to_string(&events).unwrap();
        let back: Vec<SecurityEvent> = serde_json::from_str(&json).unwrap();
        assert!(verify_chain(&back).is_ok());
    }
}
