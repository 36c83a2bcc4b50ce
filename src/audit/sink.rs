//! Destinations for sealed security events.

use std::sync::Mutex;

use thiserror::Error;

use crate::audit::event::{AuditChannel, SecurityEvent, ViolationKind};

/// Tracing target used for the audit stream.
pub const AUDIT_TARGET: &str = "security_audit";

/// An event could not be delivered.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where audit events go.
///
/// `emit` runs while the logger holds the audit chain lock, so every audited
/// request waits on it. Implementations must return quickly; a sink backed by
/// slow I/O should queue the event and write it from its own task.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &SecurityEvent) -> Result<(), SinkError>;
}

/// Writes each event as a JSON payload on the `security_audit` tracing target.
///
/// Violations and faults log at `error`, suspicious activity and rate-limit
/// hits at `warn`, data access at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event)?;
        let kind = event.kind().as_str();
        let client = event.client();

        match event.channel() {
            AuditChannel::Violation | AuditChannel::Fault => {
                tracing::error!(target: AUDIT_TARGET, kind, client, event = %payload, "{}", event.message());
            }
            AuditChannel::Suspicious | AuditChannel::RateLimit => {
                tracing::warn!(target: AUDIT_TARGET, kind, client, event = %payload, "{}", event.message());
            }
            AuditChannel::DataAccess => {
                tracing::info!(target: AUDIT_TARGET, kind, client, event = %payload, "{}", event.message());
            }
        }
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.lock().clone()
    }

    pub fn of_kind(&self, kind: ViolationKind) -> Vec<SecurityEvent> {
        self.lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SecurityEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        self.lock().push(event.clone());
        Ok(())
    }
}
