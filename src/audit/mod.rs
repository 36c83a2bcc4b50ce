//! Security audit subsystem.
//!
//! # Data Flow
//! ```text
//! interceptor decision
//!     → logger.rs (build EventDraft, resolve client)
//!     → chain.rs (sequence, timestamp, SHA-256 link to previous event)
//!     → sink.rs (tracing target "security_audit", or memory for tests)
//! ```
//!
//! # Design Decisions
//! - Logging never fails the request; sink errors are logged and counted
//! - Free-text fields are bounded and stripped of control characters
//! - Events are chained so that edits and deletions are detectable offline

pub mod chain;
pub mod event;
pub mod logger;
pub mod sink;

pub use chain::{verify_chain, AuditChain, ChainError, GENESIS_DIGEST};
pub use event::{AuditChannel, Details, EventDraft, SecurityEvent, ViolationKind};
pub use logger::{AuditLogger, UNKNOWN_CLIENT};
pub use sink::{AuditSink, MemorySink, SinkError, TracingSink, AUDIT_TARGET};
