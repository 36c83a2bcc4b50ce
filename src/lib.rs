//! Request shield: an HTTP security interceptor and PII encryption toolkit.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request ID, trace, timeout)
//!                         │
//!                         ▼
//!                     http::middleware::shield ──▶ security::interceptor
//!                         │                           │  resolver
//!                         │                           │  rate_limit
//!                         │                           │  classifier
//!                         │                           │  sensitive
//!                         │                           ▼
//!                         │                        audit (chained events)
//!                         ▼
//!                     application router
//!
//!     crypto: AES-256-GCM envelopes and keyed hashes for PII at rest
//!     config / observability / lifecycle: cross-cutting
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use audit::{AuditLogger, SecurityEvent, ViolationKind};
pub use config::ShieldConfig;
pub use crypto::DataEncryptionService;
pub use http::ShieldServer;
pub use lifecycle::Shutdown;
pub use security::{RequestDescriptor, SecurityInterceptor, Verdict};
