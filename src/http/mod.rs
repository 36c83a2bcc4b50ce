//! HTTP adapter subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request ID, trace, timeout layers)
//!     → middleware/shield.rs (buffer urlencoded forms, run interceptor)
//!     → request.rs (axum parts → RequestDescriptor)
//!     → allowed: application router
//!     → denied: JSON error body, Retry-After on 429
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::{shield_middleware, ShieldState};
pub use request::X_REQUEST_ID;
pub use server::ShieldServer;
