//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (RequestDescriptor):
//!     → policy.rs (excluded paths pass straight through)
//!     → resolver.rs (client identity; failure fails open)
//!     → rate_limit.rs (per client + endpoint class, lockout)
//!     → classifier.rs (injection → traversal → user agent)
//!     → classifier.rs (suspicious headers, audit only)
//!     → sensitive.rs (sensitive resource access, audit only)
//!     → Verdict
//! ```
//!
//! # Design Decisions
//! - Fail closed on rate limit and threats, fail open on internal faults
//! - Threat policy is data, compiled once and swapped atomically on reload
//! - Rate-limit state is the only hot shared state, sharded per key

pub mod classifier;
pub mod clock;
pub mod interceptor;
pub mod policy;
pub mod rate_limit;
pub mod request;
pub mod resolver;
pub mod sensitive;

pub use classifier::{PolicyError, Threat, ThreatClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use interceptor::{SecurityInterceptor, Verdict};
pub use policy::ThreatPolicy;
pub use rate_limit::{spawn_sweeper, RateLimitDecision, RateLimiter, DEFAULT_ENDPOINT};
pub use request::RequestDescriptor;
pub use resolver::{ClientResolver, HeaderClientResolver, ResolveError};
pub use sensitive::{SensitiveAccess, SensitiveResourceMatcher};
