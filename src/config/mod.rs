//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + SHIELD_ENCRYPTION_KEY
//!     → loader.rs (parse & deserialize, env override)
//!     → validation.rs (semantic checks, regex compilation)
//!     → ShieldConfig (validated, immutable)
//!     → handed to component constructors at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → interceptor swaps its compiled threat policy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the threat policy is hot-swapped
//! - All fields have defaults to allow minimal configs
//! - Key material is redacted in Debug and Serialize output

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EncryptionConfig, EndpointLimitConfig, InterceptorConfig, KeyMaterial, ObservabilityConfig,
    RateLimitConfig, SensitiveResourceConfig, SensitiveResourceRule, ShieldConfig,
    ThreatPolicyConfig,
};
pub use validation::ValidationError;
