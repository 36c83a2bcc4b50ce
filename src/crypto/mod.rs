//! Data protection subsystem.
//!
//! # Data Flow
//! ```text
//! Business logic (PII field about to be stored):
//!     → cipher.rs (encrypt_pii: trim, bound, AES-256-GCM seal)
//!     → envelope string persisted by the caller
//!
//! Lookup by value without keeping it reversible:
//!     → cipher.rs (hash_sensitive_data: HMAC-SHA256 under a derived sub-key)
//!
//! Operator-facing logs:
//!     → redact.rs (mask_for_logging)
//! ```
//!
//! # Design Decisions
//! - AEAD only: the tag is verified before any plaintext leaves the service
//! - Fresh 96-bit IV per encryption, so equal plaintexts never share an envelope
//! - Key material is parsed once at startup, zeroized on drop, never printed
//! - Decryption failures render one generic message outside the crate

pub mod cipher;
pub mod error;
pub mod key;
pub mod redact;

pub use cipher::{DataEncryptionService, IV_LEN, TAG_LEN};
pub use error::CryptoError;
pub use key::{generate_new_key, looks_like_placeholder, EncryptionKey, KEY_LEN};
pub use redact::{mask_for_logging, secure_wipe, secure_wipe_string, MASK};
