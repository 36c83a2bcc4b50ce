//! Crypto error taxonomy.

use thiserror::Error;

/// Errors produced by the data protection service.
///
/// `Decryption` and `Authentication` are distinct so callers inside the
/// crate can tell a corrupt envelope from a forged one, but both render the
/// same message so nothing outside learns which check failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input rejected by policy before any cryptographic work.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Encryption could not be performed (usually: no key configured).
    #[error("encryption failed: {0}")]
    Encryption(&'static str),

    /// Envelope is malformed: bad encoding, truncated, or not UTF-8 inside.
    #[error("decryption failed")]
    Decryption,

    /// Integrity tag did not verify.
    #[error("decryption failed")]
    Authentication,

    /// Key material could not be parsed.
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),
}

impl CryptoError {
    /// True for any failure on the decrypt path.
    pub fn is_decrypt_failure(&self) -> bool {
        matches!(self, CryptoError::Decryption | CryptoError::Authentication)
    }
}
