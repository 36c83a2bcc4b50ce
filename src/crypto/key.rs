//! Symmetric key material and key hygiene checks.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Substrings that mark a key as a default or placeholder value.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "default",
    "change-me",
    "changeme",
    "change_me",
    "placeholder",
    "example",
    "secret",
    "test-key",
];

/// A 256-bit encryption key.
///
/// The bytes are wiped when the key is dropped and never appear in `Debug`
/// output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    placeholder: bool,
}

impl EncryptionKey {
    /// Parse base64 key text (44 characters for a 256-bit key).
    pub fn from_base64(text: &str) -> Result<Self, super::CryptoError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(super::CryptoError::InvalidKey("key is empty"));
        }

        let mut decoded = STANDARD
            .decode(trimmed)
            .map_err(|_| super::CryptoError::InvalidKey("key is not valid base64"))?;

        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return Err(super::CryptoError::InvalidKey("key must decode to 32 bytes"));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        let placeholder = looks_like_placeholder(trimmed) || bytes.iter().all(|b| *b == bytes[0]);

        Ok(Self { bytes, placeholder })
    }

    /// Wrap raw bytes. Used by key generation and tests.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let placeholder = bytes.iter().all(|b| *b == bytes[0]);
        Self { bytes, placeholder }
    }

    /// True when the key matches a known default/placeholder pattern.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"<redacted>")
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

/// Generate fresh key material, base64 encoded (44 characters).
pub fn generate_new_key() -> String {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    let encoded = STANDARD.encode(bytes);
    bytes.zeroize();
    encoded
}

/// Check raw key text against the placeholder marker list.
pub fn looks_like_placeholder(text: &str) -> bool {
    let lowered = text.trim().to_ascii_lowercase();
    lowered.is_empty() || PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m))
}
