//! AES-256-GCM envelope encryption and keyed hashing for PII.
//!
//! Envelope layout, base64 encoded as one token:
//! ```text
//! | IV (12 bytes) | ciphertext (n bytes) | GCM tag (16 bytes) |
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::schema::EncryptionConfig;
use crate::crypto::error::CryptoError;
use crate::crypto::key::{self, EncryptionKey, KEY_LEN};

/// GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Default upper bound on PII field length, in characters.
pub const DEFAULT_PII_MAX_LENGTH: usize = 1000;

/// Domain separator for the hashing sub-key.
const HASH_KEY_CONTEXT: &[u8] = b"request-shield/pii-hash/v1";

type HmacSha256 = Hmac<Sha256>;

/// Encrypts, decrypts and hashes sensitive values under one process-wide key.
///
/// The service holds no mutable state; share it behind an `Arc` and call it
/// from any number of tasks.
#[derive(Clone)]
pub struct DataEncryptionService {
    cipher: Option<Aes256Gcm>,
    hash_key: Option<Zeroizing<[u8; KEY_LEN]>>,
    configured: bool,
    pii_max_length: usize,
}

impl DataEncryptionService {
    /// Create a service from an optional parsed key.
    pub fn new(key: Option<EncryptionKey>) -> Self {
        match key {
            Some(key) => {
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
                let hash_key = derive_hash_key(&key);
                Self {
                    cipher: Some(cipher),
                    hash_key,
                    configured: !key.is_placeholder(),
                    pii_max_length: DEFAULT_PII_MAX_LENGTH,
                }
            }
            None => Self {
                cipher: None,
                hash_key: None,
                configured: false,
                pii_max_length: DEFAULT_PII_MAX_LENGTH,
            },
        }
    }

    /// Build from configuration.
    ///
    /// Unparseable key text leaves the service without a key; the caller
    /// decides at startup whether that is a warning or a hard stop via
    /// [`is_encryption_configured`](Self::is_encryption_configured).
    pub fn from_config(config: &EncryptionConfig) -> Self {
        let key = match config.key.expose() {
            None => {
                tracing::warn!("No encryption key configured; PII encryption is disabled");
                None
            }
            Some(text) => match EncryptionKey::from_base64(text) {
                Ok(key) => {
                    if key.is_placeholder() {
                        tracing::warn!("Encryption key matches a placeholder pattern; replace it before production use");
                    }
                    Some(key)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Encryption key rejected; PII encryption is disabled");
                    None
                }
            },
        };

        Self::new(key).with_pii_max_length(config.pii_max_length)
    }

    /// Override the PII length bound.
    pub fn with_pii_max_length(mut self, max: usize) -> Self {
        self.pii_max_length = max;
        self
    }

    /// True when a key is loaded and it is not a placeholder.
    pub fn is_encryption_configured(&self) -> bool {
        self.configured
    }

    /// Encrypt a value into a base64 envelope. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = self
            .cipher
            .as_ref()
            .ok_or(CryptoError::Encryption("no encryption key configured"))?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption("cipher rejected input"))?;

        let mut envelope = Vec::with_capacity(IV_LEN + sealed.len());
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&sealed);

        Ok(STANDARD.encode(envelope))
    }

    /// Decrypt a base64 envelope. Empty input stays empty.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        if envelope.is_empty() {
            return Ok(String::new());
        }

        let cipher = self
            .cipher
            .as_ref()
            .ok_or(CryptoError::Encryption("no encryption key configured"))?;

        let raw = STANDARD.decode(envelope.trim()).map_err(|_| CryptoError::Decryption)?;
        if raw.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Decryption);
        }

        let (iv, sealed) = raw.split_at(IV_LEN);
        let opened = cipher
            .decrypt(Nonce::from_slice(iv), sealed)
            .map_err(|_| CryptoError::Authentication)?;
        let opened = Zeroizing::new(opened);

        String::from_utf8(opened.to_vec()).map_err(|_| CryptoError::Decryption)
    }

    /// `encrypt` lifted over an absent value.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// `decrypt` lifted over an absent value.
    pub fn decrypt_optional(&self, envelope: Option<&str>) -> Result<Option<String>, CryptoError> {
        envelope.map(|e| self.decrypt(e)).transpose()
    }

    /// Encrypt a PII field: trim, enforce the length bound, then encrypt.
    pub fn encrypt_pii(&self, value: &str) -> Result<String, CryptoError> {
        let trimmed = value.trim();
        let length = trimmed.chars().count();
        if length > self.pii_max_length {
            return Err(CryptoError::Validation(format!(
                "PII data too long for encryption ({} characters, max {})",
                length, self.pii_max_length
            )));
        }
        self.encrypt(trimmed)
    }

    /// Decrypt a PII field produced by [`encrypt_pii`](Self::encrypt_pii).
    pub fn decrypt_pii(&self, envelope: &str) -> Result<String, CryptoError> {
        self.decrypt(envelope).map(|plain| plain.trim().to_string())
    }

    /// Deterministic keyed digest for equality lookups. Empty input stays empty.
    pub fn hash_sensitive_data(&self, value: &str) -> Result<String, CryptoError> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let mac = self.keyed_mac(value)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Check `value` against a digest from [`hash_sensitive_data`](Self::hash_sensitive_data).
    ///
    /// Malformed digests and a missing key yield `false`.
    pub fn verify_hash(&self, value: &str, digest: &str) -> bool {
        if value.is_empty() {
            return digest.is_empty();
        }
        let Ok(expected) = STANDARD.decode(digest.trim()) else {
            return false;
        };
        match self.keyed_mac(value) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    /// Produce fresh base64 key material (44 characters).
    pub fn generate_new_key() -> String {
        key::generate_new_key()
    }

    fn keyed_mac(&self, value: &str) -> Result<HmacSha256, CryptoError> {
        let hash_key = self
            .hash_key
            .as_ref()
            .ok_or(CryptoError::Encryption("no encryption key configured"))?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&hash_key[..])
            .map_err(|_| CryptoError::InvalidKey("hash key rejected"))?;
        mac.update(value.as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for DataEncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataEncryptionService")
            .field("configured", &self.configured)
            .field("pii_max_length", &self.pii_max_length)
            .finish_non_exhaustive()
    }
}

fn derive_hash_key(key: &EncryptionKey) -> Option<Zeroizing<[u8; KEY_LEN]>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).ok()?;
    mac.update(HASH_KEY_CONTEXT);
    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    derived.copy_from_slice(&mac.finalize().into_bytes());
    Some(derived)
}
