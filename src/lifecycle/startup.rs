//! Startup checks.
//!
//! # Responsibilities
//! - Report encryption key misconfiguration
//! - Turn it into a hard stop when `encryption.require_configured` is set
//!
//! # Design Decisions
//! - Fail fast: a required key that is missing or a placeholder is fatal
//! - Otherwise warn and keep serving; only PII encryption is unavailable

use thiserror::Error;

use crate::config::EncryptionConfig;
use crate::crypto::DataEncryptionService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("encryption key is required but missing, malformed or a placeholder")]
    EncryptionNotConfigured,
}

/// Build the encryption service, enforcing `require_configured`.
pub fn init_encryption(config: &EncryptionConfig) -> Result<DataEncryptionService, StartupError> {
    let service = DataEncryptionService::from_config(config);

    if service.is_encryption_configured() {
        tracing::info!("PII encryption enabled");
    } else if config.require_configured {
        tracing::error!("Encryption key required but not usable; refusing to start");
        return Err(StartupError::EncryptionNotConfigured);
    } else {
        tracing::warn!(
            "Encryption key is missing or a placeholder; set SHIELD_ENCRYPTION_KEY before storing PII"
        );
    }
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_warns_by_default() {
        let service = init_encryption(&EncryptionConfig::default()).unwrap();
        assert!(!service.is_encryption_configured());
    }

    #[test]
    fn test_required_key_missing_is_fatal() {
        let config = EncryptionConfig {
            require_configured: true,
            ..EncryptionConfig::default()
        };
        assert!(matches!(
            init_encryption(&config),
            Err(StartupError::EncryptionNotConfigured)
        ));
    }

    #[test]
    fn test_placeholder_key_is_fatal_when_required() {
        let config = EncryptionConfig {
            key: "change-me".into(),
            require_configured: true,
            ..EncryptionConfig::default()
        };
        assert!(init_encryption(&config).is_err());
    }

    #[test]
    fn test_real_key_passes() {
        let config = EncryptionConfig {
            key: DataEncryptionService::generate_new_key().into(),
            require_configured: true,
            ..EncryptionConfig::default()
        };
        assert!(init_encryption(&config).unwrap().is_encryption_configured());
    }
}
