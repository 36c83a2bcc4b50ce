//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::security::classifier::PolicyError;

/// Environment variable that overrides `encryption.key`.
pub const ENCRYPTION_KEY_ENV: &str = "SHIELD_ENCRYPTION_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Threat policy error: {0}")]
    Policy(#[from] PolicyError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// The encryption key is taken from [`ENCRYPTION_KEY_ENV`] when set, so key
/// material can stay out of config files.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
        config.encryption.key = key.into();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse TOML text without validating it.
pub fn parse_config(content: &str) -> Result<ShieldConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.rate_limit.requests_per_window, 60);
        assert_eq!(config.encryption.pii_max_length, 1000);
        assert!(config.encryption.key.expose().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[listener]
bind_address = "127.0.0.1:9000"

[rate_limit]
requests_per_minute = 120
lockout_secs = 60

[[sensitive.resources]]
category = "INVOICE_DATA"
pattern = '/invoices/(\d+)'
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.rate_limit.requests_per_window, 120);
        assert_eq!(config.rate_limit.lockout_secs, 60);
        assert_eq!(config.sensitive.resources.len(), 1);
        assert_eq!(config.sensitive.resources[0].category, "INVOICE_DATA");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nwindow_secs = 0").unwrap();
        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.field == "rate_limit.window_secs"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_key_is_redacted_in_debug() {
        let config = parse_config("[encryption]\nkey = \"c3VwZXJzZWNyZXQ=\"").unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("c3VwZXJzZWNyZXQ="));
        assert!(rendered.contains("<redacted>"));
    }
}
