//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, retention covers a window)
//! - Compile every policy regex so bad patterns fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use regex::Regex;
use thiserror::Error;

use crate::config::schema::{RateLimitConfig, ShieldConfig};
use crate::security::rate_limit::MAX_LOCKOUT_SECS;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected 'pretty' or 'json'", other),
        )),
    }

    validate_rate_limit(&config.rate_limit, &mut errors);

    if config.encryption.pii_max_length == 0 {
        errors.push(ValidationError::new("encryption.pii_max_length", "must be greater than 0"));
    }

    for (i, path) in config.interceptor.excluded_paths.iter().enumerate() {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("interceptor.excluded_paths[{}]", i),
                "must start with '/'",
            ));
        }
    }

    let threats = &config.threats;
    check_patterns("threats.sql_patterns", &threats.sql_patterns, &mut errors);
    check_patterns("threats.xss_patterns", &threats.xss_patterns, &mut errors);
    check_patterns("threats.command_patterns", &threats.command_patterns, &mut errors);
    check_patterns(
        "threats.path_traversal_patterns",
        &threats.path_traversal_patterns,
        &mut errors,
    );
    if threats.blocked_user_agents.iter().any(|s| s.trim().is_empty()) {
        errors.push(ValidationError::new(
            "threats.blocked_user_agents",
            "entries must not be blank",
        ));
    }
    if threats.max_header_length == 0 {
        errors.push(ValidationError::new("threats.max_header_length", "must be greater than 0"));
    }

    for (i, rule) in config.sensitive.resources.iter().enumerate() {
        let field = format!("sensitive.resources[{}]", i);
        if rule.category.trim().is_empty() {
            errors.push(ValidationError::new(&field, "category must not be empty"));
        }
        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(ValidationError::new(&field, format!("invalid pattern: {}", e)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rate_limit(config: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if config.requests_per_window == 0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_window",
            "must be greater than 0",
        ));
    }
    if config.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if config.lockout_secs == 0 || config.lockout_secs > MAX_LOCKOUT_SECS {
        errors.push(ValidationError::new(
            "rate_limit.lockout_secs",
            format!("must be between 1 and {}", MAX_LOCKOUT_SECS),
        ));
    }
    if config.violations_before_lockout == 0 {
        errors.push(ValidationError::new(
            "rate_limit.violations_before_lockout",
            "must be at least 1",
        ));
    }
    if config.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }

    let longest_window = config
        .endpoints
        .iter()
        .map(|e| e.window_secs)
        .chain(std::iter::once(config.window_secs))
        .max()
        .unwrap_or(config.window_secs);
    if config.idle_retention_secs < longest_window {
        errors.push(ValidationError::new(
            "rate_limit.idle_retention_secs",
            format!("must cover the longest window ({}s)", longest_window),
        ));
    }

    let mut names = HashSet::new();
    for (i, endpoint) in config.endpoints.iter().enumerate() {
        let field = format!("rate_limit.endpoints[{}]", i);
        if endpoint.name.trim().is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate endpoint class '{}'", endpoint.name),
            ));
        }
        if !endpoint.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(&field, "path_prefix must start with '/'"));
        }
        if endpoint.requests_per_window == 0 || endpoint.window_secs == 0 {
            errors.push(ValidationError::new(
                &field,
                "requests_per_window and window_secs must be greater than 0",
            ));
        }
    }
}

fn check_patterns(field: &str, patterns: &[String], errors: &mut Vec<ValidationError>) {
    for (i, pattern) in patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::new(
                format!("{}[{}]", field, i),
                format!("invalid pattern: {}", e),
            ));
        }
    }
}
