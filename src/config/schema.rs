//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Root configuration for the request shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// PII encryption settings.
    pub encryption: EncryptionConfig,

    /// Interceptor behaviour (exclusions, identity headers).
    pub interceptor: InterceptorConfig,

    /// Threat classification patterns.
    pub threats: ThreatPolicyConfig,

    /// Sensitive resource patterns for data-access auditing.
    pub sensitive: SensitiveResourceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format: "pretty" or "json".
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per window for endpoints without a dedicated class.
    #[serde(alias = "requests_per_minute")]
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Lockout duration once a client keeps exceeding its limit.
    pub lockout_secs: u64,

    /// Denied requests tolerated before the lockout starts.
    pub violations_before_lockout: u32,

    /// Buckets idle for longer than this are evicted.
    pub idle_retention_secs: u64,

    /// Interval of the background eviction sweep.
    pub sweep_interval_secs: u64,

    /// Endpoint classes with their own limits, checked in order.
    pub endpoints: Vec<EndpointLimitConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 60,
            window_secs: 60,
            lockout_secs: 900,
            violations_before_lockout: 1,
            idle_retention_secs: 7200,
            sweep_interval_secs: 60,
            endpoints: vec![
                EndpointLimitConfig {
                    name: "auth".into(),
                    path_prefix: "/api/auth/".into(),
                    method: None,
                    requests_per_window: 5,
                    window_secs: 60,
                },
                EndpointLimitConfig {
                    name: "credit-transfer".into(),
                    path_prefix: "/api/credits/transfer".into(),
                    method: None,
                    requests_per_window: 10,
                    window_secs: 3600,
                },
                EndpointLimitConfig {
                    name: "video-session-create".into(),
                    path_prefix: "/api/video-sessions/".into(),
                    method: Some("POST".into()),
                    requests_per_window: 20,
                    window_secs: 3600,
                },
            ],
        }
    }
}

/// A named endpoint class with its own limit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointLimitConfig {
    /// Class name, used as the bucket key component.
    pub name: String,

    /// Path prefix that selects this class.
    pub path_prefix: String,

    /// Optional HTTP method restriction (case-insensitive).
    #[serde(default)]
    pub method: Option<String>,

    /// Requests allowed per window.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

/// PII encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Base64 key material. Prefer the `SHIELD_ENCRYPTION_KEY` env var.
    pub key: KeyMaterial,

    /// Maximum PII length in characters, after trimming.
    pub pii_max_length: usize,

    /// Refuse to start when the key is missing or a placeholder.
    pub require_configured: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key: KeyMaterial::default(),
            pii_max_length: 1000,
            require_configured: false,
        }
    }
}

/// Raw key text that never prints or serializes its contents.
#[derive(Clone, Default)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    /// The key text, or `None` when blank.
    pub fn expose(&self) -> Option<&str> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

impl From<&str> for KeyMaterial {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for KeyMaterial {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expose() {
            Some(_) => f.write_str("KeyMaterial(<redacted>)"),
            None => f.write_str("KeyMaterial(<empty>)"),
        }
    }
}

impl<'de> Deserialize<'de> for KeyMaterial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(KeyMaterial)
    }
}

impl Serialize for KeyMaterial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.expose() {
            Some(_) => serializer.serialize_str("<redacted>"),
            None => serializer.serialize_str(""),
        }
    }
}

/// Interceptor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Enable the security interceptor.
    pub enabled: bool,

    /// Paths that skip every check. A trailing `/**` makes an entry a prefix.
    pub excluded_paths: Vec<String>,

    /// Headers consulted, in order, for the client address.
    pub client_ip_headers: Vec<String>,

    /// Largest urlencoded form body inspected, in bytes.
    pub max_form_bytes: usize,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_paths: vec![
                "/api/health".into(),
                "/api/status".into(),
                "/api/actuator/**".into(),
                "/error".into(),
            ],
            client_ip_headers: vec!["X-Forwarded-For".into(), "X-Real-IP".into()],
            max_form_bytes: 64 * 1024,
        }
    }
}

/// Threat classification patterns.
///
/// These are policy data: tune them without touching the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreatPolicyConfig {
    /// SQL injection regexes.
    pub sql_patterns: Vec<String>,

    /// Cross-site scripting regexes.
    pub xss_patterns: Vec<String>,

    /// Shell command injection regexes.
    pub command_patterns: Vec<String>,

    /// Path traversal regexes, applied to raw and decoded URIs.
    pub path_traversal_patterns: Vec<String>,

    /// Lowercase substrings identifying scanners and attack tools.
    pub blocked_user_agents: Vec<String>,

    /// Forwarding headers inspected for script payloads.
    pub inspected_headers: Vec<String>,

    /// Header values longer than this are reported as suspicious.
    pub max_header_length: usize,
}

impl Default for ThreatPolicyConfig {
    fn default() -> Self {
        Self {
            sql_patterns: vec![
                r"'\s*(;|--|#|/\*)".into(),
                r"(?i)'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+".into(),
                r"(?i)\bunion\b(\s+all)?\s+select\b".into(),
                r"(?i)\b(drop|truncate|alter)\s+(table|database|schema)\b".into(),
                r"(?i)\binsert\s+into\s+\w+\s*(\(|values\b|select\b)".into(),
                r"(?i)\bdelete\s+from\s+\w+\s*(;|--|$|where\b)".into(),
                r"(?i);\s*(select\s+[\w*,\s]+?\s+from\s+\w+|update\s+\w+\s+set\s+\w+\s*=|exec(ute)?\s+(xp_|sp_)\w+)".into(),
                r"(?i)\bexec(ute)?\s*\(|\bxp_cmdshell\b".into(),
            ],
            xss_patterns: vec![
                r"(?i)<\s*script\b".into(),
                r"(?i)javascript\s*:".into(),
                r"(?i)vbscript\s*:".into(),
                r"(?i)\bon(load|error|click|mouse\w*|focus|blur|change|submit)\s*=".into(),
                r"(?i)<\s*(iframe|object|embed)\b".into(),
            ],
            command_patterns: vec![
                r"(;|&&|\|\|?)\s*(ls|cat|rm|wget|curl|bash|sh|nc|chmod|whoami|id|uname|python|perl)(\s+(-\w|[/~$])|\s*($|[;&|`]))".into(),
                r"\$\([^)]*\)".into(),
                r"`[^`]+`".into(),
            ],
            path_traversal_patterns: vec![
                r"\.\.[/\\]".into(),
                r"[/\\]\.\.($|[/\\?#])".into(),
                r"(?i)%2e%2e".into(),
                r"(?i)%252e%252e".into(),
                r"(?i)\.\.%(2f|5c)".into(),
            ],
            blocked_user_agents: vec![
                "sqlmap".into(),
                "nikto".into(),
                "w3af".into(),
                "acunetix".into(),
                "netsparker".into(),
                "burp".into(),
                "owasp zap".into(),
                "nmap".into(),
                "masscan".into(),
                "dirbuster".into(),
                "dirb".into(),
                "gobuster".into(),
            ],
            inspected_headers: vec![
                "X-Forwarded-Host".into(),
                "X-Forwarded-Server".into(),
                "X-Forwarded-Proto".into(),
            ],
            max_header_length: 8192,
        }
    }
}

/// Sensitive resource patterns.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensitiveResourceConfig {
    /// Rules checked in order; the first match wins.
    pub resources: Vec<SensitiveResourceRule>,
}

impl Default for SensitiveResourceConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                SensitiveResourceRule::new("USER_DATA", r"/users/(\d+)(?:/|$)"),
                SensitiveResourceRule::new("MESSAGE_DATA", r"/messages/(\d+)(?:/|$)"),
                SensitiveResourceRule::new("VIDEO_SESSION_DATA", r"/video-sessions/(\d+)(?:/|$)"),
                SensitiveResourceRule::new("CREDIT_DATA", r"/credits/(\d+)(?:/|$)"),
                SensitiveResourceRule::new("PROFILE_DATA", r"/profile/(\d+)(?:/|$)"),
            ],
        }
    }
}

/// One sensitive resource category.
///
/// The first capture group of `pattern`, when present and numeric, is the
/// resource identifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensitiveResourceRule {
    pub category: String,
    pub pattern: String,
}

impl SensitiveResourceRule {
    pub fn new(category: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            pattern: pattern.into(),
        }
    }
}
