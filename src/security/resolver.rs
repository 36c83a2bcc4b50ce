//! Client identity resolution.

use thiserror::Error;

use crate::security::request::RequestDescriptor;

/// Identity could not be determined.
#[derive(Debug, Clone, Error)]
#[error("client identity unavailable: {0}")]
pub struct ResolveError(pub String);

/// Resolves the client identity used for rate limiting and auditing.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, request: &RequestDescriptor) -> Result<String, ResolveError>;
}

/// Resolves the client address from forwarding headers, then the peer address.
///
/// For `X-Forwarded-For` only the first (client-most) entry is used. Empty
/// values and the literal `unknown` are skipped.
#[derive(Debug, Clone)]
pub struct HeaderClientResolver {
    headers: Vec<String>,
}

impl HeaderClientResolver {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers }
    }
}

impl Default for HeaderClientResolver {
    fn default() -> Self {
        Self::new(vec!["X-Forwarded-For".into(), "X-Real-IP".into()])
    }
}

impl ClientResolver for HeaderClientResolver {
    fn resolve(&self, request: &RequestDescriptor) -> Result<String, ResolveError> {
        for name in &self.headers {
            let Some(value) = request.header(name) else {
                continue;
            };
            let candidate = value.split(',').next().unwrap_or("").trim();
            if !candidate.is_empty() && !candidate.eq_ignore_ascii_case("unknown") {
                return Ok(candidate.to_string());
            }
        }

        request
            .remote_addr
            .map(|addr| addr.to_string())
            .ok_or_else(|| ResolveError("no forwarding header or peer address".into()))
    }
}
