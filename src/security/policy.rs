//! Compiled threat policy.
//!
//! Built once from configuration and swapped atomically on reload, so a
//! request always sees one consistent set of patterns.

use crate::config::ShieldConfig;
use crate::security::classifier::{ClassifierChain, PolicyError, SuspiciousHeaderDetector};
use crate::security::request::RequestDescriptor;
use crate::security::sensitive::SensitiveResourceMatcher;

/// Paths that bypass every check.
#[derive(Debug, Clone, Default)]
pub struct PathExclusions {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PathExclusions {
    /// Entries ending in `/**` match the prefix and everything below it.
    pub fn new(entries: &[String]) -> Self {
        let mut exclusions = Self::default();
        for entry in entries {
            match entry.strip_suffix("/**") {
                Some(prefix) => exclusions.prefixes.push(prefix.to_string()),
                None => exclusions.exact.push(entry.clone()),
            }
        }
        exclusions
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|prefix| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

/// Everything the interceptor needs to classify a request.
pub struct ThreatPolicy {
    pub(crate) enabled: bool,
    pub(crate) classifiers: ClassifierChain,
    pub(crate) headers: SuspiciousHeaderDetector,
    pub(crate) sensitive: SensitiveResourceMatcher,
    pub(crate) exclusions: PathExclusions,
}

impl ThreatPolicy {
    pub fn compile(config: &ShieldConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            enabled: config.interceptor.enabled,
            classifiers: ClassifierChain::from_config(&config.threats)?,
            headers: SuspiciousHeaderDetector::new(&config.threats)?,
            sensitive: SensitiveResourceMatcher::new(&config.sensitive)?,
            exclusions: PathExclusions::new(&config.interceptor.excluded_paths),
        })
    }

    /// Whether `request` skips every check.
    ///
    /// Only a plain path with no query and no form body can be excluded, so
    /// encoded or dot-segment paths are always classified.
    pub fn is_excluded(&self, request: &RequestDescriptor) -> bool {
        is_plain_request(request) && self.exclusions.matches(&request.path)
    }
}

fn is_plain_request(request: &RequestDescriptor) -> bool {
    let path = request.path.as_str();
    request.query.as_deref().map_or(true, str::is_empty)
        && request.form_params.is_empty()
        && path.starts_with('/')
        && !path.contains(['%', '\\'])
        && !path[1..].split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
}
