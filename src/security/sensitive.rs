//! Sensitive resource recognition.

use regex::Regex;

use crate::config::SensitiveResourceConfig;
use crate::security::classifier::PolicyError;

/// A matched sensitive resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveAccess {
    pub category: String,
    pub resource_id: Option<u64>,
}

/// Maps request paths onto sensitive data categories.
pub struct SensitiveResourceMatcher {
    rules: Vec<(String, Regex)>,
}

impl SensitiveResourceMatcher {
    pub fn new(config: &SensitiveResourceConfig) -> Result<Self, PolicyError> {
        let rules = config
            .resources
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (rule.category.clone(), re))
                    .map_err(|source| PolicyError {
                        field: "sensitive",
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// First category whose pattern matches `path`.
    ///
    /// The resource id is the first capture group when it parses as a `u64`.
    pub fn classify(&self, path: &str) -> Option<SensitiveAccess> {
        self.rules.iter().find_map(|(category, re)| {
            let caps = re.captures(path)?;
            let resource_id = caps.get(1).and_then(|m| m.as_str().parse().ok());
            Some(SensitiveAccess {
                category: category.clone(),
                resource_id,
            })
        })
    }
}
