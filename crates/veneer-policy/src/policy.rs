//! Per-domain policy overrides

use serde::{Deserialize, Serialize};

use crate::preset::DEFAULT_PRESET_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// Normalized domain, never carries a `www.` prefix
    pub domain: String,
    #[serde(default = "default_identity_key")]
    pub identity_key: String,
    #[serde(default)]
    pub block_scripts: bool,
    #[serde(default)]
    pub block_outgoing_cookies: bool,
}

fn default_identity_key() -> String {
    DEFAULT_PRESET_KEY.to_string()
}

impl DomainPolicy {
    /// The no-op policy for a domain
    pub fn default_for(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            identity_key: default_identity_key(),
            block_scripts: false,
            block_outgoing_cookies: false,
        }
    }

    /// True when this policy changes nothing about requests to its domain
    pub fn is_default(&self) -> bool {
        self.identity_key == DEFAULT_PRESET_KEY
            && !self.block_scripts
            && !self.block_outgoing_cookies
    }

    pub fn uses_baseline_identity(&self) -> bool {
        self.identity_key == DEFAULT_PRESET_KEY
    }

    /// Fold another override for the same domain into this one. Blocking
    /// flags accumulate; a non-baseline identity wins over the baseline.
    pub fn merge(&mut self, other: &DomainPolicy) {
        if self.uses_baseline_identity() {
            self.identity_key = other.identity_key.clone();
        }
        self.block_scripts |= other.block_scripts;
        self.block_outgoing_cookies |= other.block_outgoing_cookies;
    }

    pub fn apply(&mut self, update: &PolicyUpdate) {
        if let Some(key) = &update.identity_key {
            self.identity_key = key.clone();
        }
        if let Some(block) = update.block_scripts {
            self.block_scripts = block;
        }
        if let Some(block) = update.block_outgoing_cookies {
            self.block_outgoing_cookies = block;
        }
    }
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub identity_key: Option<String>,
    #[serde(default)]
    pub block_scripts: Option<bool>,
    #[serde(default)]
    pub block_outgoing_cookies: Option<bool>,
}

impl PolicyUpdate {
    /// An update that resets every field to the no-op default
    pub fn reset() -> Self {
        Self {
            identity_key: Some(default_identity_key()),
            block_scripts: Some(false),
            block_outgoing_cookies: Some(false),
        }
    }

    pub fn identity(mut self, key: impl Into<String>) -> Self {
        self.identity_key = Some(key.into());
        self
    }

    pub fn block_scripts(mut self, block: bool) -> Self {
        self.block_scripts = Some(block);
        self
    }

    pub fn block_outgoing_cookies(mut self, block: bool) -> Self {
        self.block_outgoing_cookies = Some(block);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detection() {
        let mut policy = DomainPolicy::default_for("example.com");
        assert!(policy.is_default());

        policy.apply(&PolicyUpdate::default().block_scripts(true));
        assert!(!policy.is_default());
        assert!(policy.uses_baseline_identity());

        policy.apply(&PolicyUpdate::reset());
        assert!(policy.is_default());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut policy = DomainPolicy::default_for("example.com");
        policy.apply(
            &PolicyUpdate::default()
                .identity("googlebot")
                .block_outgoing_cookies(true),
        );
        policy.apply(&PolicyUpdate::default().block_scripts(true));

        assert_eq!(policy.identity_key, "googlebot");
        assert!(policy.block_scripts);
        assert!(policy.block_outgoing_cookies);
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let policy: DomainPolicy = serde_json::from_str(r#"{"domain":"example.com"}"#).unwrap();
        assert!(policy.is_default());
    }
}
