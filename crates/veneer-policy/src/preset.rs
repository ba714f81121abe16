//! Identity presets
//!
//! A preset is the identity a request is dressed in: a User-Agent and an
//! optional Referer. The `chrome` preset is the neutral baseline and means
//! "leave the request alone".

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::Result;

/// Key of the built-in baseline preset
pub const DEFAULT_PRESET_KEY: &str = "chrome";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPreset {
    pub key: String,
    pub name: String,
    pub user_agent: String,
    /// Empty means the Referer header is left untouched
    #[serde(default)]
    pub referer: String,
}

impl IdentityPreset {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        user_agent: impl Into<String>,
        referer: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            user_agent: user_agent.into(),
            referer: referer.into(),
        }
    }

    /// The neutral baseline preset
    pub fn baseline() -> Self {
        Self::new(
            DEFAULT_PRESET_KEY,
            "Chrome (Default)",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "",
        )
    }

    pub fn is_baseline(&self) -> bool {
        self.key == DEFAULT_PRESET_KEY
    }

    pub fn has_referer(&self) -> bool {
        !self.referer.is_empty()
    }

    /// Check the preset is usable as a set of header values
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| PolicyError::InvalidPreset {
            key: self.key.clone(),
            reason: reason.to_string(),
        };

        if self.key.trim().is_empty() {
            return Err(invalid("key is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(invalid("user agent is empty"));
        }
        if has_control_chars(&self.user_agent) || has_control_chars(&self.referer) {
            return Err(invalid("header value contains control characters"));
        }

        Ok(())
    }
}

fn has_control_chars(value: &str) -> bool {
    value.chars().any(|c| c.is_control())
}

/// Presets seeded into a fresh store
pub fn builtin_presets() -> Vec<IdentityPreset> {
    vec![
        IdentityPreset::new(
            "googlebot",
            "Googlebot",
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            "https://www.google.com/",
        ),
        IdentityPreset::new(
            "bingbot",
            "Bingbot",
            "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)",
            "https://www.bing.com/",
        ),
        IdentityPreset::new("twitterbot", "Twitterbot", "Twitterbot/1.0", "https://t.co/"),
        IdentityPreset::new(
            "facebookbot",
            "Facebook Bot",
            "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)",
            "https://www.facebook.com/",
        ),
        IdentityPreset::baseline(),
    ]
}

/// Derive a preset key from a display name: lower-cased, anything outside
/// `[a-z0-9]` becomes `_`.
pub fn preset_key_from_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_include_baseline() {
        let presets = builtin_presets();
        assert_eq!(presets.len(), 5);

        let baseline = presets.iter().find(|p| p.is_baseline()).unwrap();
        assert!(!baseline.has_referer());

        for preset in &presets {
            preset.validate().unwrap();
        }
    }

    #[test]
    fn test_key_from_name() {
        assert_eq!(preset_key_from_name("Googlebot"), "googlebot");
        assert_eq!(preset_key_from_name("My Bot 2.0"), "my_bot_2_0");
        assert_eq!(preset_key_from_name("  Ünïcode "), "_n_code");
    }

    #[test]
    fn test_validate_rejects_header_injection() {
        let preset = IdentityPreset::new("evil", "Evil", "Bot/1.0\r\nX-Injected: 1", "");
        assert!(matches!(
            preset.validate(),
            Err(PolicyError::InvalidPreset { .. })
        ));

        let preset = IdentityPreset::new("blank", "Blank", "   ", "");
        assert!(preset.validate().is_err());
    }
}
