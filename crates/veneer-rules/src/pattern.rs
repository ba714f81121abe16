//! URL patterns of the form `*://host/*`

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Matches every URL on exactly one host, under any scheme, path or query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UrlPattern {
    host: String,
}

impl UrlPattern {
    pub fn for_host(host: &str) -> Self {
        Self {
            host: host.to_lowercase(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| host.eq_ignore_ascii_case(&self.host))
            .unwrap_or(false)
    }

    /// Parse and match; unparseable URLs never match
    pub fn matches(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| self.matches_url(&parsed))
            .unwrap_or(false)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*://{}/*", self.host)
    }
}

impl From<UrlPattern> for String {
    fn from(pattern: UrlPattern) -> Self {
        pattern.to_string()
    }
}

impl TryFrom<String> for UrlPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for UrlPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let host = s
            .strip_prefix("*://")
            .and_then(|rest| rest.strip_suffix("/*"))
            .ok_or_else(|| format!("Unsupported URL pattern: {}", s))?;

        if host.is_empty() || host.contains(['/', '*', ' ']) {
            return Err(format!("Unsupported URL pattern: {}", s));
        }

        Ok(Self::for_host(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let pattern = UrlPattern::for_host("www.example.com");
        assert_eq!(pattern.to_string(), "*://www.example.com/*");
        assert_eq!("*://www.example.com/*".parse::<UrlPattern>(), Ok(pattern));
        assert!("https://example.com/*".parse::<UrlPattern>().is_err());
        assert!("*:///*".parse::<UrlPattern>().is_err());
    }

    #[test]
    fn test_matching_is_host_exact_and_scheme_agnostic() {
        let pattern = UrlPattern::for_host("example.com");
        assert!(pattern.matches("https://example.com/"));
        assert!(pattern.matches("http://EXAMPLE.com/a/b?c=d"));
        assert!(!pattern.matches("https://www.example.com/"));
        assert!(!pattern.matches("https://cdn.example.com/app.js"));
        assert!(!pattern.matches("not a url"));
    }

    #[test]
    fn test_serializes_as_pattern_string() {
        let pattern = UrlPattern::for_host("example.com");
        let json = serde_json::to_string(&pattern).unwrap();
        assert_eq!(json, "\"*://example.com/*\"");
        let back: UrlPattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pattern);
    }
}
