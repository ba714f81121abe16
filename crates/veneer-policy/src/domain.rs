//! Domain normalization
//!
//! Every place that stores or looks up a policy goes through
//! [`normalize_domain`], so `https://www.Example.com/a?b=1`, `www.example.com`
//! and `example.com` all land on the same key.

use url::Url;

const WWW_PREFIX: &str = "www.";

/// Derive the policy key for a URL or bare host.
///
/// Returns `None` when no hostname can be extracted.
pub fn normalize_domain(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let parsed = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("https://{}", input)).ok()?
    };

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_suffix('.').unwrap_or(&host);
    let host = host.strip_prefix(WWW_PREFIX).unwrap_or(host);

    if host.is_empty() {
        return None;
    }

    Some(host.to_string())
}

/// The `www.` sibling of a normalized domain.
pub fn www_variant(domain: &str) -> String {
    format!("{}{}", WWW_PREFIX, domain)
}
