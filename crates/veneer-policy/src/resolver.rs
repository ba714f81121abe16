//! Policy resolution
//!
//! Read-only view used for display: what applies to a given domain right now.

use serde::{Deserialize, Serialize};

use crate::domain::normalize_domain;
use crate::policy::DomainPolicy;
use crate::preset::{IdentityPreset, DEFAULT_PRESET_KEY};
use crate::store::PolicyStore;

/// A resolved policy joined with the preset it selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub policy: DomainPolicy,
    pub preset: IdentityPreset,
    /// Whether anything differs from the no-op default
    pub is_modified: bool,
}

/// Effective policy for a domain. Never fails: domains without
/// an override get the no-op default, and an override pointing at a
/// preset that no longer exists reports the baseline identity.
pub fn resolve(store: &PolicyStore, domain: &str) -> DomainPolicy {
    let domain = normalize_domain(domain).unwrap_or_else(|| domain.to_string());
    let mut policy = store
        .policy(&domain)
        .cloned()
        .unwrap_or_else(|| DomainPolicy::default_for(domain));

    if store.preset(&policy.identity_key).is_none() {
        policy.identity_key = DEFAULT_PRESET_KEY.to_string();
    }

    policy
}

/// Effective policy for a URL or host as typed by the user.
///
/// Returns `None` when no domain can be derived from the input.
pub fn effective_policy(store: &PolicyStore, input: &str) -> Option<EffectivePolicy> {
    let domain = normalize_domain(input)?;
    let policy = resolve(store, &domain);
    let preset = store
        .preset(&policy.identity_key)
        .cloned()
        .unwrap_or_else(IdentityPreset::baseline);

    Some(EffectivePolicy {
        is_modified: !policy.is_default(),
        policy,
        preset,
    })
}
