//! Policy store
//!
//! In-memory configuration: identity presets plus per-domain overrides.
//! Every mutation validates its input up front and leaves the store pruned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::normalize_domain;
use crate::error::PolicyError;
use crate::policy::{DomainPolicy, PolicyUpdate};
use crate::preset::{builtin_presets, preset_key_from_name, IdentityPreset, DEFAULT_PRESET_KEY};
use crate::pruner::{prune, PruneReport};
use crate::Result;

/// Persisted form of the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// A snapshot written without presets keeps the built-ins
    #[serde(default = "builtin_preset_map")]
    pub presets: BTreeMap<String, IdentityPreset>,
    #[serde(default)]
    pub policies: BTreeMap<String, DomainPolicy>,
}

fn builtin_preset_map() -> BTreeMap<String, IdentityPreset> {
    builtin_presets()
        .into_iter()
        .map(|p| (p.key.clone(), p))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStore {
    presets: BTreeMap<String, IdentityPreset>,
    policies: BTreeMap<String, DomainPolicy>,
}

impl PolicyStore {
    /// A fresh store seeded with the built-in presets and no overrides
    pub fn new() -> Self {
        Self {
            presets: builtin_preset_map(),
            policies: BTreeMap::new(),
        }
    }

    /// Rebuild a store from persisted state, repairing whatever does not
    /// hold up: invalid presets are dropped, the baseline is re-seeded,
    /// domain keys are normalized (entries that collide are merged) and
    /// the result is pruned.
    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        let mut presets = BTreeMap::new();
        for (key, mut preset) in snapshot.presets {
            preset.key = key;
            match preset.validate() {
                Ok(()) => {
                    presets.insert(preset.key.clone(), preset);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping stored preset"),
            }
        }
        presets
            .entry(DEFAULT_PRESET_KEY.to_string())
            .or_insert_with(IdentityPreset::baseline);

        let mut policies: BTreeMap<String, DomainPolicy> = BTreeMap::new();
        for (key, mut policy) in snapshot.policies {
            match normalize_domain(&key) {
                Some(domain) => {
                    policy.domain = domain.clone();
                    match policies.get_mut(&domain) {
                        Some(existing) => {
                            tracing::warn!(
                                domain = %domain,
                                stored_key = %key,
                                "Merging stored policies that normalize to the same domain"
                            );
                            existing.merge(&policy);
                        }
                        None => {
                            policies.insert(domain, policy);
                        }
                    }
                }
                None => tracing::warn!(domain = %key, "Dropping policy for malformed domain"),
            }
        }

        let mut store = Self { presets, policies };
        let report = store.prune();
        if !report.is_clean() {
            tracing::info!(
                repaired = report.repaired,
                removed = report.removed,
                "Pruned stored policies"
            );
        }
        store
    }

    pub fn to_snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            presets: self.presets.clone(),
            policies: self.policies.clone(),
        }
    }

    pub fn presets(&self) -> &BTreeMap<String, IdentityPreset> {
        &self.presets
    }

    pub fn preset(&self, key: &str) -> Option<&IdentityPreset> {
        self.presets.get(key)
    }

    /// Stored overrides, keyed and ordered by normalized domain
    pub fn policies(&self) -> &BTreeMap<String, DomainPolicy> {
        &self.policies
    }

    pub fn policy(&self, domain: &str) -> Option<&DomainPolicy> {
        self.policies.get(domain)
    }

    /// Insert or replace a preset
    pub fn upsert_preset(&mut self, preset: IdentityPreset) -> Result<()> {
        preset.validate()?;

        tracing::debug!(key = %preset.key, "Upserting preset");
        self.presets.insert(preset.key.clone(), preset);
        Ok(())
    }

    /// Add a preset keyed by its display name
    pub fn add_preset(&mut self, name: &str, user_agent: &str, referer: &str) -> Result<IdentityPreset> {
        let key = preset_key_from_name(name);
        if self.presets.contains_key(&key) {
            return Err(PolicyError::DuplicatePreset(key));
        }

        let preset = IdentityPreset::new(key, name.trim(), user_agent.trim(), referer.trim());
        self.upsert_preset(preset.clone())?;
        Ok(preset)
    }

    /// Remove a preset; policies that used it fall back to the baseline.
    pub fn remove_preset(&mut self, key: &str) -> Result<Option<IdentityPreset>> {
        if key == DEFAULT_PRESET_KEY {
            return Err(PolicyError::ProtectedPreset(key.to_string()));
        }

        let removed = self.presets.remove(key);
        if removed.is_some() {
            let report = self.prune();
            tracing::info!(
                key = %key,
                repaired = report.repaired,
                removed = report.removed,
                "Removed preset"
            );
        }
        Ok(removed)
    }

    /// Replace every preset at once. The baseline is restored if missing.
    pub fn replace_presets<I>(&mut self, presets: I) -> Result<()>
    where
        I: IntoIterator<Item = IdentityPreset>,
    {
        let mut next = BTreeMap::new();
        for preset in presets {
            preset.validate()?;
            next.insert(preset.key.clone(), preset);
        }
        next.entry(DEFAULT_PRESET_KEY.to_string())
            .or_insert_with(IdentityPreset::baseline);

        self.presets = next;
        self.prune();
        Ok(())
    }

    /// Apply a partial update to a domain's policy.
    ///
    /// Returns the resulting policy, which is the no-op default when the
    /// update left nothing to store.
    pub fn set_policy(&mut self, domain: &str, update: &PolicyUpdate) -> Result<DomainPolicy> {
        let domain =
            normalize_domain(domain).ok_or_else(|| PolicyError::MalformedDomain(domain.to_string()))?;

        if let Some(key) = &update.identity_key {
            if !self.presets.contains_key(key) {
                return Err(PolicyError::UnknownPreset(key.clone()));
            }
        }

        let mut policy = self
            .policies
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| DomainPolicy::default_for(domain.clone()));
        policy.apply(update);

        self.policies.insert(domain.clone(), policy.clone());
        self.prune();

        Ok(policy)
    }

    /// Drop a domain's override entirely
    pub fn clear_policy(&mut self, domain: &str) -> Result<Option<DomainPolicy>> {
        let domain =
            normalize_domain(domain).ok_or_else(|| PolicyError::MalformedDomain(domain.to_string()))?;
        Ok(self.policies.remove(&domain))
    }

    pub fn prune(&mut self) -> PruneReport {
        prune(&mut self.policies, &self.presets)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
