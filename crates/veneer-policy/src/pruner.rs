//! Default pruning
//!
//! Keeps the stored policy set minimal: every entry left behind is a real
//! override that points at a live preset.

use std::collections::BTreeMap;

use crate::policy::DomainPolicy;
use crate::preset::{IdentityPreset, DEFAULT_PRESET_KEY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries whose preset was gone and were pointed back at the baseline
    pub repaired: usize,
    /// Entries dropped because they matched the no-op default
    pub removed: usize,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.repaired == 0 && self.removed == 0
    }
}

/// Repair dangling preset references, then drop no-op entries.
pub fn prune(
    policies: &mut BTreeMap<String, DomainPolicy>,
    presets: &BTreeMap<String, IdentityPreset>,
) -> PruneReport {
    let mut report = PruneReport::default();

    for policy in policies.values_mut() {
        if !presets.contains_key(&policy.identity_key) {
            tracing::debug!(
                domain = %policy.domain,
                identity = %policy.identity_key,
                "Preset missing, falling back to baseline"
            );
            policy.identity_key = DEFAULT_PRESET_KEY.to_string();
            report.repaired += 1;
        }
    }

    let before = policies.len();
    policies.retain(|_, policy| !policy.is_default());
    report.removed = before - policies.len();

    report
}
