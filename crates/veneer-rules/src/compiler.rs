//! Header rule compiler
//!
//! Rules are never patched in place. Each compilation derives the complete
//! rule set from the policy store and retires everything that was installed
//! before, together with every ID it is about to install:
//!
//! ```text
//! ids_to_retire = installed ∪ new_ids
//! ```
//!
//! IDs are allocated in sorted domain order, two per domain, starting at
//! the configured base, so the same policy set always yields the same IDs.

use std::collections::BTreeSet;

use veneer_policy::{www_variant, DomainPolicy, PolicyStore};

use crate::pattern::UrlPattern;
use crate::rule::{CompiledRule, HeaderOp, ResourceKind, RuleId, RULE_PRIORITY};
use crate::substrate::HeaderRuleSubstrate;
use crate::Result;

pub const DEFAULT_RULE_ID_BASE: RuleId = 1000;

const USER_AGENT: &str = "User-Agent";
const REFERER: &str = "Referer";
const COOKIE: &str = "Cookie";

/// Output of one compilation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compilation {
    pub rules: Vec<CompiledRule>,
    /// Sorted and free of duplicates
    pub ids_to_retire: Vec<RuleId>,
}

impl Compilation {
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|rule| rule.id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleCompiler {
    id_base: RuleId,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::with_id_base(DEFAULT_RULE_ID_BASE)
    }

    pub fn with_id_base(id_base: RuleId) -> Self {
        Self { id_base }
    }

    pub fn id_base(&self) -> RuleId {
        self.id_base
    }

    /// Header operations a policy needs, in application order.
    ///
    /// A baseline identity with cookies allowed produces nothing, even when
    /// scripts are blocked: script blocking lives on a different substrate.
    pub fn header_ops(policy: &DomainPolicy, store: &PolicyStore) -> Vec<HeaderOp> {
        let mut ops = Vec::new();

        if !policy.uses_baseline_identity() {
            // An unresolved key behaves like the baseline
            if let Some(preset) = store.preset(&policy.identity_key) {
                ops.push(HeaderOp::set(USER_AGENT, &preset.user_agent));
                if preset.has_referer() {
                    ops.push(HeaderOp::set(REFERER, &preset.referer));
                }
            }
        }

        if policy.block_outgoing_cookies {
            ops.push(HeaderOp::remove(COOKIE));
        }

        ops
    }

    /// Compile the full rule set and the IDs to retire before installing it.
    pub fn compile(&self, store: &PolicyStore, installed: &[RuleId]) -> Compilation {
        let mut rules = Vec::new();
        // `None` once the ID space above the base is used up
        let mut next_id = Some(self.id_base);

        // BTreeMap iteration is sorted by domain, which keeps IDs stable
        for (domain, policy) in store.policies() {
            if policy.uses_baseline_identity() && !policy.block_outgoing_cookies {
                continue;
            }

            let header_ops = Self::header_ops(policy, store);
            if header_ops.is_empty() {
                continue;
            }

            let ids = next_id.and_then(|bare| Some((bare, bare.checked_add(1)?)));
            let Some((bare_id, www_id)) = ids else {
                tracing::warn!(
                    domain = %domain,
                    id_base = self.id_base,
                    "Rule IDs exhausted, remaining domains get no header rules"
                );
                break;
            };

            for (id, host) in [(bare_id, domain.clone()), (www_id, www_variant(domain))] {
                rules.push(CompiledRule {
                    id,
                    priority: RULE_PRIORITY,
                    domain_pattern: UrlPattern::for_host(&host),
                    resource_kinds: ResourceKind::REWRITTEN.to_vec(),
                    header_ops: header_ops.clone(),
                });
            }
            next_id = www_id.checked_add(1);
        }

        let ids_to_retire = reconcile(installed, rules.iter().map(|rule| rule.id));

        Compilation {
            rules,
            ids_to_retire,
        }
    }

    /// Read the installed IDs, compile, and swap the substrate's rule set
    /// in a single `replace` call.
    pub fn install(
        &self,
        substrate: &dyn HeaderRuleSubstrate,
        store: &PolicyStore,
    ) -> Result<Compilation> {
        let installed = substrate.installed_rule_ids()?;
        let compilation = self.compile(store, &installed);

        substrate.replace(&compilation.ids_to_retire, &compilation.rules)?;

        tracing::info!(
            rules = compilation.rules.len(),
            retired = compilation.ids_to_retire.len(),
            "Installed header rules"
        );

        Ok(compilation)
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Every installed ID plus every ID about to be installed, sorted.
pub fn reconcile<I>(installed: &[RuleId], new_ids: I) -> Vec<RuleId>
where
    I: IntoIterator<Item = RuleId>,
{
    installed
        .iter()
        .copied()
        .chain(new_ids)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
