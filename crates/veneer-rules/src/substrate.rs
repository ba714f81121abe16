//! Enforcement substrates
//!
//! The request interception layer is external. These traits are the only
//! surface the engine talks to; the in-memory implementations follow the
//! same matching rules and back the tests and headless embedders.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

use crate::error::SubstrateError;
use crate::pattern::UrlPattern;
use crate::rule::{CompiledRule, HeaderOperation, ResourceKind, RuleId};
use crate::Result;

pub trait HeaderRuleSubstrate: Send + Sync {
    fn installed_rule_ids(&self) -> Result<Vec<RuleId>>;

    /// Remove `remove_ids`, then add `add_rules`, as one request.
    fn replace(&self, remove_ids: &[RuleId], add_rules: &[CompiledRule]) -> Result<()>;
}

pub trait ScriptBlockSubstrate: Send + Sync {
    fn clear_all(&self) -> Result<()>;

    fn set_blocked(&self, pattern: &UrlPattern) -> Result<()>;
}

/// Outgoing request headers, names compared case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            let (name, value): (String, String) = (name.into(), value.into());
            headers.set(&name, &value);
        }
        headers
    }
}

/// In-memory header rule table
#[derive(Debug, Default)]
pub struct MemoryHeaderRules {
    rules: Mutex<BTreeMap<RuleId, CompiledRule>>,
}

impl MemoryHeaderRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> Vec<CompiledRule> {
        self.rules.lock().values().cloned().collect()
    }

    /// Apply every matching rule's header operations, in rule ID order.
    ///
    /// Returns the number of rules that matched.
    pub fn apply_to_request(
        &self,
        url: &str,
        kind: ResourceKind,
        headers: &mut RequestHeaders,
    ) -> usize {
        let Ok(parsed) = Url::parse(url) else {
            return 0;
        };

        let rules = self.rules.lock();
        let mut matched = 0;
        for rule in rules.values().filter(|rule| rule.matches(&parsed, kind)) {
            matched += 1;
            for op in &rule.header_ops {
                match op.operation {
                    HeaderOperation::Set => {
                        headers.set(&op.header, op.value.as_deref().unwrap_or_default())
                    }
                    HeaderOperation::Remove => headers.remove(&op.header),
                }
            }
        }
        matched
    }
}

impl HeaderRuleSubstrate for MemoryHeaderRules {
    fn installed_rule_ids(&self) -> Result<Vec<RuleId>> {
        Ok(self.rules.lock().keys().copied().collect())
    }

    fn replace(&self, remove_ids: &[RuleId], add_rules: &[CompiledRule]) -> Result<()> {
        let mut rules = self.rules.lock();

        // Validate before touching anything so a rejected update changes nothing
        let remaining: BTreeSet<RuleId> = rules
            .keys()
            .copied()
            .filter(|id| !remove_ids.contains(id))
            .collect();
        let mut incoming = BTreeSet::new();
        for rule in add_rules {
            if remaining.contains(&rule.id) || !incoming.insert(rule.id) {
                return Err(SubstrateError::DuplicateRuleId(rule.id));
            }
        }

        for id in remove_ids {
            rules.remove(id);
        }
        for rule in add_rules {
            rules.insert(rule.id, rule.clone());
        }

        Ok(())
    }
}

/// In-memory script blocking list
#[derive(Debug, Default)]
pub struct MemoryScriptBlocker {
    patterns: Mutex<BTreeSet<UrlPattern>>,
}

impl MemoryScriptBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> Vec<UrlPattern> {
        self.patterns.lock().iter().cloned().collect()
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        self.patterns
            .lock()
            .iter()
            .any(|pattern| pattern.matches_url(&parsed))
    }
}

impl ScriptBlockSubstrate for MemoryScriptBlocker {
    fn clear_all(&self) -> Result<()> {
        self.patterns.lock().clear();
        Ok(())
    }

    fn set_blocked(&self, pattern: &UrlPattern) -> Result<()> {
        self.patterns.lock().insert(pattern.clone());
        Ok(())
    }
}

/// Stand-in for an environment without the enforcement API
#[derive(Debug, Clone, Default)]
pub struct UnavailableSubstrate;

impl UnavailableSubstrate {
    fn unavailable() -> SubstrateError {
        SubstrateError::Unavailable("not supported in this environment".to_string())
    }
}

impl HeaderRuleSubstrate for UnavailableSubstrate {
    fn installed_rule_ids(&self) -> Result<Vec<RuleId>> {
        Err(Self::unavailable())
    }

    fn replace(&self, _remove_ids: &[RuleId], _add_rules: &[CompiledRule]) -> Result<()> {
        Err(Self::unavailable())
    }
}

impl ScriptBlockSubstrate for UnavailableSubstrate {
    fn clear_all(&self) -> Result<()> {
        Err(Self::unavailable())
    }

    fn set_blocked(&self, _pattern: &UrlPattern) -> Result<()> {
        Err(Self::unavailable())
    }
}
