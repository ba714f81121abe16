//! Script blocking patterns

use veneer_policy::{www_variant, PolicyStore};

use crate::pattern::UrlPattern;
use crate::substrate::ScriptBlockSubstrate;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptBlockCompiler;

impl ScriptBlockCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Bare and `www.` patterns for every domain with scripts blocked,
    /// in sorted domain order.
    pub fn compile(&self, store: &PolicyStore) -> Vec<UrlPattern> {
        store
            .policies()
            .iter()
            .filter(|(_, policy)| policy.block_scripts)
            .flat_map(|(domain, _)| {
                [
                    UrlPattern::for_host(domain),
                    UrlPattern::for_host(&www_variant(domain)),
                ]
            })
            .collect()
    }

    /// Clear the substrate and block every compiled pattern.
    pub fn install(
        &self,
        substrate: &dyn ScriptBlockSubstrate,
        store: &PolicyStore,
    ) -> Result<Vec<UrlPattern>> {
        let patterns = self.compile(store);

        substrate.clear_all()?;
        for pattern in &patterns {
            substrate.set_blocked(pattern)?;
        }

        tracing::info!(patterns = patterns.len(), "Installed script blocking patterns");

        Ok(patterns)
    }
}
