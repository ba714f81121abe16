//! Veneer Core
//!
//! Owns the policy store and runs every change through one serialized
//! pipeline: mutate, prune, publish, persist, recompile.

mod config;
mod engine;
mod error;
pub mod messages;
mod persistence;

pub use config::Config;
pub use engine::Engine;
pub use error::CoreError;
pub use persistence::{PolicyPersistence, SettingsPersistence, POLICY_SETTINGS_KEY};

// Re-export the building blocks
pub use veneer_policy::{
    normalize_domain, DomainPolicy, EffectivePolicy, IdentityPreset, PolicyError, PolicySnapshot,
    PolicyStore, PolicyUpdate, DEFAULT_PRESET_KEY,
};
pub use veneer_rules::{
    Compilation, CompiledRule, HeaderOp, HeaderOperation, HeaderRuleSubstrate, MemoryHeaderRules,
    MemoryScriptBlocker, RequestHeaders, ResourceKind, RuleCompiler, RuleId, ScriptBlockCompiler,
    ScriptBlockSubstrate, SubstrateError, UnavailableSubstrate, UrlPattern,
};
pub use veneer_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
