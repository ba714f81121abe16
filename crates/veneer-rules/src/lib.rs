//! Veneer Rule Compilation
//!
//! Turns the policy set into enforcement state:
//! - Header rules: User-Agent/Referer rewrite and Cookie removal, two rules
//!   per domain (bare and `www.`), IDs allocated from a reserved range
//! - Script blocking: two URL patterns per domain with scripts disabled
//!
//! Both are regenerated in full on every change and pushed to their
//! enforcement substrate.

mod compiler;
mod error;
mod pattern;
mod rule;
mod script;
mod substrate;

pub use compiler::{reconcile, Compilation, RuleCompiler, DEFAULT_RULE_ID_BASE};
pub use error::SubstrateError;
pub use pattern::UrlPattern;
pub use rule::{CompiledRule, HeaderOp, HeaderOperation, ResourceKind, RuleId, RULE_PRIORITY};
pub use script::ScriptBlockCompiler;
pub use substrate::{
    HeaderRuleSubstrate, MemoryHeaderRules, MemoryScriptBlocker, RequestHeaders,
    ScriptBlockSubstrate, UnavailableSubstrate,
};

pub type Result<T> = std::result::Result<T, SubstrateError>;
