//! Veneer Policy Model
//!
//! Per-domain outbound identity policies:
//! - Identity presets: named User-Agent/Referer pairs, `chrome` is the neutral baseline
//! - Domain policies: preset selection plus script and outgoing-cookie blocking
//! - Resolution: effective policy for a domain or URL, `www.` folded into the bare domain
//! - Pruning: dangling preset references repaired, no-op overrides removed

mod domain;
mod error;
mod policy;
mod preset;
mod pruner;
mod resolver;
mod store;

pub use domain::{normalize_domain, www_variant};
pub use error::PolicyError;
pub use policy::{DomainPolicy, PolicyUpdate};
pub use preset::{builtin_presets, preset_key_from_name, IdentityPreset, DEFAULT_PRESET_KEY};
pub use pruner::{prune, PruneReport};
pub use resolver::{effective_policy, resolve, EffectivePolicy};
pub use store::{PolicySnapshot, PolicyStore};

pub type Result<T> = std::result::Result<T, PolicyError>;
