//! Policy error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Preset cannot be removed: {0}")]
    ProtectedPreset(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid preset {key}: {reason}")]
    InvalidPreset { key: String, reason: String },

    #[error("Preset already exists: {0}")]
    DuplicatePreset(String),

    #[error("Cannot derive a domain from: {0}")]
    MalformedDomain(String),
}
