//! Enforcement substrate errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("Enforcement substrate unavailable: {0}")]
    Unavailable(String),

    #[error("Rule ID already installed: {0}")]
    DuplicateRuleId(u32),
}
