//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] veneer_storage::StorageError),

    #[error("Policy error: {0}")]
    Policy(#[from] veneer_policy::PolicyError),

    #[error("Substrate error: {0}")]
    Substrate(#[from] veneer_rules::SubstrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings were applied but not saved: {0}")]
    Persist(String),
}

