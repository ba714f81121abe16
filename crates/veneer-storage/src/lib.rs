//! Veneer Storage Layer
//!
//! SQLite-backed key/value settings store. The policy engine keeps its
//! whole snapshot under a single settings key.

mod database;
mod error;
mod migrations;

pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
