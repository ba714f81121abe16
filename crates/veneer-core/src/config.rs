//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use veneer_rules::{RuleId, DEFAULT_RULE_ID_BASE};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the settings database
    pub database_path: PathBuf,
    /// First ID of the reserved header rule range
    pub rule_id_base: RuleId,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("veneer.db"),
            rule_id_base: DEFAULT_RULE_ID_BASE,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Veneer"))
            .unwrap_or_else(|| PathBuf::from(".veneer"))
    }

    /// Rule IDs must be positive and leave headroom for two IDs per domain
    pub fn validate(&self) -> Result<()> {
        if self.rule_id_base == 0 {
            return Err(CoreError::Config(
                "rule_id_base must be at least 1".to_string(),
            ));
        }
        if self.rule_id_base > RuleId::MAX / 2 {
            return Err(CoreError::Config(format!(
                "rule_id_base {} leaves no room for rule IDs",
                self.rule_id_base
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
