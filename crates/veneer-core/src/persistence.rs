//! Durable policy storage

use veneer_policy::PolicySnapshot;
use veneer_storage::Database;

use crate::Result;

/// Settings key holding the serialized snapshot
pub const POLICY_SETTINGS_KEY: &str = "policy_settings";

pub trait PolicyPersistence: Send + Sync {
    fn load(&self) -> Result<Option<PolicySnapshot>>;

    fn save(&self, snapshot: &PolicySnapshot) -> Result<()>;
}

/// Stores the snapshot as JSON in the settings table
#[derive(Clone)]
pub struct SettingsPersistence {
    db: Database,
}

impl SettingsPersistence {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl PolicyPersistence for SettingsPersistence {
    fn load(&self) -> Result<Option<PolicySnapshot>> {
        match self.db.get_setting(POLICY_SETTINGS_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &PolicySnapshot) -> Result<()> {
        let serialized = serde_json::to_string(snapshot)?;
        self.db.set_setting(POLICY_SETTINGS_KEY, &serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use veneer_policy::{PolicyStore, PolicyUpdate};

    #[test]
    fn test_snapshot_roundtrip() {
        let persistence = SettingsPersistence::new(Database::open_in_memory().unwrap());
        assert!(persistence.load().unwrap().is_none());

        let mut store = PolicyStore::new();
        store
            .set_policy("example.com", &PolicyUpdate::default().identity("bingbot"))
            .unwrap();
        persistence.save(&store.to_snapshot()).unwrap();

        let loaded = persistence.load().unwrap().unwrap();
        assert_eq!(PolicyStore::from_snapshot(loaded), store);
    }

    #[test]
    fn test_corrupt_settings_surface_as_errors() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(POLICY_SETTINGS_KEY, "{not json").unwrap();

        let persistence = SettingsPersistence::new(db);
        assert!(matches!(
            persistence.load(),
            Err(CoreError::Serialization(_))
        ));
    }
}
