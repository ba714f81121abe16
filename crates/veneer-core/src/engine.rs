//! Policy engine
//!
//! The engine owns the policy store. Mutations are serialized by one lock
//! held from the change itself through pruning, persistence and rule
//! installation, because header rule reconciliation reads the installed set
//! and then replaces it. Readers never take that lock: they clone the last
//! published store, which is swapped in whole.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use veneer_policy::{
    effective_policy, resolve, DomainPolicy, EffectivePolicy, IdentityPreset, PolicyStore,
    PolicyUpdate,
};
use veneer_rules::{HeaderRuleSubstrate, RuleCompiler, ScriptBlockCompiler, ScriptBlockSubstrate};
use veneer_storage::Database;

use crate::config::Config;
use crate::error::CoreError;
use crate::persistence::{PolicyPersistence, SettingsPersistence};
use crate::Result;

pub struct Engine {
    persistence: Arc<dyn PolicyPersistence>,
    header_rules: Option<Arc<dyn HeaderRuleSubstrate>>,
    script_blocker: Option<Arc<dyn ScriptBlockSubstrate>>,
    rule_compiler: RuleCompiler,
    script_compiler: ScriptBlockCompiler,
    /// Authoritative store; holding this lock serializes mutations
    store: Arc<Mutex<PolicyStore>>,
    /// Last published store for readers
    published: Arc<RwLock<Arc<PolicyStore>>>,
}

impl Engine {
    /// Open the settings database named in the config
    pub fn new(config: Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&config.database_path)?;
        Self::with_persistence(config, Arc::new(SettingsPersistence::new(db)))
    }

    pub fn with_persistence(config: Config, persistence: Arc<dyn PolicyPersistence>) -> Result<Self> {
        config.validate()?;

        let store = PolicyStore::new();
        Ok(Self {
            rule_compiler: RuleCompiler::with_id_base(config.rule_id_base),
            script_compiler: ScriptBlockCompiler::new(),
            persistence,
            header_rules: None,
            script_blocker: None,
            published: Arc::new(RwLock::new(Arc::new(store.clone()))),
            store: Arc::new(Mutex::new(store)),
        })
    }

    pub fn with_header_rules(mut self, substrate: Arc<dyn HeaderRuleSubstrate>) -> Self {
        self.header_rules = Some(substrate);
        self
    }

    pub fn with_script_blocker(mut self, substrate: Arc<dyn ScriptBlockSubstrate>) -> Self {
        self.script_blocker = Some(substrate);
        self
    }

    /// Load persisted settings and install the enforcement state.
    ///
    /// Unreadable settings are logged and replaced by the defaults; they are
    /// not written back until the next successful mutation.
    pub fn initialize(&self) -> Result<()> {
        let mut store = self.store.lock();

        let loaded = match self.persistence.load() {
            Ok(Some(snapshot)) => {
                let restored = PolicyStore::from_snapshot(snapshot.clone());
                if restored.to_snapshot() != snapshot {
                    if let Err(e) = self.persistence.save(&restored.to_snapshot()) {
                        tracing::error!(error = %e, "Failed to save repaired settings");
                    }
                }
                restored
            }
            Ok(None) => PolicyStore::new(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load settings, using defaults");
                PolicyStore::new()
            }
        };

        *store = loaded;
        let published = self.publish(&store);
        self.enforce(&published);

        tracing::info!(
            presets = published.presets().len(),
            policies = published.policies().len(),
            "Policy engine initialized"
        );

        Ok(())
    }

    // === Reads ===

    /// The last published store. Never blocks on a mutation in flight.
    pub fn snapshot(&self) -> Arc<PolicyStore> {
        let published = self.published.read();
        Arc::clone(&*published)
    }

    /// Effective policy for a URL or host; `None` if no domain can be derived
    pub fn effective_policy(&self, input: &str) -> Option<EffectivePolicy> {
        effective_policy(&self.snapshot(), input)
    }

    pub fn resolve(&self, domain: &str) -> DomainPolicy {
        resolve(&self.snapshot(), domain)
    }

    pub fn presets(&self) -> Vec<IdentityPreset> {
        self.snapshot().presets().values().cloned().collect()
    }

    /// Stored overrides in domain order
    pub fn policies(&self) -> Vec<DomainPolicy> {
        self.snapshot().policies().values().cloned().collect()
    }

    // === Mutations ===

    /// Insert, replace (`Some`) or delete (`None`) a preset.
    pub fn set_preset(&self, key: &str, preset: Option<IdentityPreset>) -> Result<()> {
        match preset {
            Some(mut preset) => {
                preset.key = key.to_string();
                self.mutate(|store| store.upsert_preset(preset))
            }
            None => self.mutate(|store| store.remove_preset(key).map(|_| ())),
        }
    }

    pub fn add_preset(&self, name: &str, user_agent: &str, referer: &str) -> Result<IdentityPreset> {
        self.mutate(|store| store.add_preset(name, user_agent, referer))
    }

    pub fn replace_presets(&self, presets: Vec<IdentityPreset>) -> Result<()> {
        self.mutate(|store| store.replace_presets(presets))
    }

    pub fn set_domain_policy(&self, domain: &str, update: &PolicyUpdate) -> Result<DomainPolicy> {
        self.mutate(|store| store.set_policy(domain, update))
    }

    /// Returns whether an override existed
    pub fn clear_domain_policy(&self, domain: &str) -> Result<bool> {
        self.mutate(|store| store.clear_policy(domain).map(|removed| removed.is_some()))
    }

    /// Reinstall the enforcement state from the current store
    pub fn recompile(&self) {
        let store = self.store.lock();
        self.enforce(&store);
    }

    /// Run one mutation through the pipeline.
    ///
    /// Validation failures leave everything untouched. Once the change is
    /// accepted it is published and enforced even if saving fails; the
    /// save failure is still returned to the caller.
    fn mutate<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PolicyStore) -> veneer_policy::Result<T>,
    {
        let mut store = self.store.lock();

        let mut next = store.clone();
        let value = f(&mut next)?;
        let report = next.prune();
        if !report.is_clean() {
            tracing::debug!(
                repaired = report.repaired,
                removed = report.removed,
                "Pruned policies"
            );
        }
        *store = next;

        let published = self.publish(&store);
        let saved = self.persistence.save(&published.to_snapshot());
        self.enforce(&published);

        if let Err(e) = saved {
            tracing::error!(error = %e, "Failed to save settings");
            return Err(CoreError::Persist(e.to_string()));
        }

        Ok(value)
    }

    fn publish(&self, store: &PolicyStore) -> Arc<PolicyStore> {
        let published = Arc::new(store.clone());
        *self.published.write() = Arc::clone(&published);
        published
    }

    /// Push the store to both substrates. Failures degrade enforcement
    /// instead of failing the mutation.
    fn enforce(&self, store: &PolicyStore) {
        match &self.header_rules {
            Some(substrate) => {
                if let Err(e) = self.rule_compiler.install(substrate.as_ref(), store) {
                    tracing::warn!(error = %e, "Header rules not installed, requests pass unmodified");
                }
            }
            None => tracing::debug!("No header rule substrate, skipping"),
        }

        match &self.script_blocker {
            Some(substrate) => {
                if let Err(e) = self.script_compiler.install(substrate.as_ref(), store) {
                    tracing::warn!(error = %e, "Script blocking not installed");
                }
            }
            None => tracing::debug!("No script blocking substrate, skipping"),
        }
    }
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            persistence: Arc::clone(&self.persistence),
            header_rules: self.header_rules.clone(),
            script_blocker: self.script_blocker.clone(),
            rule_compiler: self.rule_compiler,
            script_compiler: self.script_compiler,
            store: Arc::clone(&self.store),
            published: Arc::clone(&self.published),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::POLICY_SETTINGS_KEY;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use veneer_policy::{PolicySnapshot, DEFAULT_PRESET_KEY};
    use veneer_rules::{
        HeaderOp, MemoryHeaderRules, MemoryScriptBlocker, RequestHeaders, ResourceKind,
        UnavailableSubstrate,
    };

    const GOOGLEBOT_UA: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    fn test_config() -> Config {
        Config {
            database_path: PathBuf::from(":memory:"),
            rule_id_base: 1000,
        }
    }

    struct Harness {
        engine: Engine,
        db: Database,
        rules: Arc<MemoryHeaderRules>,
        scripts: Arc<MemoryScriptBlocker>,
    }

    fn harness_with_db(db: Database) -> Harness {
        let rules = Arc::new(MemoryHeaderRules::new());
        let scripts = Arc::new(MemoryScriptBlocker::new());
        let engine = Engine::with_persistence(
            test_config(),
            Arc::new(SettingsPersistence::new(db.clone())),
        )
        .unwrap()
        .with_header_rules(rules.clone())
        .with_script_blocker(scripts.clone());
        engine.initialize().unwrap();

        Harness {
            engine,
            db,
            rules,
            scripts,
        }
    }

    fn harness() -> Harness {
        harness_with_db(Database::open_in_memory().unwrap())
    }

    /// Persistence whose saves can be switched off
    struct FlakyPersistence {
        inner: SettingsPersistence,
        failing: AtomicBool,
    }

    impl PolicyPersistence for FlakyPersistence {
        fn load(&self) -> Result<Option<PolicySnapshot>> {
            self.inner.load()
        }

        fn save(&self, snapshot: &PolicySnapshot) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CoreError::Config("disk full".to_string()));
            }
            self.inner.save(snapshot)
        }
    }

    #[test]
    fn test_engine_opens_database_from_config() {
        let engine = Engine::new(test_config()).unwrap();
        engine.initialize().unwrap();
        assert!(engine.policies().is_empty());
        assert!(engine.presets().iter().any(|p| p.is_baseline()));
    }

    #[test]
    fn test_unusable_data_dir_is_an_io_error() {
        let config = Config {
            database_path: PathBuf::from("/dev/null/veneer/veneer.db"),
            rule_id_base: 1000,
        };
        assert!(matches!(Engine::new(config), Err(CoreError::Io(_))));
    }

    #[test]
    fn test_end_to_end_googlebot_rewrite() {
        let h = harness();

        h.engine
            .set_domain_policy(
                "https://www.example.com/",
                &PolicyUpdate::default()
                    .identity("googlebot")
                    .block_outgoing_cookies(true),
            )
            .unwrap();

        let installed = h.rules.rules();
        assert_eq!(installed.len(), 2);
        let expected = vec![
            HeaderOp::set("User-Agent", GOOGLEBOT_UA),
            HeaderOp::set("Referer", "https://www.google.com/"),
            HeaderOp::remove("Cookie"),
        ];
        for rule in &installed {
            assert_eq!(rule.header_ops, expected);
        }

        let mut headers: RequestHeaders = [("Cookie", "sid=1")].into_iter().collect();
        h.rules
            .apply_to_request("https://example.com/paywall", ResourceKind::MainFrame, &mut headers);
        assert_eq!(headers.get("User-Agent"), Some(GOOGLEBOT_UA));
        assert_eq!(headers.get("Cookie"), None);
        assert!(h.scripts.patterns().is_empty());
    }

    #[test]
    fn test_mutations_persist_and_reload() {
        let db = Database::open_in_memory().unwrap();
        {
            let h = harness_with_db(db.clone());
            h.engine
                .set_domain_policy("example.com", &PolicyUpdate::default().block_scripts(true))
                .unwrap();
            h.engine.add_preset("Acme", "AcmeBot/1.0", "").unwrap();
        }

        let h = harness_with_db(db);
        assert!(h.engine.resolve("www.example.com").block_scripts);
        assert!(h.engine.presets().iter().any(|p| p.key == "acme"));
        // Startup recompiles onto fresh substrates
        assert!(h.scripts.is_blocked("https://example.com/"));
        assert!(h.rules.rules().is_empty());
    }

    #[test]
    fn test_preset_deletion_falls_back_to_baseline() {
        let h = harness();
        h.engine.add_preset("Acme", "AcmeBot/1.0", "https://acme.test/").unwrap();
        h.engine
            .set_domain_policy("example.com", &PolicyUpdate::default().identity("acme"))
            .unwrap();
        h.engine
            .set_domain_policy(
                "other.com",
                &PolicyUpdate::default().identity("acme").block_outgoing_cookies(true),
            )
            .unwrap();
        assert_eq!(h.rules.rules().len(), 4);

        h.engine.set_preset("acme", None).unwrap();

        assert_eq!(h.engine.resolve("example.com").identity_key, DEFAULT_PRESET_KEY);
        let remaining = h.engine.policies();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].domain, "other.com");
        let installed = h.rules.rules();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].header_ops, vec![HeaderOp::remove("Cookie")]);
    }

    #[test]
    fn test_baseline_preset_deletion_is_rejected() {
        let h = harness();
        let err = h.engine.set_preset(DEFAULT_PRESET_KEY, None).unwrap_err();
        assert!(matches!(err, CoreError::Policy(_)));
        assert!(h.engine.presets().iter().any(|p| p.is_baseline()));
    }

    #[test]
    fn test_rejected_update_changes_nothing() {
        let h = harness();
        h.engine
            .set_domain_policy("example.com", &PolicyUpdate::default().identity("bingbot"))
            .unwrap();
        let before = h.db.get_setting(POLICY_SETTINGS_KEY).unwrap();

        let err = h
            .engine
            .set_domain_policy(
                "example.com",
                &PolicyUpdate::default().identity("nope").block_scripts(true),
            )
            .unwrap_err();

        assert!(matches!(err, CoreError::Policy(_)));
        assert_eq!(h.engine.resolve("example.com").identity_key, "bingbot");
        assert!(!h.engine.resolve("example.com").block_scripts);
        assert_eq!(h.db.get_setting(POLICY_SETTINGS_KEY).unwrap(), before);
    }

    #[test]
    fn test_resetting_a_domain_retires_its_rules() {
        let h = harness();
        h.engine
            .set_domain_policy(
                "example.com",
                &PolicyUpdate::default().identity("twitterbot").block_scripts(true),
            )
            .unwrap();
        assert_eq!(h.rules.rules().len(), 2);
        assert_eq!(h.scripts.patterns().len(), 2);

        h.engine
            .set_domain_policy("example.com", &PolicyUpdate::reset())
            .unwrap();

        assert!(h.engine.policies().is_empty());
        assert!(h.rules.rules().is_empty());
        assert!(h.scripts.patterns().is_empty());
    }

    #[test]
    fn test_failed_save_is_reported_but_state_applies() {
        let db = Database::open_in_memory().unwrap();
        let persistence = Arc::new(FlakyPersistence {
            inner: SettingsPersistence::new(db),
            failing: AtomicBool::new(false),
        });
        let rules = Arc::new(MemoryHeaderRules::new());
        let engine = Engine::with_persistence(test_config(), persistence.clone())
            .unwrap()
            .with_header_rules(rules.clone());
        engine.initialize().unwrap();

        persistence.failing.store(true, Ordering::SeqCst);
        let err = engine
            .set_domain_policy("example.com", &PolicyUpdate::default().block_outgoing_cookies(true))
            .unwrap_err();

        assert!(matches!(err, CoreError::Persist(_)));
        assert!(engine.resolve("example.com").block_outgoing_cookies);
        assert_eq!(rules.rules().len(), 2);
        assert!(persistence.inner.load().unwrap().is_none());
    }

    #[test]
    fn test_missing_substrates_degrade_gracefully() {
        let engine = Engine::with_persistence(
            test_config(),
            Arc::new(SettingsPersistence::new(Database::open_in_memory().unwrap())),
        )
        .unwrap()
        .with_header_rules(Arc::new(UnavailableSubstrate))
        .with_script_blocker(Arc::new(UnavailableSubstrate));
        engine.initialize().unwrap();

        let policy = engine
            .set_domain_policy(
                "example.com",
                &PolicyUpdate::default().identity("googlebot").block_scripts(true),
            )
            .unwrap();
        assert_eq!(policy.identity_key, "googlebot");
        assert_eq!(engine.resolve("example.com"), policy);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(POLICY_SETTINGS_KEY, "[1, 2").unwrap();

        let h = harness_with_db(db);
        assert!(h.engine.policies().is_empty());
        assert_eq!(h.engine.presets().len(), 5);
    }

    #[test]
    fn test_stored_settings_without_presets_keep_builtins() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(
            POLICY_SETTINGS_KEY,
            r#"{"policies":{"example.com":{"domain":"example.com","identity_key":"googlebot"}}}"#,
        )
        .unwrap();

        let h = harness_with_db(db);
        assert_eq!(h.engine.presets().len(), 5);
        assert_eq!(h.engine.resolve("example.com").identity_key, "googlebot");
        assert_eq!(h.rules.rules().len(), 2);

        let stored: PolicySnapshot =
            serde_json::from_str(&h.db.get_setting(POLICY_SETTINGS_KEY).unwrap().unwrap()).unwrap();
        assert!(stored.presets.contains_key("googlebot"));
        assert!(stored.policies.contains_key("example.com"));
    }

    #[test]
    fn test_recompile_restores_cleared_substrates() {
        let h = harness();
        h.engine
            .set_domain_policy(
                "example.com",
                &PolicyUpdate::default().identity("bingbot").block_scripts(true),
            )
            .unwrap();

        h.scripts.clear_all().unwrap();
        h.rules.replace(&h.rules.installed_rule_ids().unwrap(), &[]).unwrap();
        assert!(h.scripts.patterns().is_empty());
        assert!(h.rules.rules().is_empty());

        h.engine.recompile();
        assert!(h.scripts.is_blocked("https://www.example.com/"));
        assert_eq!(h.rules.rules().len(), 2);
    }

    #[test]
    fn test_concurrent_mutations_keep_rule_ids_unique() {
        let h = harness();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = h.engine.clone();
                std::thread::spawn(move || {
                    engine
                        .set_domain_policy(
                            &format!("site{}.example", i),
                            &PolicyUpdate::default().block_outgoing_cookies(true),
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: Vec<u32> = h.rules.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1000..1016).collect::<Vec<u32>>());
        assert_eq!(h.engine.policies().len(), 8);
    }
}
