//! Owner preferences

use serde::{Deserialize, Serialize};

use super::KvStore;
use crate::Result;

const KEY: &str = "mayra_prefs";

/// Long-lived owner preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerPreferences {
    /// Name the owner wants to be called
    #[serde(default)]
    pub name: Option<String>,

    /// Whether onboarding has completed
    #[serde(default)]
    pub onboarded: bool,
}

/// Owner preferences repository
#[derive(Clone)]
pub struct PrefsRepo {
    kv: KvStore,
}

impl PrefsRepo {
    /// Create a new preferences repository
    #[must_use]
    pub const fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Load preferences, defaulting on missing or corrupt data
    #[must_use]
    pub fn load(&self) -> OwnerPreferences {
        self.kv.load_record(KEY)
    }

    /// Persist preferences
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn save(&self, prefs: &OwnerPreferences) -> Result<()> {
        self.kv.save_record(KEY, prefs)
    }

    /// Record the owner's name and mark onboarding complete
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn set_name(&self, name: &str) -> Result<OwnerPreferences> {
        let mut prefs = self.load();
        prefs.name = Some(name.to_string());
        prefs.onboarded = true;
        self.save(&prefs)?;

        tracing::info!(name, "owner name updated");
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn defaults_to_unknown_owner() {
        let repo = PrefsRepo::new(KvStore::new(init_memory().unwrap()));
        let prefs = repo.load();
        assert_eq!(prefs.name, None);
        assert!(!prefs.onboarded);
    }

    #[test]
    fn set_name_marks_onboarded() {
        let repo = PrefsRepo::new(KvStore::new(init_memory().unwrap()));
        repo.set_name("Asha").unwrap();

        let prefs = repo.load();
        assert_eq!(prefs.name.as_deref(), Some("Asha"));
        assert!(prefs.onboarded);
    }

    #[test]
    fn reads_legacy_shape() {
        let kv = KvStore::new(init_memory().unwrap());
        kv.set(KEY, r#"{"name":"Ravi","onboarded":true}"#).unwrap();

        let prefs = PrefsRepo::new(kv).load();
        assert_eq!(prefs.name.as_deref(), Some("Ravi"));
    }
}
