//! Key/value blob storage with versioned JSON records
//!
//! Records are written as `{"version": N, "data": ...}`. Readers also accept
//! the bare legacy shape, and fall back to a default on anything else.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::DbPool;
use crate::{Error, Result};

/// Version tag written into every JSON record
pub const RECORD_VERSION: u64 = 1;

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u64,
    data: &'a T,
}

/// Raw key/value access over the `kv` table
#[derive(Clone)]
pub struct KvStore {
    pool: DbPool,
}

impl KvStore {
    /// Create a new key/value store
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Read the raw value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be queried
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;

        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Store a raw value under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;

        Ok(())
    }

    /// Delete the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Serialize `value` into a versioned record under `key`
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn save_record<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(&Envelope {
            version: RECORD_VERSION,
            data: value,
        })?;
        self.set(key, &json)
    }

    /// Load the record stored under `key` as parsed JSON
    ///
    /// Returns `None` when the key is missing, unreadable, or not a record of
    /// the current version. Never fails.
    #[must_use]
    pub fn load_value(&self, key: &str) -> Option<serde_json::Value> {
        let raw = match self.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored record");
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "stored record is not valid JSON");
                return None;
            }
        };

        unwrap_envelope(key, value)
    }

    /// Load and decode the record under `key`, or `T::default()` on any failure
    #[must_use]
    pub fn load_record<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(value) = self.load_value(key) else {
            return T::default();
        };

        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "stored record has unexpected shape, using default");
            T::default()
        })
    }
}

/// Strip the version envelope, accepting bare legacy values
fn unwrap_envelope(key: &str, value: serde_json::Value) -> Option<serde_json::Value> {
    let is_envelope = value
        .as_object()
        .is_some_and(|obj| obj.len() == 2 && obj.contains_key("version") && obj.contains_key("data"));

    if !is_envelope {
        return Some(value);
    }

    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(RECORD_VERSION) {
        tracing::warn!(key, ?version, "unsupported record version, using default");
        return None;
    }

    value.get("data").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn store() -> KvStore {
        KvStore::new(init_memory().unwrap())
    }

    #[test]
    fn set_get_remove() {
        let kv = store();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.set("a", "1").unwrap();
        kv.set("a", "2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("2"));

        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
    }

    #[test]
    fn records_are_versioned() {
        let kv = store();
        kv.save_record("list", &vec![1, 2, 3]).unwrap();

        let raw = kv.get("list").unwrap().unwrap();
        assert_eq!(raw, r#"{"version":1,"data":[1,2,3]}"#);

        let loaded: Vec<i32> = kv.load_record("list");
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn bare_legacy_values_are_accepted() {
        let kv = store();
        kv.set("list", "[4,5]").unwrap();
        let loaded: Vec<i32> = kv.load_record("list");
        assert_eq!(loaded, vec![4, 5]);
    }

    #[test]
    fn corrupt_values_fall_back_to_default() {
        let kv = store();
        kv.set("list", "{not json").unwrap();
        let loaded: Vec<i32> = kv.load_record("list");
        assert!(loaded.is_empty());

        kv.set("list", r#"{"version":99,"data":[1]}"#).unwrap();
        let loaded: Vec<i32> = kv.load_record("list");
        assert!(loaded.is_empty());

        kv.set("list", r#"{"unexpected":true}"#).unwrap();
        let loaded: Vec<i32> = kv.load_record("list");
        assert!(loaded.is_empty());
    }
}
