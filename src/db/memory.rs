//! Long-term memory items
//!
//! Items are ordered by insertion and addressed by position. They are never
//! edited, only appended or deleted.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::KvStore;
use crate::Result;

const KEY: &str = "mayra_memory";

/// Category used when the agent does not supply one
pub const DEFAULT_CATEGORY: &str = "General";

/// A remembered fact, preference, or goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Category label (e.g. "Preference", "Goal")
    pub category: String,

    /// The remembered information
    pub details: String,

    /// ISO-8601 creation time
    pub timestamp: String,
}

impl MemoryItem {
    /// Create a memory item stamped with the current time
    #[must_use]
    pub fn new(category: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            details: details.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Long-term memory repository
#[derive(Clone)]
pub struct MemoryRepo {
    kv: KvStore,
}

impl MemoryRepo {
    /// Create a new memory repository
    #[must_use]
    pub const fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// List all items in insertion order
    ///
    /// Entries that do not match the item shape are skipped.
    #[must_use]
    pub fn list(&self) -> Vec<MemoryItem> {
        let Some(value) = self.kv.load_value(KEY) else {
            return Vec::new();
        };

        let serde_json::Value::Array(entries) = value else {
            tracing::warn!("stored memory is not a list, ignoring");
            return Vec::new();
        };

        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed memory item");
                    None
                }
            })
            .collect()
    }

    fn save(&self, items: &[MemoryItem]) -> Result<()> {
        self.kv.save_record(KEY, &items)
    }

    /// Append an item, returning the new item count
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn add(&self, item: MemoryItem) -> Result<usize> {
        let mut items = self.list();
        tracing::debug!(category = %item.category, "saving memory");
        items.push(item);
        self.save(&items)?;
        Ok(items.len())
    }

    /// Delete items by position, returning how many were removed
    ///
    /// Positions refer to the list as it was before the call. Duplicates and
    /// out-of-range positions are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn delete_indices(&self, indices: &[usize]) -> Result<usize> {
        let mut items = self.list();

        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut removed = 0;
        for index in sorted {
            if index < items.len() {
                items.remove(index);
                removed += 1;
            }
        }

        self.save(&items)?;
        tracing::debug!(removed, remaining = items.len(), "memories deleted");
        Ok(removed)
    }

    /// Delete every item
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }
}

/// Format items as `[index] category: details` lines
#[must_use]
pub fn format_listing(items: &[MemoryItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, m)| format!("[{i}] {}: {}", m.category, m.details))
        .collect::<Vec<_>>()
        .join("\n")
}
