//! Ephemeral session state: the visible transcript and the active mode
//!
//! Survives reconnects and restarts. Cleared only by the clear-chat and
//! shutdown tools, never by disconnect.

use serde::{Deserialize, Serialize};

use super::KvStore;
use crate::Result;
use crate::mode::AssistantMode;

const MESSAGES_KEY: &str = "mayra_session_msgs";
const MODE_KEY: &str = "mayra_session_mode";

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The owner, from input transcription
    User,
    /// The assistant, from output transcription
    #[serde(alias = "mayra")]
    Agent,
}

/// A search citation attached to an agent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingReference {
    pub uri: String,
    pub title: String,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_references: Option<Vec<GroundingReference>>,
}

impl Message {
    /// Create an unfinalized message with a fresh id
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            is_final: false,
            grounding_references: None,
        }
    }
}

/// Session state repository
#[derive(Clone)]
pub struct SessionRepo {
    kv: KvStore,
}

impl SessionRepo {
    /// Create a new session repository
    #[must_use]
    pub const fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Load persisted messages, skipping malformed entries
    #[must_use]
    pub fn load_messages(&self) -> Vec<Message> {
        let Some(value) = self.kv.load_value(MESSAGES_KEY) else {
            return Vec::new();
        };

        let serde_json::Value::Array(entries) = value else {
            tracing::warn!("stored session messages are not a list, ignoring");
            return Vec::new();
        };

        entries
            .into_iter()
            .filter_map(|entry| {
                serde_json::from_value(entry)
                    .map_err(|e| tracing::warn!(error = %e, "skipping malformed session message"))
                    .ok()
            })
            .collect()
    }

    /// Persist the full message list
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.kv.save_record(MESSAGES_KEY, &messages)
    }

    /// Load the persisted mode, defaulting on missing or unknown values
    #[must_use]
    pub fn load_mode(&self) -> AssistantMode {
        match self.kv.get(MODE_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stored mode is invalid, using default");
                AssistantMode::Default
            }),
            Ok(None) => AssistantMode::Default,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored mode");
                AssistantMode::Default
            }
        }
    }

    /// Persist the active mode as its raw name
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn save_mode(&self, mode: AssistantMode) -> Result<()> {
        self.kv.set(MODE_KEY, mode.as_str())
    }

    /// Delete the persisted transcript only
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails
    pub fn clear_messages(&self) -> Result<()> {
        self.kv.remove(MESSAGES_KEY)
    }

    /// Delete the persisted transcript and mode
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails
    pub fn clear(&self) -> Result<()> {
        self.kv.remove(MESSAGES_KEY)?;
        self.kv.remove(MODE_KEY)
    }
}
