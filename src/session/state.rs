//! Connection state and the observable engine status

use std::fmt;

use serde::Serialize;

use crate::db::Message;
use crate::mode::AssistantMode;

/// Connection state of the live session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
        }
    }

    /// Whether a session is open or opening
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: ConnectionState,
    /// Smoothed input loudness in [0, 1]
    pub volume: f32,
    /// User-visible error, if any
    pub error: Option<String>,
    pub messages: Vec<Message>,
    pub mode: AssistantMode,
    pub online: bool,
    pub power: bool,
}
