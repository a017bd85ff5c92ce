//! Error types for the Mayra live session engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the live session engine
#[derive(Debug, Error)]
pub enum Error {
    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone missing or access denied
    #[error("microphone unavailable: {0}")]
    Microphone(String),

    /// Remote session transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Tool invocation error
    #[error("tool error: {0}")]
    Tool(String),

    /// Document export error
    #[error("export error: {0}")]
    Export(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
