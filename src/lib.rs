//! Mayra - live session engine for a voice-first conversational assistant
//!
//! This library provides the core of the assistant:
//! - Live session lifecycle with power- and network-driven auto-recovery
//! - Microphone capture and gapless speaker playback
//! - Streaming transcript assembly with persistence
//! - Tool dispatch for agent-initiated side effects
//! - Owner preferences and long-term memory
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Host (CLI, UI, power toggle)            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ power / network / EngineStatus
//! ┌────────────────────▼────────────────────────────────┐
//! │                SessionController                     │
//! │  Capture  │  Playback  │  Transcript  │  Tools      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Transport / LiveSession
//! ┌────────────────────▼────────────────────────────────┐
//! │          Remote conversation service                 │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod mode;
pub mod prompt;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod voice;

pub use config::Config;
pub use db::{DbPool, Stores};
pub use error::{Error, Result};
pub use mode::AssistantMode;
pub use session::{ConnectionState, EngineDeps, EngineStatus, SessionController};
