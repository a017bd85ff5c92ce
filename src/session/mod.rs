//! Live session engine
//!
//! [`SessionController`] owns the connection state machine and the single
//! active session handle, and wires capture, playback, transcript assembly,
//! and tool dispatch together.

mod controller;
mod recovery;
mod state;
mod transport;

pub use controller::{EngineDeps, SessionController, ShutdownHook};
pub use recovery::{RecoveryAction, RecoveryPolicy};
pub use state::{ConnectionState, EngineStatus};
pub use transport::{LiveConfig, LiveSession, ServerMessage, SessionEvents, Transport, TransportEvent};

/// Shown when connecting without network
pub const OFFLINE_ERROR: &str = "Offline Mode: Internet unavailable";

/// Spoken locally when connecting without network
pub const OFFLINE_UTTERANCE: &str = "I'm offline right now, but I'll do my best when you reconnect.";

/// Shown when no API credential is configured
pub const MISSING_API_KEY_ERROR: &str = "API Key is missing";

/// Shown on transport errors
pub const CONNECTION_FAILED_ERROR: &str = "Connection failed";

/// Shown when local setup (microphone, speaker) fails
pub const INIT_FAILED_ERROR: &str = "Failed to initialize Mayra";
