//! Live session transport seam
//!
//! The remote protocol itself is provided by a [`Transport`] implementation.
//! The engine only relies on the message shapes below and on callbacks
//! delivered through [`SessionEvents`], which carry the generation of the
//! session they belong to.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;
use crate::db::GroundingReference;
use crate::tools::{ToolCall, ToolEffect, ToolResponse};
use crate::voice::AudioChunk;

/// Configuration sent when opening a live session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    pub model: String,
    /// Always `AUDIO`
    pub response_modality: String,
    pub voice_name: String,
    pub system_instruction: String,
    /// Function declarations
    pub tools: Vec<Value>,
    /// Offer search grounding alongside the declared tools
    pub google_search: bool,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

/// One inbound message from the live session
///
/// Every field is optional; a message may carry any combination.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    /// The owner interrupted agent speech
    pub interrupted: bool,
    /// Citations for the current agent turn
    pub grounding: Option<Vec<GroundingReference>>,
    /// Owner speech-to-text delta
    pub input_transcription: Option<String>,
    /// Agent speech-to-text delta
    pub output_transcription: Option<String>,
    pub turn_complete: bool,
    pub tool_calls: Vec<ToolCall>,
    /// Base64 PCM16 at the playback rate
    pub audio: Option<String>,
}

/// Callback surface of a session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(Box<ServerMessage>),
    Closed,
    Failed(String),
}

/// Everything the controller's event loop reacts to
#[derive(Debug)]
pub(crate) enum EngineEvent {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Frame {
        generation: u64,
        samples: Vec<f32>,
    },
    PlaybackEnded {
        generation: u64,
        id: u64,
    },
    /// A tool batch finished off the event loop
    ToolsDone {
        generation: u64,
        responses: Vec<ToolResponse>,
        effects: Vec<ToolEffect>,
    },
}

/// Handle a transport uses to report session callbacks
///
/// Events sent after the session was superseded are ignored by the controller.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl SessionEvents {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the session these events belong to
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn send(&self, event: TransportEvent) {
        let sent = self.tx.send(EngineEvent::Transport {
            generation: self.generation,
            event,
        });
        if sent.is_err() {
            tracing::trace!(generation = self.generation, "session event after engine shutdown");
        }
    }

    /// The session is open
    pub fn opened(&self) {
        self.send(TransportEvent::Opened);
    }

    /// An inbound message arrived
    pub fn message(&self, message: ServerMessage) {
        self.send(TransportEvent::Message(Box::new(message)));
    }

    /// The remote closed the session cleanly
    pub fn closed(&self) {
        self.send(TransportEvent::Closed);
    }

    /// The session failed
    pub fn failed(&self, reason: impl Into<String>) {
        self.send(TransportEvent::Failed(reason.into()));
    }
}

/// Opens live sessions with the remote conversation service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session; callbacks are delivered through `events`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established
    async fn open(
        &self,
        config: LiveConfig,
        api_key: &SecretString,
        events: SessionEvents,
    ) -> Result<Box<dyn LiveSession>>;
}

/// An open live session
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Push one realtime audio chunk. Fire-and-forget.
    fn send_audio(&self, chunk: AudioChunk);

    /// Send the results of a tool-call batch
    ///
    /// # Errors
    ///
    /// Returns error if the session can no longer send
    async fn send_tool_responses(&self, responses: Vec<ToolResponse>) -> Result<()>;

    /// Close the session
    ///
    /// # Errors
    ///
    /// Returns error if the close handshake fails
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_fields_are_optional() {
        let msg: ServerMessage = serde_json::from_str(r#"{"turnComplete":true}"#).unwrap();
        assert!(msg.turn_complete);
        assert!(!msg.interrupted);
        assert!(msg.tool_calls.is_empty());

        let msg: ServerMessage = serde_json::from_str(
            r#"{"outputTranscription":"Hi","toolCalls":[{"id":"1","name":"clear_chat"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.output_transcription.as_deref(), Some("Hi"));
        assert_eq!(msg.tool_calls[0].name, "clear_chat");
        assert!(msg.tool_calls[0].args.is_null());
    }

    #[test]
    fn events_carry_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = SessionEvents::new(7, tx);
        events.opened();

        match rx.try_recv().unwrap() {
            EngineEvent::Transport { generation, event } => {
                assert_eq!(generation, 7);
                assert_eq!(event, TransportEvent::Opened);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
