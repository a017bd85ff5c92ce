//! Incremental transcript assembly
//!
//! A delta from the same speaker as the last unfinalized message extends it.
//! Any other delta finalizes every message and starts a new one. Turn-complete
//! and interruption finalize everything, and nothing is ever appended to a
//! finalized message.

use crate::db::{GroundingReference, Message, Sender};

/// Direction of a transcription event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptKind {
    /// Owner speech, from input transcription
    Input,
    /// Agent speech, from output transcription
    Output,
}

impl TranscriptKind {
    #[must_use]
    pub const fn sender(self) -> Sender {
        match self {
            Self::Input => Sender::User,
            Self::Output => Sender::Agent,
        }
    }
}

/// Ordered list of transcript messages
#[derive(Debug, Clone, Default)]
pub struct TranscriptAssembler {
    messages: Vec<Message>,
}

impl TranscriptAssembler {
    /// Resume from previously persisted messages
    #[must_use]
    pub const fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Apply one delta, returning whether anything changed
    ///
    /// Empty deltas are ignored. New grounding references replace the ones on
    /// the message being extended.
    pub fn apply(
        &mut self,
        kind: TranscriptKind,
        delta: &str,
        grounding: Option<&[GroundingReference]>,
    ) -> bool {
        if delta.is_empty() {
            return false;
        }

        let sender = kind.sender();
        let grounding = grounding.filter(|g| !g.is_empty()).map(<[_]>::to_vec);

        if let Some(last) = self
            .messages
            .last_mut()
            .filter(|m| m.sender == sender && !m.is_final)
        {
            last.text.push_str(delta);
            if grounding.is_some() {
                last.grounding_references = grounding;
            }
            return true;
        }

        self.finalize_all();

        let mut message = Message::new(sender, delta);
        message.grounding_references = grounding;
        self.messages.push(message);
        true
    }

    /// Mark every message final, returning whether any changed
    pub fn finalize_all(&mut self) -> bool {
        let mut changed = false;
        for message in self.messages.iter_mut().filter(|m| !m.is_final) {
            message.is_final = true;
            changed = true;
        }
        changed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
