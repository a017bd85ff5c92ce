//! Locally synthesized spoken notices
//!
//! Used when the remote service cannot be reached, so the owner still hears
//! why the assistant went quiet.

use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Speaks short text without the remote service
pub trait LocalSpeech: Send + Sync {
    /// Start speaking `text`. Must not block.
    fn speak(&self, text: &str);
}

/// Shells out to the first system synthesizer found on PATH
pub struct SystemSpeech {
    program: Option<PathBuf>,
}

impl Default for SystemSpeech {
    fn default() -> Self {
        Self::detect()
    }
}

impl SystemSpeech {
    const CANDIDATES: [&'static str; 4] = ["say", "espeak-ng", "espeak", "spd-say"];

    /// Locate an available synthesizer
    #[must_use]
    pub fn detect() -> Self {
        let program = Self::CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok());

        match &program {
            Some(path) => tracing::debug!(program = %path.display(), "local speech available"),
            None => tracing::debug!("no local speech synthesizer found"),
        }

        Self { program }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

impl LocalSpeech for SystemSpeech {
    fn speak(&self, text: &str) {
        let Some(program) = &self.program else {
            tracing::warn!(text, "cannot speak notice, no synthesizer available");
            return;
        };

        let spawned = Command::new(program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            // Reap the child off-thread
            Ok(mut child) => {
                std::thread::spawn(move || child.wait());
            }
            Err(e) => {
                tracing::warn!(program = %program.display(), error = %e, "failed to speak notice");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaking_without_synthesizer_is_a_no_op() {
        let speech = SystemSpeech { program: None };
        assert!(!speech.is_available());
        speech.speak("offline");
    }
}
