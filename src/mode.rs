//! Assistant personas

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The active assistant persona
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssistantMode {
    #[default]
    Default,
    Lawyer,
    Teacher,
    InterviewCoach,
    MotivationalCoach,
    LifeAssistant,
}

impl AssistantMode {
    /// Every mode, in declaration order
    pub const ALL: [Self; 6] = [
        Self::Default,
        Self::Lawyer,
        Self::Teacher,
        Self::InterviewCoach,
        Self::MotivationalCoach,
        Self::LifeAssistant,
    ];

    /// Wire name of the mode
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Lawyer => "LAWYER",
            Self::Teacher => "TEACHER",
            Self::InterviewCoach => "INTERVIEW_COACH",
            Self::MotivationalCoach => "MOTIVATIONAL_COACH",
            Self::LifeAssistant => "LIFE_ASSISTANT",
        }
    }

    /// Persona guidance injected into the system instruction
    #[must_use]
    pub const fn guidance(self) -> &'static str {
        match self {
            Self::Default => "Act as a warm, capable general assistant.",
            Self::Lawyer => {
                "Act as a careful legal assistant. Use precise language and suggest consulting a licensed lawyer for binding advice."
            }
            Self::Teacher => "Act as a patient teacher. Explain step by step and check understanding.",
            Self::InterviewCoach => {
                "Act as an interview coach. Ask realistic questions and give direct feedback on answers."
            }
            Self::MotivationalCoach => {
                "Act as a motivational coach. Be energetic and encouraging, and focus on concrete next steps."
            }
            Self::LifeAssistant => {
                "Act as a personal life assistant. Help plan the day, track goals, and remember what matters."
            }
        }
    }
}

impl fmt::Display for AssistantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown assistant mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for AssistantMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for mode in AssistantMode::ALL {
            assert_eq!(mode.as_str().parse::<AssistantMode>().unwrap(), mode);
        }
    }

    #[test]
    fn rejects_unknown_and_lowercase() {
        assert!("PIRATE".parse::<AssistantMode>().is_err());
        assert!("lawyer".parse::<AssistantMode>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&AssistantMode::InterviewCoach).unwrap();
        assert_eq!(json, "\"INTERVIEW_COACH\"");
    }
}
