//! System instruction builder
//!
//! Assembles the instruction sent when a live session opens from the time of
//! day, the screen-size class, owner preferences, stored memories, whether a
//! previous transcript exists, and the active persona.

use std::fmt::Write as _;

use chrono::Timelike;

use crate::db::{MemoryItem, OwnerPreferences, Stores};
use crate::mode::AssistantMode;
use crate::tools::TOOL_NAMES;

/// Coarse time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Bucket a local hour (0-23)
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour {
            0..5 => Self::Night,
            5..12 => Self::Morning,
            12..17 => Self::Afternoon,
            17..21 => Self::Evening,
            _ => Self::Night,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Afternoon => "Afternoon",
            Self::Evening => "Evening",
            Self::Night => "Night",
        }
    }
}

/// Screen-size class derived from the logical width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenClass {
    Mobile,
    Tablet,
    Desktop,
}

impl ScreenClass {
    /// Classify a width; unknown widths count as desktop
    #[must_use]
    pub const fn from_width(width: Option<u32>) -> Self {
        match width {
            Some(w) if w < 768 => Self::Mobile,
            Some(w) if w < 1024 => Self::Tablet,
            _ => Self::Desktop,
        }
    }

    const fn guidance(self) -> &'static str {
        match self {
            Self::Mobile => {
                "DISPLAY: small phone screen. Keep replies very short, two or three sentences per turn unless asked to go deeper."
            }
            Self::Tablet => "DISPLAY: tablet screen. Use a balanced, comfortable reading length.",
            Self::Desktop => {
                "DISPLAY: large desktop screen. Detailed answers with headings and lists are fine."
            }
        }
    }
}

/// Everything the instruction depends on
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub time_of_day: TimeOfDay,
    pub screen: ScreenClass,
    pub prefs: OwnerPreferences,
    pub memories: Vec<MemoryItem>,
    pub has_history: bool,
    pub mode: AssistantMode,
    /// Search grounding is offered to the model
    pub google_search: bool,
}

impl PromptContext {
    /// Gather context from the stores and the local clock
    #[must_use]
    pub fn gather(stores: &Stores, screen_width: Option<u32>, mode: AssistantMode) -> Self {
        Self {
            time_of_day: TimeOfDay::from_hour(chrono::Local::now().hour()),
            screen: ScreenClass::from_width(screen_width),
            prefs: stores.prefs.load(),
            memories: stores.memory.list(),
            has_history: !stores.session.load_messages().is_empty(),
            mode,
            google_search: true,
        }
    }

    #[must_use]
    pub const fn with_google_search(mut self, enabled: bool) -> Self {
        self.google_search = enabled;
        self
    }
}

/// Render the system instruction
#[must_use]
pub fn build_system_instruction(ctx: &PromptContext) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(
        "You are MAYRA, a voice-first personal assistant. Speak warmly and naturally, \
         start answering as soon as you understand the request, and avoid robotic phrasing.\n\n",
    );

    out.push_str("DOCUMENTS:\n");
    out.push_str(
        "When the owner asks for a letter, report, resume, or other structured document, write \
         it with professional formatting, call 'create_document', then confirm that the file \
         was saved to the Downloads folder.\n\n",
    );

    out.push_str("CHAT DISPLAY:\n");
    out.push_str(
        "When asked to clear or reset the chat, call 'clear_chat'. This only empties the \
         visible chat. Owner identity, long-term memory, preferences, and mode are kept.\n\n",
    );

    out.push_str("CONTINUITY:\n");
    if ctx.has_history {
        out.push_str(
            "A previous conversation was found. Resume naturally from the last message \
             without asking what the owner was saying.\n",
        );
    }
    out.push_str("If interrupted, keep the context and continue.\n\n");

    out.push_str(ctx.screen.guidance());
    out.push_str("\n\n");

    out.push_str("OWNER:\n");
    match ctx.prefs.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => {
            let _ = writeln!(
                out,
                "Returning owner named \"{name}\". Welcome them back by name."
            );
        }
        None => out.push_str(
            "New owner, name unknown. Introduce yourself and ask what they would like to be \
             called. As soon as they answer, call 'set_user_name'.\n",
        ),
    }
    out.push('\n');

    out.push_str("MEMORY:\n");
    if ctx.memories.is_empty() {
        out.push_str("No long-term memories stored yet.\n");
    } else {
        for (i, m) in ctx.memories.iter().enumerate() {
            let _ = writeln!(out, "[ID:{i}] [{}]: {}", m.category, m.details);
        }
    }
    out.push('\n');

    let _ = writeln!(out, "MODE: {}. {}", ctx.mode, ctx.mode.guidance());
    out.push('\n');

    let tools = TOOL_NAMES
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");
    if ctx.google_search {
        let _ = writeln!(out, "TOOLS: {tools}, 'googleSearch'.");
    } else {
        let _ = writeln!(out, "TOOLS: {tools}.");
    }
    out.push('\n');

    out.push_str("The owner has just switched you on.\n");
    let _ = writeln!(out, "Current time of day: {}.", ctx.time_of_day.as_str());

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PromptContext {
        PromptContext {
            time_of_day: TimeOfDay::Morning,
            screen: ScreenClass::Desktop,
            prefs: OwnerPreferences::default(),
            memories: Vec::new(),
            has_history: false,
            mode: AssistantMode::Default,
            google_search: true,
        }
    }

    #[test]
    fn time_buckets() {
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
    }

    #[test]
    fn screen_classes() {
        assert_eq!(ScreenClass::from_width(Some(400)), ScreenClass::Mobile);
        assert_eq!(ScreenClass::from_width(Some(767)), ScreenClass::Mobile);
        assert_eq!(ScreenClass::from_width(Some(768)), ScreenClass::Tablet);
        assert_eq!(ScreenClass::from_width(Some(1023)), ScreenClass::Tablet);
        assert_eq!(ScreenClass::from_width(Some(1024)), ScreenClass::Desktop);
        assert_eq!(ScreenClass::from_width(None), ScreenClass::Desktop);
    }

    #[test]
    fn new_owner_is_onboarded() {
        let text = build_system_instruction(&context());
        assert!(text.contains("set_user_name"));
        assert!(text.contains("No long-term memories stored yet."));
        assert!(!text.contains("previous conversation"));
        assert!(text.contains("Current time of day: Morning."));
    }

    #[test]
    fn returning_owner_with_memories_and_history() {
        let mut ctx = context();
        ctx.prefs.name = Some("Asha".into());
        ctx.prefs.onboarded = true;
        ctx.memories = vec![MemoryItem::new("Goal", "run 5k")];
        ctx.has_history = true;
        ctx.mode = AssistantMode::Teacher;

        let text = build_system_instruction(&ctx);
        assert!(text.contains("Returning owner named \"Asha\""));
        assert!(text.contains("[ID:0] [Goal]: run 5k"));
        assert!(text.contains("previous conversation was found"));
        assert!(text.contains("MODE: TEACHER."));
    }

    #[test]
    fn lists_every_tool() {
        let text = build_system_instruction(&context());
        for name in TOOL_NAMES {
            assert!(text.contains(&format!("'{name}'")), "missing {name}");
        }
        assert!(text.contains("'googleSearch'"));
    }

    #[test]
    fn search_is_listed_only_when_offered() {
        let ctx = context().with_google_search(false);
        let text = build_system_instruction(&ctx);
        assert!(!text.contains("googleSearch"));
        assert!(text.contains("'clear_chat'."));
    }
}
