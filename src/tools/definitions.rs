//! Tool declarations offered to the live agent

use serde_json::{Value, json};

use crate::mode::AssistantMode;

/// Every tool the engine implements, in declaration order
pub const TOOL_NAMES: [&str; 13] = [
    "get_battery_status",
    "get_current_time",
    "switch_mode",
    "set_volume",
    "shutdown_mayra",
    "create_document",
    "save_memory",
    "delete_memory",
    "set_user_name",
    "get_stored_memories",
    "open_youtube",
    "play_media",
    "clear_chat",
];

fn declare(name: &str, description: &str, parameters: Option<Value>) -> Value {
    let mut decl = json!({
        "name": name,
        "description": description,
    });
    if let Some(parameters) = parameters {
        decl["parameters"] = parameters;
    }
    decl
}

/// Function declarations for all tools, in [`TOOL_NAMES`] order
#[must_use]
pub fn tool_declarations() -> Vec<Value> {
    let modes: Vec<&str> = AssistantMode::ALL.iter().map(|m| m.as_str()).collect();

    vec![
        declare(
            "get_battery_status",
            "Get the current battery percentage and charging status of the device.",
            None,
        ),
        declare(
            "get_current_time",
            "Get the current local time and timezone of the device.",
            None,
        ),
        declare(
            "switch_mode",
            "Switch the assistant personality mode.",
            Some(json!({
                "type": "object",
                "properties": {
                    "mode": {
                        "type": "string",
                        "description": "The mode to switch to.",
                        "enum": modes
                    }
                },
                "required": ["mode"]
            })),
        ),
        declare(
            "set_volume",
            "Set the output volume level.",
            Some(json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "number",
                        "description": "Volume level from 0 to 100."
                    }
                },
                "required": ["level"]
            })),
        ),
        declare(
            "shutdown_mayra",
            "Turn off the assistant, power down, or stop listening.",
            None,
        ),
        declare(
            "create_document",
            "Generate a document (PDF, DOCX, TXT) with the given content and save it to Downloads.",
            Some(json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Document title (e.g. Application_Letter_Feb2026)."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full text content with professional formatting and newlines."
                    },
                    "format": {
                        "type": "string",
                        "description": "The file format to generate.",
                        "enum": ["PDF", "DOCX", "TXT"]
                    }
                },
                "required": ["title", "content", "format"]
            })),
        ),
        declare(
            "save_memory",
            "Save a fact, preference, or goal to long-term memory.",
            Some(json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "description": "Category (e.g. Preference, Goal, Personal Info)."
                    },
                    "details": {
                        "type": "string",
                        "description": "The information to remember."
                    }
                },
                "required": ["category", "details"]
            })),
        ),
        declare(
            "delete_memory",
            "Delete specific memories by index, or clear all memory.",
            Some(json!({
                "type": "object",
                "properties": {
                    "indices": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Memory indices to delete."
                    },
                    "clear_all": {
                        "type": "boolean",
                        "description": "If true, delete all memories."
                    }
                }
            })),
        ),
        declare(
            "set_user_name",
            "Set the owner's preferred name during onboarding.",
            Some(json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name the owner wants to be called."
                    }
                },
                "required": ["name"]
            })),
        ),
        declare(
            "get_stored_memories",
            "List all stored memories. Use when the owner asks what you remember.",
            None,
        ),
        declare("open_youtube", "Open the YouTube website.", None),
        declare(
            "play_media",
            "Play a video or song from a specific URL.",
            Some(json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Fully qualified http(s) URL to open."
                    }
                },
                "required": ["url"]
            })),
        ),
        declare(
            "clear_chat",
            "Clear the visible chat history without affecting memory.",
            None,
        ),
    ]
}
