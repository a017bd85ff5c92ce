//! Tool invocation for the live agent
//!
//! Each tool is a [`ToolHandler`] registered by name in a [`ToolDispatcher`].
//! Handlers commit their store writes before returning, and report any change
//! the session controller must apply (mode, output gain, transcript, power)
//! as a [`ToolEffect`].

pub mod definitions;
mod device;
mod document;
mod media;
mod memory;
mod registry;
mod session;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::Result;
use crate::db::Stores;
use crate::mode::AssistantMode;

pub use definitions::{TOOL_NAMES, tool_declarations};
pub use document::{DocumentExporter, DocumentFormat, DocumentRequest, FileExporter, sanitize_title};
pub use media::{SystemOpener, UrlOpener, YOUTUBE_URL};
pub use registry::ToolDispatcher;

/// A tool invocation requested by the agent
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The result for one tool call, as sent back over the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ToolResponse {
    /// Wrap a result object as `{id, name, response: {result}}`
    #[must_use]
    pub fn new(call: &ToolCall, result: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "result": result }),
        }
    }

    /// The inner result object
    #[must_use]
    pub fn result(&self) -> &Value {
        &self.response["result"]
    }
}

/// Last-known battery reading supplied by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// Charge level, 0.0 to 1.0
    pub level: f32,
    pub charging: bool,
    /// Whether the host can read the battery at all
    pub supported: bool,
}

impl Default for BatteryStatus {
    fn default() -> Self {
        Self {
            level: 1.0,
            charging: true,
            supported: false,
        }
    }
}

/// A change the session controller applies after a tool runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolEffect {
    /// The active persona changed (already persisted)
    ModeChanged(AssistantMode),
    /// Apply a new output gain ratio
    OutputGain(f32),
    /// Empty the visible transcript (persisted copy already removed)
    TranscriptCleared,
    /// Clear session state and signal power-off after the grace delay
    PowerDown(Duration),
}

/// What a handler produced
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: Value,
    pub effect: Option<ToolEffect>,
}

impl ToolOutcome {
    /// A result without side effects on the controller
    #[must_use]
    pub const fn ok(result: Value) -> Self {
        Self {
            result,
            effect: None,
        }
    }

    /// `{success: false, error}`
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::ok(json!({ "success": false, "error": error.into() }))
    }

    #[must_use]
    pub const fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Collaborators shared by every handler
#[derive(Clone)]
pub struct ToolContext {
    pub stores: Stores,
    pub battery: watch::Receiver<BatteryStatus>,
    pub opener: Arc<dyn UrlOpener>,
    pub exporter: Arc<dyn DocumentExporter>,
    pub shutdown_grace: Duration,
}

/// A named tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name the agent calls this tool by
    fn name(&self) -> &'static str;

    /// Run the tool
    ///
    /// Expected failures are returned as [`ToolOutcome::failure`]; errors are
    /// converted to the same shape by the dispatcher.
    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome>;
}

/// Read a string argument, treating blanks as missing
fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
