//! Name-keyed tool dispatch

use std::collections::HashMap;

use super::device::{BatteryTool, TimeTool, VolumeTool};
use super::document::CreateDocumentTool;
use super::media::{OpenYouTubeTool, PlayMediaTool};
use super::memory::{DeleteMemoryTool, ListMemoriesTool, SaveMemoryTool, SetUserNameTool};
use super::session::{ClearChatTool, ShutdownTool, SwitchModeTool};
use super::{ToolCall, ToolContext, ToolEffect, ToolHandler, ToolOutcome, ToolResponse};

/// Routes tool calls to their handlers
pub struct ToolDispatcher {
    handlers: HashMap<&'static str, Box<dyn ToolHandler>>,
    ctx: ToolContext,
}

impl ToolDispatcher {
    /// Create a dispatcher with every built-in tool registered
    #[must_use]
    pub fn new(ctx: ToolContext) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            ctx,
        };

        dispatcher.register(Box::new(BatteryTool));
        dispatcher.register(Box::new(TimeTool));
        dispatcher.register(Box::new(SwitchModeTool));
        dispatcher.register(Box::new(VolumeTool));
        dispatcher.register(Box::new(ShutdownTool));
        dispatcher.register(Box::new(CreateDocumentTool));
        dispatcher.register(Box::new(SaveMemoryTool));
        dispatcher.register(Box::new(DeleteMemoryTool));
        dispatcher.register(Box::new(SetUserNameTool));
        dispatcher.register(Box::new(ListMemoriesTool));
        dispatcher.register(Box::new(OpenYouTubeTool));
        dispatcher.register(Box::new(PlayMediaTool));
        dispatcher.register(Box::new(ClearChatTool));

        dispatcher
    }

    /// Register a handler, replacing any with the same name
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Registered tool names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run one call; failures become `{success: false, error}` for this call only
    pub async fn dispatch(&self, call: &ToolCall) -> (ToolResponse, Option<ToolEffect>) {
        let Some(handler) = self.handlers.get(call.name.as_str()) else {
            tracing::warn!(tool = %call.name, id = %call.id, "unknown tool requested");
            let outcome = ToolOutcome::failure(format!("Unknown tool: {}", call.name));
            return (ToolResponse::new(call, outcome.result), None);
        };

        tracing::debug!(tool = %call.name, id = %call.id, "executing tool");

        let outcome = match handler.call(&call.args, &self.ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool failed");
                ToolOutcome::failure(e.to_string())
            }
        };

        (ToolResponse::new(call, outcome.result), outcome.effect)
    }

    /// Run a batch in order, one response per call
    pub async fn dispatch_batch(&self, calls: &[ToolCall]) -> (Vec<ToolResponse>, Vec<ToolEffect>) {
        let mut responses = Vec::with_capacity(calls.len());
        let mut effects = Vec::new();

        for call in calls {
            let (response, effect) = self.dispatch(call).await;
            responses.push(response);
            effects.extend(effect);
        }

        (responses, effects)
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::watch;

    use super::*;
    use crate::db::Stores;
    use crate::tools::{BatteryStatus, FileExporter, SystemOpener, TOOL_NAMES};

    fn dispatcher() -> ToolDispatcher {
        let (_tx, battery) = watch::channel(BatteryStatus::default());
        ToolDispatcher::new(ToolContext {
            stores: Stores::in_memory().unwrap(),
            battery,
            opener: Arc::new(SystemOpener),
            exporter: Arc::new(FileExporter::new(std::env::temp_dir())),
            shutdown_grace: Duration::from_millis(10),
        })
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call-1".into(),
            name: name.into(),
            args,
        }
    }

    #[test]
    fn every_declared_tool_is_registered() {
        let mut expected: Vec<&str> = TOOL_NAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(dispatcher().names(), expected);
    }

    #[tokio::test]
    async fn unknown_tool_fails_in_isolation() {
        let dispatcher = dispatcher();
        let (responses, effects) = dispatcher
            .dispatch_batch(&[
                call("launch_rockets", json!({})),
                call("get_battery_status", json!({})),
            ])
            .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].result()["success"], false);
        assert_eq!(responses[1].result()["level"], 100);
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn responses_wrap_result() {
        let (response, effect) = dispatcher()
            .dispatch(&call("set_volume", json!({ "level": 150 })))
            .await;

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["id"], "call-1");
        assert_eq!(wire["name"], "set_volume");
        assert_eq!(wire["response"]["result"]["success"], true);
        assert_eq!(wire["response"]["result"]["level"], 100.0);
        assert_eq!(effect, Some(ToolEffect::OutputGain(1.0)));
    }
}
