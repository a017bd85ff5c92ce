//! Session tools: persona switching, chat clearing, shutdown

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ToolContext, ToolEffect, ToolHandler, ToolOutcome};
use crate::Result;
use crate::mode::AssistantMode;

pub struct SwitchModeTool;

#[async_trait]
impl ToolHandler for SwitchModeTool {
    fn name(&self) -> &'static str {
        "switch_mode"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let Some(mode) = args
            .get("mode")
            .and_then(Value::as_str)
            .and_then(|m| m.parse::<AssistantMode>().ok())
        else {
            return Ok(ToolOutcome::failure("Invalid mode"));
        };

        ctx.stores.session.save_mode(mode)?;
        tracing::info!(%mode, "assistant mode switched");

        Ok(ToolOutcome::ok(json!({ "success": true, "mode": mode.as_str() }))
            .with_effect(ToolEffect::ModeChanged(mode)))
    }
}

pub struct ClearChatTool;

#[async_trait]
impl ToolHandler for ClearChatTool {
    fn name(&self) -> &'static str {
        "clear_chat"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        ctx.stores.session.clear_messages()?;

        Ok(
            ToolOutcome::ok(json!({ "success": true, "message": "Chat cleared." }))
                .with_effect(ToolEffect::TranscriptCleared),
        )
    }
}

pub struct ShutdownTool;

#[async_trait]
impl ToolHandler for ShutdownTool {
    fn name(&self) -> &'static str {
        "shutdown_mayra"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        ctx.stores.session.clear()?;
        tracing::info!(grace = ?ctx.shutdown_grace, "powering down");

        Ok(
            ToolOutcome::ok(json!({ "success": true, "status": "powering_down" }))
                .with_effect(ToolEffect::PowerDown(ctx.shutdown_grace)),
        )
    }
}
