//! Long-term memory and owner identity tools

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ToolContext, ToolHandler, ToolOutcome, str_arg};
use crate::Result;
use crate::db::MemoryItem;
use crate::db::memory::{DEFAULT_CATEGORY, format_listing};

pub struct SaveMemoryTool;

#[async_trait]
impl ToolHandler for SaveMemoryTool {
    fn name(&self) -> &'static str {
        "save_memory"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let Some(details) = str_arg(args, "details") else {
            return Ok(ToolOutcome::failure("Nothing to remember."));
        };
        let category = str_arg(args, "category").unwrap_or(DEFAULT_CATEGORY);

        let count = ctx.stores.memory.add(MemoryItem::new(category, details))?;
        tracing::info!(category, count, "memory saved");

        Ok(ToolOutcome::ok(json!({ "success": true, "message": "Memory saved." })))
    }
}

pub struct DeleteMemoryTool;

impl DeleteMemoryTool {
    /// Non-negative integral indices; anything else is skipped
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn parse_indices(value: &Value) -> Option<Vec<usize>> {
        let items = value.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_f64)
                .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0)
                .map(|n| n as usize)
                .collect(),
        )
    }
}

#[async_trait]
impl ToolHandler for DeleteMemoryTool {
    fn name(&self) -> &'static str {
        "delete_memory"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        if args.get("clear_all").and_then(Value::as_bool) == Some(true) {
            ctx.stores.memory.clear()?;
            tracing::info!("all memories cleared");
            return Ok(ToolOutcome::ok(
                json!({ "success": true, "message": "All memories cleared." }),
            ));
        }

        let Some(indices) = args.get("indices").and_then(Self::parse_indices) else {
            return Ok(ToolOutcome::failure("Provide indices or clear_all."));
        };

        let removed = ctx.stores.memory.delete_indices(&indices)?;
        tracing::info!(requested = indices.len(), removed, "memories deleted");

        Ok(ToolOutcome::ok(
            json!({ "success": true, "message": "Selected memories deleted." }),
        ))
    }
}

pub struct SetUserNameTool;

#[async_trait]
impl ToolHandler for SetUserNameTool {
    fn name(&self) -> &'static str {
        "set_user_name"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let Some(name) = str_arg(args, "name") else {
            return Ok(ToolOutcome::failure("Name is required."));
        };

        ctx.stores.prefs.set_name(name)?;

        Ok(ToolOutcome::ok(json!({
            "success": true,
            "message": format!("User name set to {name}."),
        })))
    }
}

pub struct ListMemoriesTool;

#[async_trait]
impl ToolHandler for ListMemoriesTool {
    fn name(&self) -> &'static str {
        "get_stored_memories"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let items = ctx.stores.memory.list();
        let listing = if items.is_empty() {
            "No memories stored.".to_string()
        } else {
            format_listing(&items)
        };

        Ok(ToolOutcome::ok(json!({
            "success": true,
            "memories": listing,
            "count": items.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_accept_whole_non_negative_numbers() {
        let parsed = DeleteMemoryTool::parse_indices(&json!([2, 0.0, -1, 1.5, "3", 4])).unwrap();
        assert_eq!(parsed, vec![2, 0, 4]);
        assert!(DeleteMemoryTool::parse_indices(&json!("0")).is_none());
    }
}
