//! Device tools: battery, clock, output volume

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ToolContext, ToolEffect, ToolHandler, ToolOutcome};
use crate::Result;

pub struct BatteryTool;

#[async_trait]
impl ToolHandler for BatteryTool {
    fn name(&self) -> &'static str {
        "get_battery_status"
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let battery = *ctx.battery.borrow();
        let level = (battery.level.clamp(0.0, 1.0) * 100.0).round() as i64;

        Ok(ToolOutcome::ok(json!({
            "level": level,
            "charging": battery.charging,
        })))
    }
}

pub struct TimeTool;

#[async_trait]
impl ToolHandler for TimeTool {
    fn name(&self) -> &'static str {
        "get_current_time"
    }

    async fn call(&self, _args: &Value, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let now = chrono::Local::now();
        let timezone = iana_time_zone::get_timezone().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "no IANA time zone, reporting offset");
            format!("UTC{}", now.format("%:z"))
        });

        Ok(ToolOutcome::ok(json!({
            "time": now.format("%I:%M %p").to_string(),
            "timezone": timezone,
            "full_string": now.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        })))
    }
}

pub struct VolumeTool;

#[async_trait]
impl ToolHandler for VolumeTool {
    fn name(&self) -> &'static str {
        "set_volume"
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn call(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let Some(level) = args.get("level").and_then(Value::as_f64).filter(|l| l.is_finite()) else {
            return Ok(ToolOutcome::failure("Invalid level"));
        };

        let level = level.clamp(0.0, 100.0);
        let gain = (level / 100.0) as f32;
        tracing::debug!(level, "output volume set");

        Ok(ToolOutcome::ok(json!({ "success": true, "level": level }))
            .with_effect(ToolEffect::OutputGain(gain)))
    }
}
