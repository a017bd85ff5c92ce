//! Opening external media

use std::process::{Command, Stdio};

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use super::{ToolContext, ToolHandler, ToolOutcome, str_arg};
use crate::{Error, Result};

/// Page opened by `open_youtube`
pub const YOUTUBE_URL: &str = "https://www.youtube.com";

/// Opens a URL in an external application
pub trait UrlOpener: Send + Sync {
    /// Open `url`
    ///
    /// # Errors
    ///
    /// Returns error if no opener could be launched
    fn open(&self, url: &Url) -> Result<()>;
}

/// Launches the platform's default URL handler
#[derive(Debug, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &Url) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            Command::new("xdg-open")
        };

        let mut child = command
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Tool(format!("failed to open {url}: {e}")))?;

        std::thread::spawn(move || child.wait());
        tracing::debug!(%url, "opened url");
        Ok(())
    }
}

/// Parse an absolute http(s) URL
fn parse_web_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

pub struct OpenYouTubeTool;

#[async_trait]
impl ToolHandler for OpenYouTubeTool {
    fn name(&self) -> &'static str {
        "open_youtube"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let url = Url::parse(YOUTUBE_URL).map_err(|e| Error::Tool(e.to_string()))?;
        ctx.opener.open(&url)?;

        Ok(ToolOutcome::ok(json!({ "success": true, "message": "YouTube opened." })))
    }
}

pub struct PlayMediaTool;

#[async_trait]
impl ToolHandler for PlayMediaTool {
    fn name(&self) -> &'static str {
        "play_media"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let Some(url) = str_arg(args, "url").and_then(parse_web_url) else {
            return Ok(ToolOutcome::failure("Invalid URL."));
        };

        ctx.opener.open(&url)?;

        Ok(ToolOutcome::ok(json!({ "success": true, "message": "Media playing." })))
    }
}
