//! grep tool - search file contents
//!
//! Shells out to ripgrep when available, falling back to grep.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Cap on returned output
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
struct GrepParams {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

pub struct GrepTool;

impl GrepTool {
    async fn run_searcher(program: &str, pattern: &str, dir: &Path) -> std::io::Result<std::process::Output> {
        let mut cmd = Command::new(program);
        if program == "rg" {
            cmd.args(["--line-number", "--no-heading", "--max-count", "200", pattern, "."]);
        } else {
            cmd.args(["-rn", "--exclude-dir=.git", pattern, "."]);
        }
        cmd.current_dir(dir).stdin(Stdio::null()).output().await
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search file contents for a regex pattern. Returns path:line:text matches."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search, relative to the working directory; defaults to '.'"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let params: GrepParams = serde_json::from_value(input).unwrap_or_default();
        let Some(pattern) = params.pattern.as_deref() else {
            return ToolResult::error("pattern is required");
        };
        let path = params.path.as_deref().unwrap_or(".");

        let dir = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let output = match Self::run_searcher("rg", pattern, &dir).await {
            Ok(out) => out,
            Err(_) => {
                debug!("grep: rg unavailable, falling back to grep");
                match Self::run_searcher("grep", pattern, &dir).await {
                    Ok(out) => out,
                    Err(e) => return ToolResult::error(format!("Search failed: {}", e)),
                }
            }
        };

        // Exit code 1 means no matches for both rg and grep
        match output.status.code() {
            Some(0) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                if text.len() > MAX_OUTPUT_BYTES {
                    text.truncate(MAX_OUTPUT_BYTES);
                    text.push_str("\n[truncated]");
                }
                ToolResult::success(text)
            }
            Some(1) => ToolResult::success(format!("No matches for {}", pattern)),
            _ => ToolResult::error(String::from_utf8_lossy(&output.stderr).to_string()),
        }
    }
}
