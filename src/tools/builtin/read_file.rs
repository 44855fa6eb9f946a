//! read_file tool - read a file's contents

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Maximum bytes returned before truncation
const MAX_READ_BYTES: usize = 256 * 1024;

/// Typed parameters; unknown keys are ignored, parse failures fall back to
/// the empty record
#[derive(Debug, Default, Deserialize)]
struct ReadFileParams {
    #[serde(default)]
    path: Option<String>,
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file. Large files are truncated."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let params: ReadFileParams = serde_json::from_value(input).unwrap_or_default();
        let Some(path) = params.path.as_deref() else {
            return ToolResult::error("path is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) if content.len() > MAX_READ_BYTES => {
                debug!(path, len = content.len(), "read_file: truncating large file");
                let mut truncated = content[..MAX_READ_BYTES].to_string();
                truncated.push_str("\n[truncated]");
                ToolResult::success(truncated)
            }
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("Failed to read {}: {}", path, e)),
        }
    }
}
