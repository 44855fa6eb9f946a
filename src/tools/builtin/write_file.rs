//! write_file tool - write content to a file
//!
//! The only builtin that records file-change entries on the context.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::domain::{FileChange, FileChangeKind};
use crate::tools::{Tool, ToolContext, ToolResult};

#[derive(Debug, Default, Deserialize)]
struct WriteFileParams {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let params: WriteFileParams = serde_json::from_value(input).unwrap_or_default();
        let Some(path) = params.path.as_deref() else {
            return ToolResult::error("path is required");
        };
        let Some(content) = params.content.as_deref() else {
            return ToolResult::error("content is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let existed = full_path.exists();

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories: {}", e));
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        let kind = if existed { FileChangeKind::Modify } else { FileChangeKind::Create };
        ctx.record_change(FileChange::new(path, kind).with_content(content));

        debug!(path, bytes = content.len(), ?kind, "write_file: wrote file");
        ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
    }
}
