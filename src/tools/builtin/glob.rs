//! glob tool - find files matching a pattern

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Cap on returned matches
const MAX_MATCHES: usize = 500;

#[derive(Debug, Default, Deserialize)]
struct GlobParams {
    #[serde(default)]
    pattern: Option<String>,
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern, e.g. 'src/**/*.rs'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the working directory"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let params: GlobParams = serde_json::from_value(input).unwrap_or_default();
        let Some(pattern) = params.pattern.as_deref() else {
            return ToolResult::error("pattern is required");
        };

        // Patterns are resolved under the working directory; absolute
        // patterns would sidestep the sandbox.
        if pattern.starts_with('/') {
            return ToolResult::error("pattern must be relative to the working directory");
        }

        let full_pattern = ctx.workdir.join(pattern).display().to_string();
        let paths = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(e) => return ToolResult::error(format!("Invalid pattern: {}", e)),
        };

        let mut matches: Vec<String> = Vec::new();
        for entry in paths.flatten() {
            let display = entry
                .strip_prefix(&ctx.workdir)
                .unwrap_or(&entry)
                .display()
                .to_string();
            matches.push(display);
            if matches.len() >= MAX_MATCHES {
                break;
            }
        }
        matches.sort();

        if matches.is_empty() {
            ToolResult::success(format!("No files match {}", pattern))
        } else {
            ToolResult::success(matches.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_glob_matches() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/main.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(temp.path().join("README.md"), "").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        let result = GlobTool.execute(serde_json::json!({"pattern": "src/*.rs"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("src/main.rs"));
        assert!(result.content.contains("src/lib.rs"));
        assert!(!result.content.contains("README.md"));
    }

    #[tokio::test]
    async fn test_glob_no_matches() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        let result = GlobTool.execute(serde_json::json!({"pattern": "*.zig"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("No files match"));
    }

    #[tokio::test]
    async fn test_glob_absolute_pattern_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        let result = GlobTool.execute(serde_json::json!({"pattern": "/etc/*"}), &ctx).await;
        assert!(result.is_error);
    }
}
