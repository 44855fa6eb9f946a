//! run_command tool - execute a shell command

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Default command timeout
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Cap on combined captured output
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
struct RunCommandParams {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in the working directory and return its output."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 120)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let params: RunCommandParams = serde_json::from_value(input).unwrap_or_default();
        let Some(command) = params.command.as_deref() else {
            return ToolResult::error("command is required");
        };
        let timeout = Duration::from_secs(params.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        debug!(%command, ?timeout, "run_command: executing");
        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.workdir)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                let mut text = format!("exit code: {}\n", exit_code);
                if !stdout.is_empty() {
                    text.push_str("stdout:\n");
                    text.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    text.push_str("stderr:\n");
                    text.push_str(&stderr);
                }
                if text.len() > MAX_OUTPUT_BYTES {
                    text.truncate(MAX_OUTPUT_BYTES);
                    text.push_str("\n[truncated]");
                }

                if exit_code == 0 {
                    ToolResult::success(text)
                } else {
                    ToolResult::error(text)
                }
            }
            Ok(Err(e)) => ToolResult::error(format!("Failed to run command: {}", e)),
            Err(_) => ToolResult::error(format!("Command timed out after {:?}", timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;
    use tempfile::tempdir;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), "t".into(), AgentRole::Developer)
    }

    #[tokio::test]
    async fn test_run_command_success() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "echo hello"}), &ctx(temp.path()))
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("exit code: 0"));
        assert!(result.content.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_failure_is_error() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "exit 3"}), &ctx(temp.path()))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("exit code: 3"));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(
                serde_json::json!({"command": "sleep 5", "timeout_secs": 1}),
                &ctx(temp.path()),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_workdir() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "").unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "ls"}), &ctx(temp.path()))
            .await;
        assert!(result.content.contains("marker.txt"));
    }
}
