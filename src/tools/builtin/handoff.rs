//! handoff tool - delegate work to another agent role
//!
//! Publishes a handoff request on the message bus, where the handoff
//! executor claims it. The calling agent continues its own loop; the
//! delegate's result arrives later as a `result` bus message.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::bus::{message_types, BROADCAST};
use crate::domain::{AgentRole, AgentTask};
use crate::handoff::HandoffRequest;
use crate::tools::{Tool, ToolContext, ToolResult};

#[derive(Debug, Default, Deserialize)]
struct HandoffParams {
    #[serde(default)]
    target_role: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    context: String,
}

pub struct HandoffTool;

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &'static str {
        "handoff"
    }

    fn description(&self) -> &'static str {
        "Delegate a subtask to another agent role (researcher, architect, developer, tester, validator, ux)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target_role": {
                    "type": "string",
                    "description": "Role to delegate to"
                },
                "description": {
                    "type": "string",
                    "description": "What the delegate should do"
                },
                "reason": {
                    "type": "string",
                    "description": "Why this is being delegated"
                },
                "context": {
                    "type": "string",
                    "description": "Context the delegate needs"
                }
            },
            "required": ["target_role", "description"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(bus) = ctx.bus() else {
            return ToolResult::error("handoff is not available without a message bus");
        };

        let params: HandoffParams = serde_json::from_value(input).unwrap_or_default();
        let Some(role_name) = params.target_role.as_deref() else {
            return ToolResult::error("target_role is required");
        };
        let Some(target_role) = AgentRole::parse(role_name) else {
            return ToolResult::error(format!("unknown role: {}", role_name));
        };
        let Some(description) = params.description.as_deref() else {
            return ToolResult::error("description is required");
        };

        let task = AgentTask::new(description, target_role).with_context(params.context.clone());
        let request = HandoffRequest {
            from_agent: ctx.task_id.clone(),
            source_role: ctx.role,
            target_role,
            task,
            reason: params.reason,
            context: params.context,
        };

        let payload = match serde_json::to_value(&request) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("failed to encode handoff: {}", e)),
        };

        debug!(from = %ctx.task_id, target = %target_role, "handoff: broadcasting request");
        bus.send(&ctx.task_id, BROADCAST, message_types::HANDOFF, payload);

        ToolResult::success(format!(
            "Handed off to {}: the result will arrive as a bus message",
            target_role
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_handoff_publishes_on_bus() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(MessageBus::with_default_capacity());
        let ctx = ToolContext::with_bus(
            temp.path().to_path_buf(),
            "task-src".into(),
            AgentRole::Developer,
            bus.clone(),
        );

        let result = HandoffTool
            .execute(
                serde_json::json!({
                    "target_role": "tester",
                    "description": "Write tests for the parser",
                    "reason": "needs test coverage"
                }),
                &ctx,
            )
            .await;
        assert!(!result.is_error);

        let history = bus.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].msg_type, message_types::HANDOFF);
        assert_eq!(history[0].to, BROADCAST);

        let request: HandoffRequest = serde_json::from_value(history[0].payload.clone()).unwrap();
        assert_eq!(request.target_role, AgentRole::Tester);
        assert_eq!(request.source_role, AgentRole::Developer);
        assert_eq!(request.from_agent, "task-src");
    }

    #[tokio::test]
    async fn test_handoff_unknown_role() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(MessageBus::with_default_capacity());
        let ctx = ToolContext::with_bus(temp.path().to_path_buf(), "t".into(), AgentRole::Developer, bus);

        let result = HandoffTool
            .execute(serde_json::json!({"target_role": "wizard", "description": "x"}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("unknown role"));
    }

    #[tokio::test]
    async fn test_handoff_without_bus() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        let result = HandoffTool
            .execute(serde_json::json!({"target_role": "tester", "description": "x"}), &ctx)
            .await;
        assert!(result.is_error);
    }
}
