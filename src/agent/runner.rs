//! Agent loop
//!
//! Drives one role-configured agent through the LLM-tool-LLM cycle until
//! the model stops requesting tools, the iteration cap is hit, the budget
//! runs out, or cancellation is observed. Every failure mode produces a
//! failed AgentResult; the loop never panics the caller.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::budget::{BudgetController, WarnLevel};
use crate::bus::MessageBus;
use crate::domain::{AgentResult, AgentTask, TokenUsage};
use crate::events::EventEmitter;
use crate::provider::{ChatMessage, Provider, ProviderRequest};
use crate::tools::{ToolCatalog, ToolContext};

use super::role::RoleConfig;
use super::CancelFlag;

/// Loop-level settings shared by all agents of a run
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Hard cap on provider round-trips per task
    pub max_iterations: u32,

    /// Max tokens per provider call
    pub max_tokens: u32,

    /// Model name used for cost estimation
    pub model: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_tokens: 4096,
            model: "claude-sonnet-4".to_string(),
        }
    }
}

/// A single agent bound to one role configuration
pub struct Agent {
    role_config: RoleConfig,
    system_prompt: String,
    provider: Arc<dyn Provider>,
    catalog: Arc<ToolCatalog>,
    budget: Arc<BudgetController>,
    emitter: EventEmitter,
    cancel: CancelFlag,
    settings: AgentSettings,
    workdir: PathBuf,
    bus: Option<Arc<MessageBus>>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role_config: RoleConfig,
        system_prompt: String,
        provider: Arc<dyn Provider>,
        catalog: Arc<ToolCatalog>,
        budget: Arc<BudgetController>,
        emitter: EventEmitter,
        cancel: CancelFlag,
        settings: AgentSettings,
        workdir: PathBuf,
    ) -> Self {
        Self {
            role_config,
            system_prompt,
            provider,
            catalog,
            budget,
            emitter,
            cancel,
            settings,
            workdir,
            bus: None,
        }
    }

    /// Attach a bus handle so coordination tools (handoff) work
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run the agent to completion on one task
    pub async fn execute(&self, task: &AgentTask) -> AgentResult {
        let role = self.role_config.role;
        info!(task_id = %task.id, %role, "agent starting");
        self.emitter.agent_start(&task.id, role.as_str());

        let ctx = match &self.bus {
            Some(bus) => ToolContext::with_bus(self.workdir.clone(), task.id.clone(), role, bus.clone()),
            None => ToolContext::new(self.workdir.clone(), task.id.clone(), role),
        };

        let tool_names = if task.required_tools.is_empty() {
            &self.role_config.tools
        } else {
            &task.required_tools
        };
        let tools = self.catalog.definitions_for(tool_names);

        let mut messages = vec![ChatMessage::system(&self.system_prompt)];
        let user_body = if task.context.is_empty() {
            task.description.clone()
        } else {
            format!("{}\n\nContext:\n{}", task.description, task.context)
        };
        messages.push(ChatMessage::user(user_body));

        let mut usage = TokenUsage::default();
        let mut cost_usd = 0.0;
        let max_iterations = self.role_config.max_iterations.min(self.settings.max_iterations);

        let finish = |success: bool, output: String, error: Option<String>, usage: TokenUsage, cost: f64| {
            let mut result = AgentResult {
                task_id: task.id.clone(),
                role,
                success,
                output,
                file_changes: ctx.take_changes(),
                usage,
                cost_usd: cost,
                error,
                reasoning: None,
            };
            if !success {
                result.output = String::new();
            }
            self.emitter
                .agent_complete(&task.id, success, usage.input_tokens, usage.output_tokens);
            result
        };

        for iteration in 1..=max_iterations {
            if let Some(reason) = self.cancel.reason() {
                debug!(task_id = %task.id, "agent observed cancellation between iterations");
                return finish(false, String::new(), Some(format!("cancelled: {}", reason)), usage, cost_usd);
            }

            self.emitter.agent_progress(&task.id, iteration);

            let request = ProviderRequest::new(messages.clone())
                .with_tools(tools.clone())
                .with_temperature(self.role_config.temperature)
                .with_max_tokens(self.settings.max_tokens);

            debug!(task_id = %task.id, iteration, "agent calling provider");
            let response = match self.provider.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(task_id = %task.id, iteration, error = %e, "provider failed, agent reports failure");
                    self.emitter.agent_error(&task.id, &e.to_string());
                    return finish(false, String::new(), Some(e.to_string()), usage, cost_usd);
                }
            };

            usage.add(&response.usage);
            let call_cost = response.usage.cost_usd(&self.settings.model);
            cost_usd += call_cost;

            match self.budget.record_api_call(&task.id, response.usage.total_tokens(), call_cost) {
                Ok(warnings) => {
                    for warning in warnings {
                        if warning.level == WarnLevel::Exhausted {
                            self.emitter.error("budget", &format!("budget exhausted for task {}", task.id));
                        }
                    }
                }
                Err(e) => debug!(task_id = %task.id, error = %e, "budget record skipped"),
            }

            if let Err(e) = self.budget.check_budget(&task.id) {
                warn!(task_id = %task.id, error = %e, "budget exceeded, stopping agent");
                return finish(false, String::new(), Some(e.to_string()), usage, cost_usd);
            }

            if response.tool_calls.is_empty() {
                let output = response.content.unwrap_or_default();
                info!(task_id = %task.id, iteration, "agent finished");
                return finish(true, output, None, usage, cost_usd);
            }

            // Tool round: record the assistant turn, run each call in the
            // order returned, and feed results back as tool-role messages.
            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                if let Some(reason) = self.cancel.reason() {
                    debug!(task_id = %task.id, "agent observed cancellation between tool calls");
                    return finish(false, String::new(), Some(format!("cancelled: {}", reason)), usage, cost_usd);
                }

                debug!(task_id = %task.id, tool = %call.name, "agent executing tool");
                let result = self.catalog.execute(call, &ctx).await;
                self.emitter.agent_tool(&task.id, &call.name, !result.is_error);

                let body = if result.is_error {
                    format!("Error: {}", result.content)
                } else {
                    result.content
                };
                messages.push(ChatMessage::tool(&call.id, body));
            }
        }

        warn!(task_id = %task.id, max = max_iterations, "agent hit iteration limit");
        finish(
            false,
            String::new(),
            Some(format!("max iterations ({}) reached", max_iterations)),
            usage,
            cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RoleRegistry;
    use crate::budget::{BudgetLimits, BudgetTier};
    use crate::domain::{AgentRole, FileChangeKind};
    use crate::events::EventBus;
    use crate::provider::mock::MockProvider;
    use crate::provider::{ProviderError, ProviderResponse, ToolCallRequest};
    use std::time::Duration;
    use tempfile::tempdir;

    fn text_response(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse::text(text, TokenUsage::new(100, 50)))
    }

    fn tool_response(calls: Vec<(&str, &str, &str)>) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            content: None,
            tool_calls: calls
                .into_iter()
                .map(|(id, name, args)| ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
            finish_reason: crate::provider::FinishReason::ToolCalls,
            usage: TokenUsage::new(100, 50),
        })
    }

    struct Fixture {
        agent: Agent,
        budget: Arc<BudgetController>,
        _temp: tempfile::TempDir,
    }

    fn fixture(provider: MockProvider, max_iterations: u32) -> Fixture {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::standard(max_iterations);
        let budget = Arc::new(BudgetController::new(BudgetLimits::default(), false));
        let events = EventBus::new(256);

        let agent = Agent::new(
            registry.get(AgentRole::Developer).unwrap().clone(),
            "You are a developer.".to_string(),
            Arc::new(provider),
            Arc::new(ToolCatalog::standard()),
            budget.clone(),
            events.emitter_for("run-test"),
            CancelFlag::default(),
            AgentSettings {
                max_iterations,
                max_tokens: 1024,
                model: "claude-sonnet-4".to_string(),
            },
            temp.path().to_path_buf(),
        );

        Fixture {
            agent,
            budget,
            _temp: temp,
        }
    }

    fn task() -> AgentTask {
        AgentTask::new("write hello.txt", AgentRole::Developer)
    }

    #[tokio::test]
    async fn test_plain_text_response_succeeds() {
        let fx = fixture(MockProvider::new(vec![text_response("all done")]), 20);
        let task = task();
        fx.budget.create_budget(&task.id, BudgetTier::Standard);

        let result = fx.agent.execute(&task).await;
        assert!(result.success);
        assert_eq!(result.output, "all done");
        assert_eq!(result.usage.input_tokens, 100);
        assert!(result.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_tool_round_then_completion() {
        let fx = fixture(
            MockProvider::new(vec![
                tool_response(vec![(
                    "call_1",
                    "write_file",
                    r#"{"path":"hello.txt","content":"hi"}"#,
                )]),
                text_response("wrote the file"),
            ]),
            20,
        );
        let task = task();
        fx.budget.create_budget(&task.id, BudgetTier::Standard);

        let result = fx.agent.execute(&task).await;
        assert!(result.success);
        assert_eq!(result.output, "wrote the file");
        assert_eq!(result.file_changes.len(), 1);
        assert_eq!(result.file_changes[0].kind, FileChangeKind::Create);
        // Usage summed across both calls
        assert_eq!(result.usage.input_tokens, 200);
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model_not_fatal() {
        let fx = fixture(
            MockProvider::new(vec![
                tool_response(vec![("call_1", "teleport", "{}")]),
                text_response("recovered"),
            ]),
            20,
        );
        let task = task();
        fx.budget.create_budget(&task.id, BudgetTier::Standard);

        let result = fx.agent.execute(&task).await;
        assert!(result.success);
        assert_eq!(result.output, "recovered");
    }

    #[tokio::test]
    async fn test_iteration_exhaustion_fails() {
        // Provider always requests tools: the loop can never converge
        let responses: Vec<_> = (0..5)
            .map(|i| tool_response(vec![(&format!("call_{}", i), "list_directory", "{}")]))
            .collect();
        let fx = fixture(MockProvider::new(responses), 3);
        let task = task();
        fx.budget.create_budget(&task.id, BudgetTier::Standard);

        let result = fx.agent.execute(&task).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("max iterations (3)"));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_result() {
        let fx = fixture(
            MockProvider::new(vec![Err(ProviderError::Timeout(Duration::from_secs(30)))]),
            20,
        );
        let task = task();
        fx.budget.create_budget(&task.id, BudgetTier::Standard);

        let result = fx.agent.execute(&task).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_stops_agent() {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::standard(20);
        // Cost limit so small a single call exhausts it
        let budget = Arc::new(BudgetController::new(
            BudgetLimits {
                max_api_calls: 100,
                max_tokens: 1_000_000,
                max_cost_usd: 0.000001,
                max_depth: 5,
            },
            false,
        ));
        let events = EventBus::new(256);
        let agent = Agent::new(
            registry.get(AgentRole::Developer).unwrap().clone(),
            "dev".to_string(),
            Arc::new(MockProvider::new(vec![
                tool_response(vec![("c1", "list_directory", "{}")]),
                text_response("should never be reached"),
            ])),
            Arc::new(ToolCatalog::standard()),
            budget.clone(),
            events.emitter_for("run-test"),
            CancelFlag::default(),
            AgentSettings::default(),
            temp.path().to_path_buf(),
        );

        let task = task();
        budget.create_budget(&task.id, BudgetTier::Standard);

        let result = agent.execute(&task).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("budget exceeded"));
    }

    #[tokio::test]
    async fn test_cancellation_between_iterations() {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::standard(20);
        let budget = Arc::new(BudgetController::new(BudgetLimits::default(), false));
        let events = EventBus::new(256);

        // Cancelled before the first iteration begins
        let cancel = CancelFlag::default();
        cancel.cancel("user interrupt");

        let agent = Agent::new(
            registry.get(AgentRole::Developer).unwrap().clone(),
            "dev".to_string(),
            Arc::new(MockProvider::new(vec![text_response("never")])),
            Arc::new(ToolCatalog::standard()),
            budget.clone(),
            events.emitter_for("run-test"),
            cancel,
            AgentSettings::default(),
            temp.path().to_path_buf(),
        );

        let task = task();
        budget.create_budget(&task.id, BudgetTier::Standard);

        let result = agent.execute(&task).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("cancelled"));
        assert!(result.error.as_deref().unwrap().contains("user interrupt"));
    }

    #[tokio::test]
    async fn test_required_tools_override_role_set() {
        // Researcher role lacks write_file, but the task requires it
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::standard(20);
        let budget = Arc::new(BudgetController::new(BudgetLimits::default(), false));
        let events = EventBus::new(256);
        let agent = Agent::new(
            registry.get(AgentRole::Researcher).unwrap().clone(),
            "researcher".to_string(),
            Arc::new(MockProvider::new(vec![
                tool_response(vec![("c1", "write_file", r#"{"path":"n.txt","content":"x"}"#)]),
                text_response("done"),
            ])),
            Arc::new(ToolCatalog::standard()),
            budget.clone(),
            events.emitter_for("run-test"),
            CancelFlag::default(),
            AgentSettings::default(),
            temp.path().to_path_buf(),
        );

        let task = AgentTask::new("write notes", AgentRole::Researcher)
            .with_required_tools(vec!["write_file".to_string()]);
        budget.create_budget(&task.id, BudgetTier::Standard);

        let result = agent.execute(&task).await;
        assert!(result.success);
        assert_eq!(result.file_changes.len(), 1);
    }
}
