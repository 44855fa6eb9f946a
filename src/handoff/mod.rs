//! Handoff executor
//!
//! Claims `handoff` messages off the bus, runs an agent for the target role
//! under a concurrency cap, and surfaces the outcome back to the source
//! agent as a `result` or `error` message.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentSettings, CancelFlag, RoleRegistry};
use crate::budget::{BudgetController, BudgetTier};
use crate::bus::{message_types, MessageBus, SubscriptionId};
use crate::domain::{AgentRole, AgentTask};
use crate::events::EventEmitter;
use crate::prompts::{PromptLibrary, PromptVars};
use crate::provider::Provider;
use crate::tools::ToolCatalog;

/// Default cap on concurrently running handoffs
pub const DEFAULT_MAX_CONCURRENT_HANDOFFS: usize = 3;

/// A delegation from one running agent to another role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Task ID of the delegating agent
    pub from_agent: String,

    /// Role of the delegating agent; senders that do not carry it are
    /// recorded as `developer`
    #[serde(default = "default_source_role")]
    pub source_role: AgentRole,

    pub target_role: AgentRole,

    /// The task the delegate should execute
    pub task: AgentTask,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub context: String,
}

fn default_source_role() -> AgentRole {
    AgentRole::Developer
}

/// Executes handoff requests claimed from the bus
pub struct HandoffExecutor {
    bus: Arc<MessageBus>,
    roles: Arc<RoleRegistry>,
    prompts: Arc<PromptLibrary>,
    provider: Arc<dyn Provider>,
    catalog: Arc<ToolCatalog>,
    budget: Arc<BudgetController>,
    emitter: EventEmitter,
    settings: AgentSettings,
    workdir: PathBuf,
    cancel: CancelFlag,
    max_concurrent: usize,

    active: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    deferred: AtomicU64,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl HandoffExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<MessageBus>,
        roles: Arc<RoleRegistry>,
        prompts: Arc<PromptLibrary>,
        provider: Arc<dyn Provider>,
        catalog: Arc<ToolCatalog>,
        budget: Arc<BudgetController>,
        emitter: EventEmitter,
        settings: AgentSettings,
        workdir: PathBuf,
        cancel: CancelFlag,
        max_concurrent: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            roles,
            prompts,
            provider,
            catalog,
            budget,
            emitter,
            settings,
            workdir,
            cancel,
            max_concurrent: max_concurrent.max(1),
            active: Arc::new(Mutex::new(HashMap::new())),
            deferred: AtomicU64::new(0),
            subscription: Mutex::new(None),
        })
    }

    /// Subscribe to the bus and start claiming handoffs
    pub fn start(self: &Arc<Self>) {
        let executor = self.clone();
        let sub = self.bus.subscribe_all(move |message| {
            if message.msg_type == message_types::HANDOFF {
                executor.on_handoff(message.payload.clone());
            }
            Ok(())
        });
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(sub);
        debug!("handoff executor subscribed");
    }

    fn on_handoff(self: &Arc<Self>, payload: serde_json::Value) {
        let request: HandoffRequest = match serde_json::from_value(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "ignoring malformed handoff payload");
                return;
            }
        };

        // Cap check and insert under one lock: a fast-completing handoff
        // blocks on the same lock before removing itself.
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.len() >= self.max_concurrent {
            // Deferred, not queued: the sender may retry
            self.deferred.fetch_add(1, Ordering::SeqCst);
            info!(
                from = %request.from_agent,
                target = %request.target_role,
                active = active.len(),
                "handoff deferred: concurrency cap reached"
            );
            return;
        }

        let task_id = request.task.id.clone();
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            executor.run_handoff(request).await;
        });
        active.insert(task_id, handle);
    }

    async fn run_handoff(self: Arc<Self>, request: HandoffRequest) {
        let task_id = request.task.id.clone();
        info!(
            from = %request.from_agent,
            source_role = %request.source_role,
            target = %request.target_role,
            task_id = %task_id,
            "handoff claimed"
        );

        let role_config = self.roles.get_or_default(request.target_role);

        let context = format!(
            "Handoff from {} ({}). Reason: {}\n{}",
            request.from_agent, request.source_role, request.reason, request.context
        );
        let system_prompt = self
            .prompts
            .render(
                request.target_role,
                &PromptVars {
                    working_dir: self.workdir.display().to_string(),
                    context,
                },
            )
            .unwrap_or_else(|e| {
                warn!(error = %e, "prompt render failed, using plain role prompt");
                format!("You are a {} agent.", request.target_role)
            });

        self.budget.create_budget(&task_id, BudgetTier::Standard);

        let agent = Agent::new(
            role_config,
            system_prompt,
            self.provider.clone(),
            self.catalog.clone(),
            self.budget.clone(),
            self.emitter.clone(),
            self.cancel.clone(),
            self.settings.clone(),
            self.workdir.clone(),
        )
        .with_bus(self.bus.clone());

        let result = agent.execute(&request.task).await;
        let _ = self.budget.release_budget(&task_id);

        let msg_type = if result.success {
            message_types::RESULT
        } else {
            message_types::ERROR
        };
        let payload = serde_json::to_value(&result).unwrap_or_else(|_| serde_json::json!({}));

        debug!(task_id = %task_id, %msg_type, to = %request.from_agent, "handoff settled");
        self.bus.send(&task_id, &request.from_agent, msg_type, payload);

        self.active.lock().unwrap_or_else(|e| e.into_inner()).remove(&task_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn deferred_count(&self) -> u64 {
        self.deferred.load(Ordering::SeqCst)
    }

    /// Unsubscribe and settle every active handoff
    pub async fn stop(&self) {
        if let Some(sub) = self.subscription.lock().unwrap_or_else(|e| e.into_inner()).take() {
            self.bus.unsubscribe(sub);
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.drain().map(|(_, h)| h).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "handoff task failed during stop");
            }
        }
        debug!("handoff executor stopped");
    }
}
