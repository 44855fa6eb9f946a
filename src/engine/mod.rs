//! Engine - the central coordinator
//!
//! Drives a run through the stage pipeline (recall, analyze, enhance,
//! decompose, plan, execute, verify, memorize) and schedules the execute
//! stage wave by wave: bounded parallelism inside a wave, a hard barrier
//! between waves, budget checks around every agent, and cooperative
//! cancellation throughout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentSettings, CancelFlag, RoleRegistry};
use crate::budget::{BudgetController, BudgetLimits, BudgetTier};
use crate::bus::MessageBus;
use crate::config::Config;
use crate::domain::{AgentResult, AgentTask, ExecutionPlan, RunContext, Stage};
use crate::events::{EngineEvent, EventBus, EventEmitter};
use crate::handoff::{HandoffExecutor, DEFAULT_MAX_CONCURRENT_HANDOFFS};
use crate::memory::MemoryStore;
use crate::planner::{analyze_prompt, Planner};
use crate::prompts::{PromptLibrary, PromptVars};
use crate::provider::Provider;
use crate::quality::{GateOutcome, GateRunner};
use crate::session::SessionWriter;
use crate::tools::ToolCatalog;
use crate::worktree::{WorktreeConfig, WorktreeManager};

/// Engine tuning, derived from the loaded configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_parallel_agents: usize,
    pub agent: AgentSettings,
    pub budget_per_run_usd: f64,
    /// Overall timeout for one agent execution
    pub agent_timeout: Duration,
    /// Run quality gates in the verify stage
    pub verify: bool,
    /// On gate failure, run one corrective developer agent and re-check
    pub auto_fix: bool,
    pub memory_enabled: bool,
    pub worktree_enabled: bool,
    pub max_concurrent_handoffs: usize,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel_agents: config.agents.max_parallel,
            agent: AgentSettings {
                max_iterations: config.agents.max_iterations,
                max_tokens: config.agents.max_tokens,
                model: config
                    .providers
                    .model
                    .clone()
                    .unwrap_or_else(|| crate::provider::default_model_for(&config.providers.default).to_string()),
            },
            budget_per_run_usd: config.cost.budget_per_run,
            agent_timeout: Duration::from_secs(config.agents.timeout_secs),
            verify: true,
            auto_fix: config.quality.auto_fix,
            memory_enabled: config.memory.enabled,
            worktree_enabled: config.worktree.enabled,
            max_concurrent_handoffs: DEFAULT_MAX_CONCURRENT_HANDOFFS,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of a full run
#[derive(Debug)]
pub struct RunReport {
    pub success: bool,
    pub context: RunContext,
    pub plan: ExecutionPlan,
    pub gate_outcomes: Vec<GateOutcome>,
}

/// The wave scheduler and stage pipeline
///
/// Exclusively owns the RunContext, the BudgetController, and the Plan for
/// the duration of a run; everything else reads snapshots or listens on the
/// event bus.
pub struct Engine {
    provider: Arc<dyn Provider>,
    catalog: Arc<ToolCatalog>,
    roles: Arc<RoleRegistry>,
    prompts: Arc<PromptLibrary>,
    budget: Arc<BudgetController>,
    bus: Arc<MessageBus>,
    events: Arc<EventBus>,
    memory: Arc<dyn MemoryStore>,
    gates: GateRunner,
    session: Option<SessionWriter>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl Engine {
    pub fn new(
        config: &Config,
        engine_config: EngineConfig,
        provider: Arc<dyn Provider>,
        memory: Arc<dyn MemoryStore>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let budget = Arc::new(BudgetController::new(
            BudgetLimits {
                max_api_calls: config.cost.max_api_calls,
                max_tokens: config.cost.max_tokens,
                max_cost_usd: config.cost.budget_per_run,
                max_depth: config.cost.max_depth,
            },
            config.cost.auto_scale,
        ));

        let gates = GateRunner::from_config(
            &config.quality.gates,
            &config.quality.commands,
            config.quality.max_retries,
            Duration::from_secs(config.quality.timeout_secs),
        );

        debug!(
            max_parallel = engine_config.max_parallel_agents,
            budget_usd = engine_config.budget_per_run_usd,
            "Engine::new: called"
        );

        Ok(Self {
            provider,
            catalog: Arc::new(ToolCatalog::standard()),
            roles: Arc::new(RoleRegistry::standard(config.agents.max_iterations)),
            prompts: Arc::new(PromptLibrary::new()?),
            budget,
            bus: Arc::new(MessageBus::with_default_capacity()),
            events,
            memory,
            gates,
            session: Some(SessionWriter::new(config.runs_dir())),
            config: engine_config,
            cancel: CancelFlag::new(),
        })
    }

    /// Engine with no session persistence (tests)
    pub fn without_session(mut self) -> Self {
        debug!("Engine::without_session: called");
        self.session = None;
        self
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Signal cooperative cancellation to every in-flight agent
    pub fn cancel(&self, reason: &str) {
        debug!(%reason, "cancel: called");
        self.cancel.cancel(reason);
    }

    fn persist(&self, context: &RunContext) {
        if let Some(session) = &self.session {
            debug!(run_id = %context.run_id, stage = %context.stage, "persist: writing snapshot");
            session.persist(context);
        } else {
            debug!(run_id = %context.run_id, "persist: no session writer, skipping");
        }
    }

    fn stage(&self, context: &mut RunContext, emitter: &EventEmitter, stage: Stage) -> std::time::Instant {
        debug!(run_id = %context.run_id, %stage, "stage: called");
        context.set_stage(stage);
        emitter.stage_start(stage.as_str());
        self.persist(context);
        std::time::Instant::now()
    }

    /// Execute a full run for one prompt
    pub async fn run(&self, prompt: &str, working_dir: PathBuf) -> Result<RunReport> {
        debug!(prompt_len = prompt.len(), ?working_dir, "run: called");
        let budget_usd = self.config.budget_per_run_usd;
        let mut context = RunContext::new(prompt, working_dir.clone(), budget_usd);
        let emitter = self.events.emitter_for(context.run_id.clone());

        info!(run_id = %context.run_id, "engine starting");
        emitter.emit(EngineEvent::EngineStart {
            run_id: context.run_id.clone(),
            prompt: prompt.to_string(),
        });

        let handoffs = HandoffExecutor::new(
            self.bus.clone(),
            self.roles.clone(),
            self.prompts.clone(),
            self.provider.clone(),
            self.catalog.clone(),
            self.budget.clone(),
            emitter.clone(),
            self.config.agent.clone(),
            working_dir.clone(),
            self.cancel.clone(),
            self.config.max_concurrent_handoffs,
        );
        handoffs.start();
        debug!(run_id = %context.run_id, "run: handoff executor started");

        // recall
        let started = self.stage(&mut context, &emitter, Stage::Recall);
        let recalled = if self.config.memory_enabled {
            self.memory.recall(prompt, 5).await.unwrap_or_default()
        } else {
            debug!(run_id = %context.run_id, "run: memory disabled, skipping recall");
            Vec::new()
        };
        debug!(run_id = %context.run_id, hits = recalled.len(), "run: recall complete");
        context.memory_recalled = recalled.len();
        emitter.memory_recall(recalled.len());
        emitter.stage_complete(Stage::Recall.as_str(), started.elapsed().as_millis() as u64);

        // analyze
        let started = self.stage(&mut context, &emitter, Stage::Analyze);
        let analysis = analyze_prompt(prompt);
        debug!(
            run_id = %context.run_id,
            intent = %analysis.intent,
            complexity = analysis.complexity,
            roles = analysis.suggested_roles.len(),
            "run: analysis complete"
        );
        emitter.stage_complete(Stage::Analyze.as_str(), started.elapsed().as_millis() as u64);

        // enhance: fold recalled memory into the shared task context
        let started = self.stage(&mut context, &emitter, Stage::Enhance);
        let memory_context = if recalled.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = recalled.iter().map(|h| format!("- {}", h.entry.text)).collect();
            format!("Relevant memory:\n{}", lines.join("\n"))
        };
        debug!(run_id = %context.run_id, memory_context_len = memory_context.len(), "run: enhance complete");
        emitter.stage_complete(Stage::Enhance.as_str(), started.elapsed().as_millis() as u64);

        // decompose
        let started = self.stage(&mut context, &emitter, Stage::Decompose);
        let planner = Planner::new();
        let mut tasks = planner.decompose(prompt, &analysis);
        if !memory_context.is_empty() {
            debug!(run_id = %context.run_id, "run: folding recalled memory into task contexts");
            for task in &mut tasks {
                task.context = format!("{}\n{}", task.context, memory_context);
            }
        }
        debug!(run_id = %context.run_id, tasks = tasks.len(), "run: decompose complete");
        emitter.stage_complete(Stage::Decompose.as_str(), started.elapsed().as_millis() as u64);

        // plan
        let started = self.stage(&mut context, &emitter, Stage::Plan);
        let plan = planner.layer(tasks);
        debug!(run_id = %context.run_id, tasks = plan.task_count(), waves = plan.wave_count(), "run: plan created");
        emitter.plan_created(plan.task_count(), plan.wave_count());
        emitter.stage_complete(Stage::Plan.as_str(), started.elapsed().as_millis() as u64);

        // execute
        let started = self.stage(&mut context, &emitter, Stage::Execute);
        let aborted = self.execute_waves(&plan, &mut context, &emitter).await;
        debug!(
            run_id = %context.run_id,
            aborted,
            results = context.results.len(),
            cost = context.cost_usd,
            "run: execute complete"
        );
        emitter.stage_complete(Stage::Execute.as_str(), started.elapsed().as_millis() as u64);

        // verify
        let started = self.stage(&mut context, &emitter, Stage::Verify);
        let mut gate_outcomes = if self.config.verify && !aborted {
            debug!(run_id = %context.run_id, gates = self.gates.gate_count(), "run: running quality gates");
            self.gates.run_all(&working_dir, &emitter).await.unwrap_or_else(|e| {
                warn!(error = %e, "quality gates failed to run");
                emitter.error("quality", &e.to_string());
                Vec::new()
            })
        } else {
            debug!(run_id = %context.run_id, aborted, "run: verify skipped");
            Vec::new()
        };

        // One corrective agent, then a single re-check
        if self.config.auto_fix && gate_outcomes.iter().any(|o| !o.passed) && !self.cancel.is_cancelled() {
            debug!(run_id = %context.run_id, "run: gates failed, running auto-fix agent");
            let fix_result = self.run_gate_fix(&gate_outcomes, &working_dir, &emitter).await;
            context.record_result(fix_result);
            gate_outcomes = self.gates.run_all(&working_dir, &emitter).await.unwrap_or(gate_outcomes);
        }

        let gates_passed = gate_outcomes.iter().all(|o| o.passed);
        debug!(run_id = %context.run_id, gates_passed, outcomes = gate_outcomes.len(), "run: verify complete");
        emitter.stage_complete(Stage::Verify.as_str(), started.elapsed().as_millis() as u64);

        // memorize
        let started = self.stage(&mut context, &emitter, Stage::Memorize);
        if self.config.memory_enabled && !aborted {
            let summary = format!(
                "run for '{}': {} tasks, {} succeeded, {} failed, ${:.4} spent",
                prompt,
                context.results.len(),
                context.succeeded_count(),
                context.failed_count(),
                context.cost_usd
            );
            if self.memory.store(summary, vec!["run-summary".to_string()]).await.is_ok() {
                debug!(run_id = %context.run_id, "run: run summary stored to memory");
                context.memory_stored += 1;
                emitter.memory_store(1);
            }
        } else {
            debug!(run_id = %context.run_id, aborted, "run: memorize skipped");
        }
        emitter.stage_complete(Stage::Memorize.as_str(), started.elapsed().as_millis() as u64);

        debug!(run_id = %context.run_id, "run: stopping handoff executor");
        handoffs.stop().await;

        let success = !aborted && context.failed_count() == 0 && gates_passed;
        emitter.emit(EngineEvent::EngineComplete {
            run_id: context.run_id.clone(),
            success,
            duration_ms: context.elapsed_ms(),
        });
        self.persist(&context);
        info!(run_id = %context.run_id, success, cost = context.cost_usd, "engine finished");

        Ok(RunReport {
            success,
            context,
            plan,
            gate_outcomes,
        })
    }

    /// Run the plan wave by wave; returns true when the run was aborted
    ///
    /// Wave k+1 starts only after every task in wave k has produced an
    /// AgentResult. A failed task never aborts its wave; run-level budget
    /// exhaustion cancels all remaining waves.
    async fn execute_waves(&self, plan: &ExecutionPlan, context: &mut RunContext, emitter: &EventEmitter) -> bool {
        debug!(
            run_id = %context.run_id,
            waves = plan.wave_count(),
            max_parallel = self.config.max_parallel_agents,
            "execute_waves: called"
        );
        let worktrees = self.worktree_manager(context).await;
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_agents.max(1)));

        for (wave_index, wave) in plan.waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(wave = wave_index, "run cancelled, skipping remaining waves");
                emitter.error("engine", "run cancelled before wave start");
                return true;
            }
            if context.budget_exhausted() {
                warn!(wave = wave_index, "run budget exhausted, skipping remaining waves");
                emitter.emit(EngineEvent::EngineError {
                    run_id: context.run_id.clone(),
                    message: "run budget exhausted".to_string(),
                });
                self.cancel.cancel("run budget exhausted");
                return true;
            }

            emitter.wave_start(wave_index, wave.tasks.len());
            debug!(wave = wave_index, tasks = wave.tasks.len(), "wave starting");

            let mut join_set: JoinSet<(AgentResult, Option<crate::worktree::WorktreeInfo>)> = JoinSet::new();

            for task_id in &wave.tasks {
                let Some(task) = plan.task(task_id) else {
                    warn!(%task_id, "task missing from plan, skipping");
                    continue;
                };
                debug!(run_id = %context.run_id, wave = wave_index, %task_id, role = %task.role, "execute_waves: spawning task");
                self.spawn_task(
                    &mut join_set,
                    task.clone(),
                    context.working_dir.clone(),
                    semaphore.clone(),
                    worktrees.clone(),
                    emitter.clone(),
                );
            }

            // Barrier: every task of this wave settles before the next wave
            let mut wave_succeeded = 0;
            let mut wave_failed = 0;
            while let Some(joined) = join_set.join_next().await {
                let (result, worktree) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "agent task panicked");
                        continue;
                    }
                };
                debug!(
                    run_id = %context.run_id,
                    wave = wave_index,
                    task_id = %result.task_id,
                    success = result.success,
                    cost = result.cost_usd,
                    "execute_waves: task settled"
                );

                // Merges are serial: one at a time, after the agent is done
                if let (Some(manager), Some(info)) = (&worktrees, &worktree) {
                    debug!(run_id = %context.run_id, task_id = %result.task_id, branch = %info.branch, "execute_waves: settling worktree");
                    if result.success {
                        if let Err(e) = manager.merge(info).await {
                            warn!(error = %e, "worktree merge failed");
                            emitter.error("worktree", &e.to_string());
                        }
                    }
                    if let Err(e) = manager.remove(info).await {
                        debug!(error = %e, "worktree cleanup failed");
                    }
                }

                if result.success {
                    wave_succeeded += 1;
                } else {
                    wave_failed += 1;
                }

                context.record_result(result);
                emitter.cost_update(context.cost_usd, context.budget_remaining_usd);
                self.persist(context);

                // Run-level budget check after each completion
                if context.budget_exhausted() {
                    debug!(run_id = %context.run_id, cost = context.cost_usd, "execute_waves: run budget exhausted");
                    self.cancel.cancel("run budget exhausted");
                }
            }

            emitter.wave_complete(wave_index, wave_succeeded, wave_failed);
            debug!(wave = wave_index, wave_succeeded, wave_failed, "wave complete");
        }

        if context.budget_exhausted() {
            emitter.emit(EngineEvent::EngineError {
                run_id: context.run_id.clone(),
                message: "run budget exhausted".to_string(),
            });
            return true;
        }
        debug!(run_id = %context.run_id, "execute_waves: all waves complete");
        false
    }

    /// Run one developer agent against the failing gates' output
    async fn run_gate_fix(&self, outcomes: &[GateOutcome], working_dir: &PathBuf, emitter: &EventEmitter) -> AgentResult {
        let failing: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| {
                format!(
                    "gate {} failed (exit {}):\n{}\n{}",
                    o.gate, o.exit_code, o.stdout, o.stderr
                )
            })
            .collect();

        debug!(failing = failing.len(), "run_gate_fix: called");
        let task = AgentTask::new("Fix the failing quality gates", crate::domain::AgentRole::Developer)
            .with_context(failing.join("\n\n"));
        info!(task_id = %task.id, "auto-fix: running corrective agent");

        self.budget.create_budget(&task.id, BudgetTier::Standard);

        let role_config = self.roles.get_or_default(task.role);
        let system_prompt = self
            .prompts
            .render(
                task.role,
                &PromptVars {
                    working_dir: working_dir.display().to_string(),
                    context: task.context.clone(),
                },
            )
            .unwrap_or_else(|_| "You are a developer agent.".to_string());

        let agent = Agent::new(
            role_config,
            system_prompt,
            self.provider.clone(),
            self.catalog.clone(),
            self.budget.clone(),
            emitter.clone(),
            self.cancel.clone(),
            self.config.agent.clone(),
            working_dir.clone(),
        )
        .with_bus(self.bus.clone());

        let result = match tokio::time::timeout(self.config.agent_timeout, agent.execute(&task)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(task_id = %task.id, "run_gate_fix: corrective agent timed out");
                AgentResult::failed(&task.id, task.role, "auto-fix agent timed out")
            }
        };
        let _ = self.budget.release_budget(&task.id);
        debug!(task_id = %task.id, success = result.success, "run_gate_fix: complete");
        result
    }

    async fn worktree_manager(&self, context: &RunContext) -> Option<Arc<WorktreeManager>> {
        if !self.config.worktree_enabled {
            debug!(run_id = %context.run_id, "worktree_manager: isolation disabled");
            return None;
        }
        let manager = WorktreeManager::new(WorktreeConfig::for_repo(&context.working_dir));
        if manager.is_available().await {
            debug!(run_id = %context.run_id, "worktree_manager: isolation available");
            Some(Arc::new(manager))
        } else {
            warn!("worktree isolation enabled but working dir is not a git repo");
            None
        }
    }

    /// Spawn the task that runs one agent to an AgentResult
    ///
    /// Every exit path yields a result; acquiring the semaphore, the budget,
    /// and the optional worktree are all scoped so nothing leaks on timeout
    /// or cancellation.
    fn spawn_task(
        &self,
        join_set: &mut JoinSet<(AgentResult, Option<crate::worktree::WorktreeInfo>)>,
        task: AgentTask,
        working_dir: PathBuf,
        semaphore: Arc<Semaphore>,
        worktrees: Option<Arc<WorktreeManager>>,
        emitter: EventEmitter,
    ) {
        debug!(task_id = %task.id, role = %task.role, "spawn_task: called");
        let provider = self.provider.clone();
        let catalog = self.catalog.clone();
        let roles = self.roles.clone();
        let prompts = self.prompts.clone();
        let budget = self.budget.clone();
        let bus = self.bus.clone();
        let cancel = self.cancel.clone();
        let settings = self.config.agent.clone();
        let agent_timeout = self.config.agent_timeout;

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(task_id = %task.id, "spawn_task: semaphore closed");
                    return (AgentResult::failed(&task.id, task.role, "scheduler shut down"), None);
                }
            };
            debug!(task_id = %task.id, "spawn_task: permit acquired");

            budget.create_budget(&task.id, BudgetTier::Standard);

            if let Err(e) = budget.check_budget(&task.id) {
                debug!(task_id = %task.id, error = %e, "spawn_task: budget already exceeded");
                let _ = budget.release_budget(&task.id);
                return (AgentResult::failed(&task.id, task.role, e.to_string()), None);
            }

            // Optional isolation: the agent works in a disposable worktree
            let mut workdir = working_dir.clone();
            let mut worktree_info = None;
            if let Some(manager) = &worktrees {
                match manager.create(&task.id).await {
                    Ok(info) => {
                        debug!(task_id = %task.id, path = ?info.path, "spawn_task: agent isolated in worktree");
                        workdir = info.path.clone();
                        worktree_info = Some(info);
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "worktree create failed, using shared dir");
                    }
                }
            }

            let role_config = roles.get_or_default(task.role);
            let system_prompt = prompts
                .render(
                    task.role,
                    &PromptVars {
                        working_dir: workdir.display().to_string(),
                        context: task.context.clone(),
                    },
                )
                .unwrap_or_else(|_| format!("You are a {} agent.", task.role));

            let agent = Agent::new(
                role_config,
                system_prompt,
                provider,
                catalog,
                budget.clone(),
                emitter.clone(),
                cancel,
                settings,
                workdir,
            )
            .with_bus(bus);

            debug!(task_id = %task.id, ?agent_timeout, "spawn_task: running agent");
            let result = match tokio::time::timeout(agent_timeout, agent.execute(&task)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(task_id = %task.id, "spawn_task: agent timed out");
                    emitter.agent_error(&task.id, "agent timed out");
                    AgentResult::failed(&task.id, task.role, format!("agent timed out after {:?}", agent_timeout))
                }
            };

            let _ = budget.release_budget(&task.id);
            debug!(task_id = %task.id, success = result.success, "spawn_task: complete");
            (result, worktree_info)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenUsage;
    use crate::memory::{DisabledMemory, InMemoryStore};
    use crate::provider::mock::MockProvider;
    use crate::provider::ProviderResponse;
    use tempfile::tempdir;

    fn engine_with(provider: MockProvider, mutate: impl FnOnce(&mut Config, &mut EngineConfig)) -> Engine {
        let mut config = Config::default();
        let mut engine_config = EngineConfig::from_config(&config);
        engine_config.verify = false;
        mutate(&mut config, &mut engine_config);

        Engine::new(
            &config,
            engine_config,
            Arc::new(provider),
            Arc::new(DisabledMemory),
            Arc::new(EventBus::new(4096)),
        )
        .unwrap()
        .without_session()
    }

    fn cheap_responses(n: usize) -> MockProvider {
        MockProvider::new(
            (0..n)
                .map(|i| Ok(ProviderResponse::text(format!("done {}", i), TokenUsage::new(100, 50))))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_run_produces_results_for_every_task() {
        let temp = tempdir().unwrap();
        let engine = engine_with(cheap_responses(16), |_, _| {});

        let report = engine.run("build a small parser", temp.path().to_path_buf()).await.unwrap();
        assert!(report.success, "failed results: {:?}", report.context.results);
        assert_eq!(report.context.results.len(), report.plan.task_count());
        assert!(report.plan.validate().is_ok());
    }

    #[tokio::test]
    async fn test_aggregate_usage_matches_per_agent_sums() {
        let temp = tempdir().unwrap();
        let engine = engine_with(cheap_responses(16), |_, _| {});

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        let sum_in: u64 = report.context.results.iter().map(|r| r.usage.input_tokens).sum();
        let sum_cost: f64 = report.context.results.iter().map(|r| r.cost_usd).sum();
        assert_eq!(report.context.usage.input_tokens, sum_in);
        assert!((report.context.cost_usd - sum_cost).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_abort_run() {
        let temp = tempdir().unwrap();
        // First provider call fails fatally; every later call succeeds
        let mut responses: Vec<Result<ProviderResponse, crate::provider::ProviderError>> =
            vec![Err(crate::provider::ProviderError::Auth("bad key".into()))];
        responses.extend((0..16).map(|_| Ok(ProviderResponse::text("ok", TokenUsage::new(10, 5)))));
        let engine = engine_with(MockProvider::new(responses), |_, _| {});

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.context.failed_count(), 1);
        // Remaining tasks still ran
        assert_eq!(report.context.results.len(), report.plan.task_count());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_skips_later_waves() {
        let temp = tempdir().unwrap();
        // Huge per-call usage blows the run budget on the first completion
        let engine = engine_with(
            MockProvider::new(
                (0..16)
                    .map(|_| Ok(ProviderResponse::text("expensive", TokenUsage::new(10_000_000, 1_000_000))))
                    .collect(),
            ),
            |config, engine_config| {
                config.cost.budget_per_run = 0.01;
                engine_config.budget_per_run_usd = 0.01;
            },
        );

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert!(!report.success);
        // Later waves never started: fewer results than planned tasks
        assert!(report.context.results.len() < report.plan.task_count());
    }

    #[tokio::test]
    async fn test_run_emits_lifecycle_events_in_order() {
        let temp = tempdir().unwrap();
        let events = Arc::new(EventBus::new(4096));
        let mut rx = events.subscribe();

        let mut config = Config::default();
        let mut engine_config = EngineConfig::from_config(&config);
        engine_config.verify = false;
        config.memory.enabled = false;
        engine_config.memory_enabled = false;

        let engine = Engine::new(
            &config,
            engine_config,
            Arc::new(cheap_responses(16)),
            Arc::new(DisabledMemory),
            events.clone(),
        )
        .unwrap()
        .without_session();

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert!(report.success);

        let mut events_seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events_seen.push(event);
        }
        let types: Vec<&str> = events_seen.iter().map(|e| e.event_type()).collect();

        assert_eq!(types.first().copied(), Some("engine:start"));
        assert_eq!(types.last().copied(), Some("engine:complete"));
        assert!(types.contains(&"plan:created"));

        // wave:complete(k) observed before wave:start(k+1)
        let waves: Vec<String> = events_seen
            .iter()
            .filter_map(|e| match e {
                EngineEvent::WaveStart { wave, .. } => Some(format!("start:{}", wave)),
                EngineEvent::WaveComplete { wave, .. } => Some(format!("complete:{}", wave)),
                _ => None,
            })
            .collect();
        for (i, entry) in waves.iter().enumerate() {
            if let Some(wave) = entry.strip_prefix("start:") {
                if wave != "0" {
                    let prev: usize = wave.parse::<usize>().unwrap() - 1;
                    assert!(
                        waves[..i].contains(&format!("complete:{}", prev)),
                        "wave {} started before wave {} completed",
                        wave,
                        prev
                    );
                }
            }
        }

        // The stage pipeline ran in order
        let stages: Vec<&str> = events_seen
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StageStart { stage, .. } => Some(stage.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec!["recall", "analyze", "enhance", "decompose", "plan", "execute", "verify", "memorize"]
        );
    }

    #[tokio::test]
    async fn test_cancellation_fails_remaining_work() {
        let temp = tempdir().unwrap();
        let engine = engine_with(cheap_responses(16), |_, _| {});
        engine.cancel("operator stop");

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert!(!report.success);
        // No wave ran: cancellation was observed before the first wave
        assert!(report.context.results.is_empty());
    }

    #[tokio::test]
    async fn test_memorize_stores_summary() {
        let temp = tempdir().unwrap();
        let memory = Arc::new(InMemoryStore::new(30.0));

        let config = Config::default();
        let mut engine_config = EngineConfig::from_config(&config);
        engine_config.verify = false;

        let engine = Engine::new(
            &config,
            engine_config,
            Arc::new(cheap_responses(16)),
            memory.clone(),
            Arc::new(EventBus::new(4096)),
        )
        .unwrap()
        .without_session();

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert_eq!(report.context.memory_stored, 1);
        assert_eq!(memory.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_auto_fix_reruns_gates_after_corrective_agent() {
        let temp = tempdir().unwrap();
        let mut config = Config::default();
        // The gate passes only once the corrective agent has written the file
        config.quality.gates = vec!["test".to_string()];
        config
            .quality
            .commands
            .insert("test".to_string(), "test -f fixed.txt".to_string());
        config.quality.max_retries = 0;
        config.quality.auto_fix = true;

        let mut engine_config = EngineConfig::from_config(&config);
        engine_config.verify = true;
        assert!(engine_config.auto_fix);

        // Three plan agents answer with text; the fix agent writes the file
        let mut responses: Vec<Result<ProviderResponse, crate::provider::ProviderError>> = (0..3)
            .map(|_| Ok(ProviderResponse::text("ok", TokenUsage::new(10, 5))))
            .collect();
        responses.push(Ok(ProviderResponse {
            content: None,
            tool_calls: vec![crate::provider::ToolCallRequest {
                id: "call_fix".into(),
                name: "write_file".into(),
                arguments: r#"{"path":"fixed.txt","content":"patched"}"#.into(),
            }],
            finish_reason: crate::provider::FinishReason::ToolCalls,
            usage: TokenUsage::new(10, 5),
        }));
        responses.push(Ok(ProviderResponse::text("gates fixed", TokenUsage::new(10, 5))));

        let engine = Engine::new(
            &config,
            engine_config,
            Arc::new(MockProvider::new(responses)),
            Arc::new(DisabledMemory),
            Arc::new(EventBus::new(4096)),
        )
        .unwrap()
        .without_session();

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert!(temp.path().join("fixed.txt").exists(), "corrective agent must write the fix");
        assert!(report.gate_outcomes.iter().all(|o| o.passed));
        assert!(report.success);
        // The corrective agent's result is recorded alongside the plan's
        assert_eq!(report.context.results.len(), report.plan.task_count() + 1);
    }

    #[tokio::test]
    async fn test_verify_stage_runs_gates() {
        let temp = tempdir().unwrap();
        let mut config = Config::default();
        config.quality.gates = vec!["syntax".to_string(), "test".to_string()];
        config.quality.commands.insert("syntax".to_string(), "true".to_string());
        config.quality.commands.insert("test".to_string(), "exit 1".to_string());
        config.quality.max_retries = 0;

        let mut engine_config = EngineConfig::from_config(&config);
        engine_config.verify = true;

        let engine = Engine::new(
            &config,
            engine_config,
            Arc::new(cheap_responses(16)),
            Arc::new(DisabledMemory),
            Arc::new(EventBus::new(4096)),
        )
        .unwrap()
        .without_session();

        let report = engine.run("fix the bug", temp.path().to_path_buf()).await.unwrap();
        assert_eq!(report.gate_outcomes.len(), 2);
        assert!(report.gate_outcomes[0].passed);
        assert!(!report.gate_outcomes[1].passed);
        // A failed gate fails the run
        assert!(!report.success);
    }
}
