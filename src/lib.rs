//! CortexOS - local multi-agent orchestration runtime
//!
//! One natural-language prompt in; an analyzed, decomposed, budgeted,
//! wave-scheduled multi-agent execution out, with quality gates on the
//! result and a structured report at the end.
//!
//! # Core subsystems
//!
//! - [`provider`] - uniform LLM gateway with retries, circuit breaking, and
//!   ordered failover
//! - [`tools`] - the catalog of named operations agents may call
//! - [`budget`] - per-task spend/token/depth ledgers with hard limits
//! - [`bus`] - in-process pub/sub plus the cross-process IPC extension
//! - [`agent`] - the LLM-tool-LLM loop for a single role-bound agent
//! - [`handoff`] - delegations between roles, claimed off the bus
//! - [`planner`] - prompt analysis and Kahn wave layering
//! - [`engine`] - the stage pipeline and wave scheduler
//! - [`events`] - the typed lifecycle event vocabulary

pub mod agent;
pub mod budget;
pub mod bus;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod handoff;
pub mod memory;
pub mod planner;
pub mod prompts;
pub mod provider;
pub mod quality;
pub mod session;
pub mod tools;
pub mod worktree;

// Re-export commonly used types
pub use agent::{Agent, AgentSettings, CancelFlag, RoleConfig, RoleRegistry};
pub use budget::{Budget, BudgetController, BudgetError, BudgetLimits, BudgetStats, BudgetTier};
pub use bus::{BusMessage, EnvelopeKind, IpcBus, IpcConfig, IpcEnvelope, MessageBus, BROADCAST};
pub use config::Config;
pub use domain::{
    AgentResult, AgentRole, AgentTask, ExecutionPlan, FileChange, FileChangeKind, RunContext, Stage, TokenUsage, Wave,
};
pub use engine::{Engine, EngineConfig, RunReport};
pub use events::{EngineEvent, EventBus, EventEmitter};
pub use handoff::{HandoffExecutor, HandoffRequest};
pub use memory::{DisabledMemory, InMemoryStore, MemoryStore};
pub use planner::{analyze_prompt, layer_waves, Planner, PromptAnalysis};
pub use provider::{
    create_provider, FailoverProvider, HttpProvider, Provider, ProviderError, ProviderRequest, ProviderResponse,
};
pub use quality::{CommandGate, GateOutcome, GateRunner, QualityGate};
pub use session::SessionWriter;
pub use tools::{Tool, ToolCatalog, ToolContext, ToolError, ToolResult};
pub use worktree::{WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
