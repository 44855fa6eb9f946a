//! Domain types: identifiers, roles, tasks, plans, results, run context

pub mod id;
pub mod plan;
pub mod result;
pub mod run_context;
pub mod task;

pub use id::generate_id;
pub use plan::{ExecutionPlan, Wave};
pub use result::{AgentResult, FileChange, FileChangeKind, TokenUsage};
pub use run_context::{RunContext, Stage};
pub use task::{AgentRole, AgentTask};
