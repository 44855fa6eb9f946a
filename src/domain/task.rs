//! Task domain types
//!
//! An AgentTask is the unit of scheduled work: one role, one description,
//! zero or more dependencies. Tasks are created by the Planner, immutable
//! once created, and live for exactly one run.

use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// The closed set of agent roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Orchestrator,
    Researcher,
    Architect,
    Developer,
    Tester,
    Validator,
    Ux,
}

impl AgentRole {
    /// All roles, in scheduling order
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Orchestrator,
        AgentRole::Researcher,
        AgentRole::Architect,
        AgentRole::Developer,
        AgentRole::Ux,
        AgentRole::Tester,
        AgentRole::Validator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Researcher => "researcher",
            AgentRole::Architect => "architect",
            AgentRole::Developer => "developer",
            AgentRole::Tester => "tester",
            AgentRole::Validator => "validator",
            AgentRole::Ux => "ux",
        }
    }

    /// Fixed ordering used as the tie-break after priority within a wave
    pub fn scheduling_rank(&self) -> usize {
        Self::ALL.iter().position(|r| r == self).unwrap_or(Self::ALL.len())
    }

    /// Parse a role name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_str() == s.to_lowercase())
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work assigned to one role-configured agent
///
/// Immutable once created. Dependencies reference other task IDs and must
/// resolve to earlier waves in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Stable identifier (e.g., `019a3f-task-implement-parser`)
    pub id: String,

    /// Human description of what the agent should do
    pub description: String,

    /// Role tag selecting the agent configuration
    pub role: AgentRole,

    /// IDs of tasks that must complete before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Priority 1 (lowest) to 10 (highest)
    pub priority: u8,

    /// Tool names this task needs; empty means the role's default set
    #[serde(default)]
    pub required_tools: Vec<String>,

    /// Free-form context handed to the agent alongside the description
    #[serde(default)]
    pub context: String,
}

impl AgentTask {
    /// Create a task with a generated ID and default priority
    pub fn new(description: impl Into<String>, role: AgentRole) -> Self {
        let description = description.into();
        Self {
            id: generate_id("task", &description),
            description,
            role,
            depends_on: Vec::new(),
            priority: 5,
            required_tools: Vec::new(),
            context: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_required_tools(mut self, tools: Vec<String>) -> Self {
        self.required_tools = tools;
        self
    }
}
