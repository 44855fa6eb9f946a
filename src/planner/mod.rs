//! Planner
//!
//! Turns an analyzed prompt into a task set and a wave layering. Waves are
//! a Kahn-style topological partition; a cycle that cannot be layered falls
//! back into a single final wave so no task is ever dropped.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{AgentRole, AgentTask, ExecutionPlan, Wave};

/// Result of analyzing a user prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptAnalysis {
    /// 0.0 (trivial) to 1.0 (very complex)
    pub complexity: f64,
    pub domains: Vec<String>,
    pub languages: Vec<String>,
    pub intent: String,
    pub estimated_subtasks: usize,
    pub suggested_roles: Vec<AgentRole>,
}

/// Keyword-driven prompt analysis
///
/// Deliberately cheap: the analysis shapes the plan, it does not have to be
/// clever about language.
pub fn analyze_prompt(prompt: &str) -> PromptAnalysis {
    let lower = prompt.to_lowercase();
    let words = prompt.split_whitespace().count();

    let mut domains = Vec::new();
    for (keyword, domain) in [
        ("api", "api"),
        ("server", "backend"),
        ("database", "storage"),
        ("cli", "cli"),
        ("parser", "parsing"),
        ("frontend", "frontend"),
        ("ui", "frontend"),
        ("test", "testing"),
        ("deploy", "infra"),
    ] {
        if lower.contains(keyword) && !domains.contains(&domain.to_string()) {
            domains.push(domain.to_string());
        }
    }

    let mut languages = Vec::new();
    for lang in ["rust", "python", "typescript", "javascript", "go", "java", "sql"] {
        if lower.contains(lang) {
            languages.push(lang.to_string());
        }
    }

    let intent = if lower.contains("fix") || lower.contains("bug") {
        "fix"
    } else if lower.contains("refactor") {
        "refactor"
    } else if lower.contains("explain") || lower.contains("document") {
        "explain"
    } else if lower.contains("build") || lower.contains("create") || lower.contains("implement") || lower.contains("add") {
        "build"
    } else if lower.contains("test") {
        "test"
    } else {
        "build"
    }
    .to_string();

    // Longer prompts with more domains read as more complex
    let complexity = ((words as f64 / 80.0) + (domains.len() as f64 * 0.15)).min(1.0);

    let mut suggested_roles = vec![AgentRole::Researcher];
    if complexity >= 0.3 {
        suggested_roles.push(AgentRole::Architect);
    }
    suggested_roles.push(AgentRole::Developer);
    if domains.iter().any(|d| d == "frontend") {
        suggested_roles.push(AgentRole::Ux);
    }
    if intent != "explain" {
        suggested_roles.push(AgentRole::Tester);
    }
    if complexity >= 0.5 {
        suggested_roles.push(AgentRole::Validator);
    }

    let estimated_subtasks = suggested_roles.len().max(2);

    debug!(%intent, complexity, subtasks = estimated_subtasks, "prompt analyzed");
    PromptAnalysis {
        complexity,
        domains,
        languages,
        intent,
        estimated_subtasks,
        suggested_roles,
    }
}

/// Builds execution plans from analyses
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Build the task set and wave layering for a run
    pub fn plan(&self, prompt: &str, analysis: &PromptAnalysis) -> ExecutionPlan {
        let tasks = self.decompose(prompt, analysis);
        self.layer(tasks)
    }

    /// Layer an existing task set into waves
    pub fn layer(&self, tasks: Vec<AgentTask>) -> ExecutionPlan {
        let waves = layer_waves(&tasks);
        let plan = ExecutionPlan::new(tasks, waves);
        info!(
            tasks = plan.task_count(),
            waves = plan.wave_count(),
            "plan created"
        );
        debug_assert!(plan.validate().is_ok(), "planner produced invalid plan");
        plan
    }

    /// Synthesize role-tagged tasks with a canonical dependency chain:
    /// research, then design, then implementation (with ux alongside), then
    /// tests, then validation.
    pub fn decompose(&self, prompt: &str, analysis: &PromptAnalysis) -> Vec<AgentTask> {
        let mut tasks: Vec<AgentTask> = Vec::new();
        let mut last_of: HashMap<AgentRole, String> = HashMap::new();

        let descriptions: HashMap<AgentRole, String> = [
            (AgentRole::Researcher, format!("Research the codebase and requirements for: {}", prompt)),
            (AgentRole::Architect, format!("Design the approach for: {}", prompt)),
            (AgentRole::Developer, format!("Implement: {}", prompt)),
            (AgentRole::Ux, format!("Review user-facing surfaces for: {}", prompt)),
            (AgentRole::Tester, format!("Write and run tests for: {}", prompt)),
            (AgentRole::Validator, format!("Validate the finished work against: {}", prompt)),
        ]
        .into();

        let priority_of = |role: AgentRole| match role {
            AgentRole::Orchestrator => 9,
            AgentRole::Researcher => 8,
            AgentRole::Architect => 8,
            AgentRole::Developer => 7,
            AgentRole::Ux => 5,
            AgentRole::Tester => 6,
            AgentRole::Validator => 4,
        };

        let deps_of = |role: AgentRole, last_of: &HashMap<AgentRole, String>| -> Vec<String> {
            let upstream: &[AgentRole] = match role {
                AgentRole::Researcher | AgentRole::Orchestrator => &[],
                AgentRole::Architect => &[AgentRole::Researcher],
                AgentRole::Developer => &[AgentRole::Architect, AgentRole::Researcher],
                AgentRole::Ux => &[AgentRole::Architect, AgentRole::Researcher],
                AgentRole::Tester => &[AgentRole::Developer],
                AgentRole::Validator => &[AgentRole::Tester, AgentRole::Developer],
            };
            // Depend on the nearest existing upstream role only
            upstream
                .iter()
                .find_map(|r| last_of.get(r).cloned())
                .into_iter()
                .collect()
        };

        for &role in &analysis.suggested_roles {
            let description = descriptions
                .get(&role)
                .cloned()
                .unwrap_or_else(|| format!("Handle ({}): {}", role, prompt));
            let task = AgentTask::new(description, role)
                .with_priority(priority_of(role))
                .with_dependencies(deps_of(role, &last_of))
                .with_context(format!("intent: {}", analysis.intent));
            last_of.insert(role, task.id.clone());
            tasks.push(task);
        }

        tasks
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Kahn-style topological partition into waves
///
/// Wave 1 holds every task with no unresolved dependencies; each later wave
/// holds the tasks whose dependencies all lie in earlier waves. If tasks
/// remain but the next wave would be empty, the remainder becomes one final
/// wave (circular-dependency fallback).
pub fn layer_waves(tasks: &[AgentTask]) -> Vec<Wave> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining: Vec<&AgentTask> = tasks.iter().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let (ready, rest): (Vec<&AgentTask>, Vec<&AgentTask>) = remaining.iter().copied().partition(|t| {
            t.depends_on
                .iter()
                // Dependencies outside the task set cannot block anything
                .all(|d| placed.contains(d) || !known.contains(d.as_str()))
        });

        if ready.is_empty() {
            warn!(remaining = rest.len(), "circular dependencies, emitting fallback wave");
            waves.push(Wave::new(sort_wave(&rest)));
            break;
        }

        for task in &ready {
            placed.insert(task.id.clone());
        }
        waves.push(Wave::new(sort_wave(&ready)));
        remaining = rest;
    }

    waves
}

/// Priority descending, then fixed role order
fn sort_wave(tasks: &[&AgentTask]) -> Vec<String> {
    let mut sorted: Vec<&&AgentTask> = tasks.iter().collect();
    sorted.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.role.scheduling_rank().cmp(&b.role.scheduling_rank()))
    });
    sorted.iter().map(|t| t.id.clone()).collect()
}
