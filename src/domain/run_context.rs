//! Per-run accumulator
//!
//! The RunContext is owned and mutated only by the engine; other components
//! read cloned snapshots.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;
use super::result::{AgentResult, TokenUsage};

/// Engine pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Recall,
    Analyze,
    Enhance,
    Decompose,
    Plan,
    Execute,
    Verify,
    Memorize,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Recall,
        Stage::Analyze,
        Stage::Enhance,
        Stage::Decompose,
        Stage::Plan,
        Stage::Execute,
        Stage::Verify,
        Stage::Memorize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Recall => "recall",
            Stage::Analyze => "analyze",
            Stage::Enhance => "enhance",
            Stage::Decompose => "decompose",
            Stage::Plan => "plan",
            Stage::Execute => "execute",
            Stage::Verify => "verify",
            Stage::Memorize => "memorize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accumulated state for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub stage: Stage,

    /// One entry per completed task
    pub results: Vec<AgentResult>,

    /// Aggregate token usage across all agents
    pub usage: TokenUsage,

    /// Running cost in USD
    pub cost_usd: f64,

    /// Remaining run budget in USD
    pub budget_remaining_usd: f64,

    pub memory_recalled: usize,
    pub memory_stored: usize,

    pub working_dir: PathBuf,
}

impl RunContext {
    pub fn new(prompt: &str, working_dir: PathBuf, budget_usd: f64) -> Self {
        Self {
            run_id: generate_id("run", prompt),
            started_at: Utc::now(),
            stage: Stage::Recall,
            results: Vec::new(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            budget_remaining_usd: budget_usd,
            memory_recalled: 0,
            memory_stored: 0,
            working_dir,
        }
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Record a finished agent, folding its usage and cost into the totals
    pub fn record_result(&mut self, result: AgentResult) {
        self.usage.add(&result.usage);
        self.cost_usd += result.cost_usd;
        self.budget_remaining_usd = (self.budget_remaining_usd - result.cost_usd).max(0.0);
        self.results.push(result);
    }

    /// True once the run cost has consumed the whole budget
    pub fn budget_exhausted(&self) -> bool {
        self.budget_remaining_usd <= 0.0
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Immutable snapshot for readers outside the engine
    pub fn snapshot(&self) -> RunContext {
        self.clone()
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}
