//! Agent output types
//!
//! AgentResult is the per-task output handed from an agent back to the
//! engine: success flag, assistant text, file changes, and token usage.

use serde::{Deserialize, Serialize};

use super::task::AgentRole;

/// Kind of file change performed by a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Modify,
    Delete,
}

/// A single file-change record
///
/// Records are append-only within an agent run and never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Token usage for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate another usage into this one
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Estimate cost in USD based on model pricing
    pub fn cost_usd(&self, model: &str) -> f64 {
        let (input_price, output_price) = match model {
            m if m.contains("opus") => (15.0, 75.0),
            m if m.contains("sonnet") => (3.0, 15.0),
            m if m.contains("haiku") || m.contains("mini") || m.contains("flash") => (0.25, 1.25),
            m if m.contains("gpt-4") => (2.5, 10.0),
            _ => (3.0, 15.0),
        };

        (self.input_tokens as f64 / 1_000_000.0) * input_price
            + (self.output_tokens as f64 / 1_000_000.0) * output_price
    }
}

/// Per-task output produced by one agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub role: AgentRole,
    pub success: bool,

    /// Final assistant text
    pub output: String,

    /// File changes recorded during the run, in tool-call order
    #[serde(default)]
    pub file_changes: Vec<FileChange>,

    pub usage: TokenUsage,

    /// Cost attributed to this task in USD
    pub cost_usd: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Optional reasoning trace, when the provider surfaces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl AgentResult {
    /// Build a successful result
    pub fn ok(task_id: impl Into<String>, role: AgentRole, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            role,
            success: true,
            output: output.into(),
            file_changes: Vec::new(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            error: None,
            reasoning: None,
        }
    }

    /// Build a failed result carrying an error message
    pub fn failed(task_id: impl Into<String>, role: AgentRole, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            task_id: task_id.into(),
            role,
            success: false,
            output: String::new(),
            file_changes: Vec::new(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            error: Some(error),
            reasoning: None,
        }
    }

    pub fn with_file_changes(mut self, changes: Vec<FileChange>) -> Self {
        self.file_changes = changes;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage, cost_usd: f64) -> Self {
        self.usage = usage;
        self.cost_usd = cost_usd;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_add_and_total() {
        let mut usage = TokenUsage::new(100, 50);
        usage.add(&TokenUsage::new(10, 5));
        assert_eq!(usage.input_tokens, 110);
        assert_eq!(usage.output_tokens, 55);
        assert_eq!(usage.total_tokens(), 165);
    }

    #[test]
    fn test_token_usage_cost_sonnet() {
        let usage = TokenUsage::new(1_000_000, 100_000);
        // $3 input + $1.50 output
        let cost = usage.cost_usd("claude-sonnet-4");
        assert!((cost - 4.5).abs() < 0.01);
    }

    #[test]
    fn test_token_usage_cost_unknown_model_defaults() {
        let usage = TokenUsage::new(1_000_000, 0);
        assert!((usage.cost_usd("some-model") - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_agent_result_ok() {
        let result = AgentResult::ok("task-1", AgentRole::Developer, "done");
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.output, "done");
    }

    #[test]
    fn test_agent_result_failed() {
        let result = AgentResult::failed("task-1", AgentRole::Tester, "max iterations (20) reached");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("max iterations (20) reached"));
    }

    #[test]
    fn test_file_change_serde() {
        let change = FileChange::new("src/main.rs", FileChangeKind::Modify).with_content("fn main() {}");
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains(r#""kind":"modify""#));
        let parsed: FileChange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.path, "src/main.rs");
        assert_eq!(parsed.kind, FileChangeKind::Modify);
    }
}
