//! Lifecycle event vocabulary
//!
//! Closed set of typed events broadcast by the engine. Consumers (loggers,
//! dashboard, metrics) subscribe to the event bus and filter by type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed event vocabulary
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "engine:start")]
    EngineStart { run_id: String, prompt: String },

    #[serde(rename = "engine:complete")]
    EngineComplete {
        run_id: String,
        success: bool,
        duration_ms: u64,
    },

    #[serde(rename = "engine:error")]
    EngineError { run_id: String, message: String },

    #[serde(rename = "stage:start")]
    StageStart { run_id: String, stage: String },

    #[serde(rename = "stage:complete")]
    StageComplete {
        run_id: String,
        stage: String,
        duration_ms: u64,
    },

    #[serde(rename = "plan:created")]
    PlanCreated {
        run_id: String,
        task_count: usize,
        wave_count: usize,
    },

    #[serde(rename = "wave:start")]
    WaveStart {
        run_id: String,
        wave: usize,
        task_count: usize,
    },

    #[serde(rename = "wave:complete")]
    WaveComplete {
        run_id: String,
        wave: usize,
        succeeded: usize,
        failed: usize,
    },

    #[serde(rename = "agent:start")]
    AgentStart {
        run_id: String,
        task_id: String,
        role: String,
    },

    #[serde(rename = "agent:progress")]
    AgentProgress {
        run_id: String,
        task_id: String,
        iteration: u32,
    },

    #[serde(rename = "agent:tool")]
    AgentTool {
        run_id: String,
        task_id: String,
        tool: String,
        success: bool,
    },

    #[serde(rename = "agent:complete")]
    AgentComplete {
        run_id: String,
        task_id: String,
        success: bool,
        input_tokens: u64,
        output_tokens: u64,
    },

    #[serde(rename = "agent:error")]
    AgentError {
        run_id: String,
        task_id: String,
        message: String,
    },

    #[serde(rename = "memory:recall")]
    MemoryRecall { run_id: String, hits: usize },

    #[serde(rename = "memory:store")]
    MemoryStore { run_id: String, entries: usize },

    #[serde(rename = "quality:gate")]
    QualityGate {
        run_id: String,
        gate: String,
        passed: bool,
    },

    #[serde(rename = "cost:update")]
    CostUpdate {
        run_id: String,
        cost_usd: f64,
        budget_remaining_usd: f64,
    },

    #[serde(rename = "error")]
    Error {
        run_id: String,
        context: String,
        message: String,
    },
}

impl EngineEvent {
    /// The run this event belongs to
    pub fn run_id(&self) -> &str {
        match self {
            EngineEvent::EngineStart { run_id, .. }
            | EngineEvent::EngineComplete { run_id, .. }
            | EngineEvent::EngineError { run_id, .. }
            | EngineEvent::StageStart { run_id, .. }
            | EngineEvent::StageComplete { run_id, .. }
            | EngineEvent::PlanCreated { run_id, .. }
            | EngineEvent::WaveStart { run_id, .. }
            | EngineEvent::WaveComplete { run_id, .. }
            | EngineEvent::AgentStart { run_id, .. }
            | EngineEvent::AgentProgress { run_id, .. }
            | EngineEvent::AgentTool { run_id, .. }
            | EngineEvent::AgentComplete { run_id, .. }
            | EngineEvent::AgentError { run_id, .. }
            | EngineEvent::MemoryRecall { run_id, .. }
            | EngineEvent::MemoryStore { run_id, .. }
            | EngineEvent::QualityGate { run_id, .. }
            | EngineEvent::CostUpdate { run_id, .. }
            | EngineEvent::Error { run_id, .. } => run_id,
        }
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::EngineStart { .. } => "engine:start",
            EngineEvent::EngineComplete { .. } => "engine:complete",
            EngineEvent::EngineError { .. } => "engine:error",
            EngineEvent::StageStart { .. } => "stage:start",
            EngineEvent::StageComplete { .. } => "stage:complete",
            EngineEvent::PlanCreated { .. } => "plan:created",
            EngineEvent::WaveStart { .. } => "wave:start",
            EngineEvent::WaveComplete { .. } => "wave:complete",
            EngineEvent::AgentStart { .. } => "agent:start",
            EngineEvent::AgentProgress { .. } => "agent:progress",
            EngineEvent::AgentTool { .. } => "agent:tool",
            EngineEvent::AgentComplete { .. } => "agent:complete",
            EngineEvent::AgentError { .. } => "agent:error",
            EngineEvent::MemoryRecall { .. } => "memory:recall",
            EngineEvent::MemoryStore { .. } => "memory:store",
            EngineEvent::QualityGate { .. } => "quality:gate",
            EngineEvent::CostUpdate { .. } => "cost:update",
            EngineEvent::Error { .. } => "error",
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: EngineEvent,
}

impl EventLogEntry {
    pub fn new(event: EngineEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_run_id() {
        let event = EngineEvent::WaveStart {
            run_id: "run-1".into(),
            wave: 0,
            task_count: 3,
        };
        assert_eq!(event.run_id(), "run-1");
    }

    #[test]
    fn test_event_wire_names() {
        let event = EngineEvent::StageStart {
            run_id: "r".into(),
            stage: "execute".into(),
        };
        assert_eq!(event.event_type(), "stage:start");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"stage:start""#));
    }

    #[test]
    fn test_event_roundtrip() {
        let event = EngineEvent::AgentComplete {
            run_id: "r".into(),
            task_id: "t".into(),
            success: true,
            input_tokens: 10,
            output_tokens: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "agent:complete");
        assert_eq!(parsed.run_id(), "r");
    }

    #[test]
    fn test_log_entry_serializes_ts() {
        let entry = EventLogEntry::new(EngineEvent::EngineStart {
            run_id: "r".into(),
            prompt: "p".into(),
        });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""ts""#));
        assert!(json.contains("engine:start"));
    }
}
