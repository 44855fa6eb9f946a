//! Event bus - typed lifecycle broadcaster
//!
//! Built on a tokio broadcast channel: emits are fire-and-forget, slow
//! subscribers lag rather than applying backpressure.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::EngineEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Broadcast bus for engine lifecycle events
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: EngineEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "event emitted");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emitter handle bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            run_id: run_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap-to-clone handle for emitting events with a pre-set run ID
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<EngineEvent>,
    run_id: String,
}

impl EventEmitter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn stage_start(&self, stage: &str) {
        self.emit(EngineEvent::StageStart {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
        });
    }

    pub fn stage_complete(&self, stage: &str, duration_ms: u64) {
        self.emit(EngineEvent::StageComplete {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            duration_ms,
        });
    }

    pub fn plan_created(&self, task_count: usize, wave_count: usize) {
        self.emit(EngineEvent::PlanCreated {
            run_id: self.run_id.clone(),
            task_count,
            wave_count,
        });
    }

    pub fn wave_start(&self, wave: usize, task_count: usize) {
        self.emit(EngineEvent::WaveStart {
            run_id: self.run_id.clone(),
            wave,
            task_count,
        });
    }

    pub fn wave_complete(&self, wave: usize, succeeded: usize, failed: usize) {
        self.emit(EngineEvent::WaveComplete {
            run_id: self.run_id.clone(),
            wave,
            succeeded,
            failed,
        });
    }

    pub fn agent_start(&self, task_id: &str, role: &str) {
        self.emit(EngineEvent::AgentStart {
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            role: role.to_string(),
        });
    }

    pub fn agent_progress(&self, task_id: &str, iteration: u32) {
        self.emit(EngineEvent::AgentProgress {
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            iteration,
        });
    }

    pub fn agent_tool(&self, task_id: &str, tool: &str, success: bool) {
        self.emit(EngineEvent::AgentTool {
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            tool: tool.to_string(),
            success,
        });
    }

    pub fn agent_complete(&self, task_id: &str, success: bool, input_tokens: u64, output_tokens: u64) {
        self.emit(EngineEvent::AgentComplete {
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            success,
            input_tokens,
            output_tokens,
        });
    }

    pub fn agent_error(&self, task_id: &str, message: &str) {
        self.emit(EngineEvent::AgentError {
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            message: message.to_string(),
        });
    }

    pub fn memory_recall(&self, hits: usize) {
        self.emit(EngineEvent::MemoryRecall {
            run_id: self.run_id.clone(),
            hits,
        });
    }

    pub fn memory_store(&self, entries: usize) {
        self.emit(EngineEvent::MemoryStore {
            run_id: self.run_id.clone(),
            entries,
        });
    }

    pub fn quality_gate(&self, gate: &str, passed: bool) {
        self.emit(EngineEvent::QualityGate {
            run_id: self.run_id.clone(),
            gate: gate.to_string(),
            passed,
        });
    }

    pub fn cost_update(&self, cost_usd: f64, budget_remaining_usd: f64) {
        self.emit(EngineEvent::CostUpdate {
            run_id: self.run_id.clone(),
            cost_usd,
            budget_remaining_usd,
        });
    }

    pub fn error(&self, context: &str, message: &str) {
        self.emit(EngineEvent::Error {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
