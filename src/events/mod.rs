//! Lifecycle events
//!
//! Typed event vocabulary, broadcast bus, and the JSONL event logger.

pub mod bus;
pub mod logger;
pub mod types;

pub use bus::{create_event_bus, EventBus, EventEmitter, DEFAULT_CHANNEL_CAPACITY};
pub use logger::{read_run_events, spawn_event_logger, EventLogger};
pub use types::{EngineEvent, EventLogEntry};
