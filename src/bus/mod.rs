//! Message bus
//!
//! In-process pub/sub with bounded history, plus the cross-process IPC
//! extension with sequence/ack/timeout semantics.

pub mod core;
pub mod envelope;
pub mod ipc;
pub mod message;

pub use core::{MessageBus, MessageHandler, SubscriptionId, DEFAULT_HISTORY_CAPACITY};
pub use envelope::{EnvelopeKind, IpcEnvelope};
pub use ipc::{IpcBus, IpcConfig, IpcStats, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MESSAGE_TIMEOUT};
pub use message::{message_types, BusMessage, BROADCAST};
