//! Agents
//!
//! Role configurations and the agent loop runner.

pub mod role;
pub mod runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use role::{RoleConfig, RoleRegistry};
pub use runner::{Agent, AgentSettings};

/// Shared cooperative cancellation flag
///
/// Agents check it between iterations and between tool calls; setting it
/// never interrupts a call already in flight.
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation with a reason; the first reason wins
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, if cancelled
    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        self.reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .or_else(|| Some("cancelled".to_string()))
    }
}
