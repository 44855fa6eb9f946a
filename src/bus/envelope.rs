//! IPC envelope
//!
//! JSON wrapper for cross-process bus delivery. One JSON document per line
//! on child-process stdio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    AgentMessage,
    Ack,
    Ping,
    Pong,
}

/// Wire envelope: `{kind, sender, seq, timestamp, payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcEnvelope {
    pub kind: EnvelopeKind,
    pub sender: String,

    /// Monotonic per bus; acks echo the sequence they answer
    pub seq: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl IpcEnvelope {
    pub fn agent_message(sender: impl Into<String>, seq: u64, payload: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::AgentMessage,
            sender: sender.into(),
            seq,
            timestamp: Utc::now(),
            payload: Some(payload),
        }
    }

    pub fn ack(sender: impl Into<String>, seq: u64) -> Self {
        Self {
            kind: EnvelopeKind::Ack,
            sender: sender.into(),
            seq,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn ping(sender: impl Into<String>, seq: u64) -> Self {
        Self {
            kind: EnvelopeKind::Ping,
            sender: sender.into(),
            seq,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn pong(sender: impl Into<String>, seq: u64) -> Self {
        Self {
            kind: EnvelopeKind::Pong,
            sender: sender.into(),
            seq,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    /// Serialize as one wire line (no trailing newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one wire line
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
