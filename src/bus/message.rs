//! Bus message envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Destination wildcard signalling broadcast
pub const BROADCAST: &str = "*";

/// Well-known message type tags
pub mod message_types {
    pub const HANDOFF: &str = "handoff";
    pub const RESULT: &str = "result";
    pub const ERROR: &str = "error";
    pub const ACK: &str = "ack";
}

/// A message on the bus
///
/// Immutable after send; the bus fills in the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Sender identifier
    pub from: String,

    /// Destination identifier, or [`BROADCAST`]
    pub to: String,

    /// Application-defined type tag (`handoff`, `result`, `error`, ...)
    #[serde(rename = "type")]
    pub msg_type: String,

    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        msg_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            msg_type: msg_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_detection() {
        let msg = BusMessage::new("a", BROADCAST, "handoff", serde_json::json!({}));
        assert!(msg.is_broadcast());

        let msg = BusMessage::new("a", "b", "result", serde_json::json!({}));
        assert!(!msg.is_broadcast());
    }

    #[test]
    fn test_serde_uses_type_key() {
        let msg = BusMessage::new("a", "b", "result", serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"result""#));

        let parsed: BusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.msg_type, "result");
        assert_eq!(parsed.payload["ok"], true);
    }
}
