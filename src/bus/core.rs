//! In-process message bus
//!
//! Synchronous pub/sub with bounded history. Delivery runs in subscription
//! order; a handler returning an error never blocks delivery to the rest.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::message::{BusMessage, BROADCAST};

/// Default history capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Subscriber callback; an Err is logged and swallowed
pub type MessageHandler = Arc<dyn Fn(&BusMessage) -> eyre::Result<()> + Send + Sync>;

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    /// Deliver only messages of this type; None means all
    type_filter: Option<String>,
    /// Identity of the subscribing agent; broadcasts skip the sender's own
    owner: Option<String>,
    handler: MessageHandler,
}

struct BusInner {
    history: VecDeque<BusMessage>,
    subscribers: Vec<Subscriber>,
    next_sub_id: u64,
    destroyed: bool,
}

/// In-process pub/sub bus with bounded history
pub struct MessageBus {
    capacity: usize,
    inner: Mutex<BusInner>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(BusInner {
                history: VecDeque::new(),
                subscribers: Vec::new(),
                next_sub_id: 0,
                destroyed: false,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a message, filling in the timestamp
    ///
    /// Appends to history under the lock (serializing sends), then delivers
    /// to a snapshot of the subscriber list outside the lock so handlers may
    /// send again without deadlocking.
    pub fn send(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        msg_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> BusMessage {
        let message = BusMessage::new(from, to, msg_type, payload);

        let recipients: Vec<(u64, MessageHandler)> = {
            let mut inner = self.lock();
            if inner.destroyed {
                warn!(msg_type = %message.msg_type, "send on destroyed bus dropped");
                return message;
            }

            inner.history.push_back(message.clone());
            while inner.history.len() > self.capacity {
                inner.history.pop_front();
            }

            inner
                .subscribers
                .iter()
                .filter(|s| s.type_filter.as_deref().is_none_or(|t| t == message.msg_type))
                .filter(|s| {
                    // Broadcasts go to everyone except the sender's own handlers
                    !(message.to == BROADCAST && s.owner.as_deref() == Some(message.from.as_str()))
                })
                .map(|s| (s.id, s.handler.clone()))
                .collect()
        };

        for (id, handler) in recipients {
            if let Err(e) = handler(&message) {
                warn!(subscriber = id, error = %e, "bus handler failed, continuing delivery");
            }
        }

        message
    }

    /// Subscribe to messages of one type
    pub fn subscribe(
        &self,
        msg_type: impl Into<String>,
        handler: impl Fn(&BusMessage) -> eyre::Result<()> + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_inner(Some(msg_type.into()), None, Arc::new(handler))
    }

    /// Subscribe to every message
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&BusMessage) -> eyre::Result<()> + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_inner(None, None, Arc::new(handler))
    }

    /// Subscribe on behalf of a named agent; broadcasts from that agent are
    /// not delivered back to it
    pub fn subscribe_as(
        &self,
        owner: impl Into<String>,
        msg_type: Option<String>,
        handler: impl Fn(&BusMessage) -> eyre::Result<()> + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_inner(msg_type, Some(owner.into()), Arc::new(handler))
    }

    fn subscribe_inner(&self, type_filter: Option<String>, owner: Option<String>, handler: MessageHandler) -> SubscriptionId {
        let mut inner = self.lock();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            type_filter,
            owner,
            handler,
        });
        debug!(subscriber = id, "bus subscription added");
        SubscriptionId(id)
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, sub: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != sub.0);
        before != inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Snapshot of the retained history, oldest first
    pub fn history(&self) -> Vec<BusMessage> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// Drop all subscribers and history; further sends are discarded
    pub fn destroy(&self) {
        let mut inner = self.lock();
        inner.subscribers.clear();
        inner.history.clear();
        inner.destroyed = true;
        debug!("bus destroyed");
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
