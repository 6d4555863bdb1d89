//! In-process notification bus.
//!
//! Stands in for the host application's module notification channel: every
//! subscriber sees every notification published after it subscribed, in
//! publish order. Slow subscribers lag and lose the oldest notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::mlog_trace;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// A named notification with a free-form JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    /// Component that published it, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Notification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
            sender: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Read a boolean field from an object payload.
    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.payload.get(field).and_then(Value::as_bool)
    }
}

/// Broadcast bus shared by observers, the hold policy, the coordinator and
/// the HTTP endpoint. Cloning is cheap; all clones publish to the same channel.
#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers.
    ///
    /// Returns how many subscribers received it; zero listeners is not an error.
    pub fn publish(&self, notification: Notification) -> usize {
        mlog_trace!("bus: {} payload={}", notification.name, notification.payload);
        self.tx.send(notification).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
