//! Events and the cross-script event bus.
//!
//! Scripts register handlers with `on name { … }` and raise events with
//! `emit name payload`. Within one script, emitted events are queued and
//! handled after the current unit of work finishes. Scripts that share an
//! [`EventBus`] see each other's events.
//!
//! Payloads travel as JSON so events can cross threads; interpreter values
//! are reference counted and stay on the runtime that created them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::RetroConfig;
use crate::value::Value;

/// Default capacity of an [`EventBus`] channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// A named occurrence with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    /// Id of the script context that emitted the event, `None` for host events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            source: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: Uuid) -> Self {
        self.source = Some(source);
        self
    }

    /// The payload as a script value, as bound to `event` inside handlers.
    pub fn payload_value(&self) -> Value {
        Value::from_json(&self.payload)
    }
}

/// Broadcast channel shared by script contexts and the host.
///
/// Receivers that fall more than `capacity` events behind miss the oldest
/// ones and are told how many they skipped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// A bus sized by `event_capacity` from `config`.
    pub fn from_config(config: &RetroConfig) -> Self {
        Self::new(config.event_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sends to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: Event) -> usize {
        // No subscribers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
