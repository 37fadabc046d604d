//! Per-connection event bus keyed by `(event kind, topic)`.
//!
//! The transport adapter calls [`EventBus::emit`] for every raw hub event;
//! integrations subscribe for the entities they represent. Delivery is
//! synchronous, in subscription order, with no buffering or replay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use hassflow_domain::error::FlowError;
use hassflow_domain::event::{EventKind, Topic};
use hassflow_domain::id::ListenerId;

use crate::listeners::Listeners;

type Key = (EventKind, Topic);

/// Proof of one bus subscription. Consumed by [`EventBus::off`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct SubscriptionHandle {
    kind: EventKind,
    topic: Topic,
    id: ListenerId,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Publish/subscribe registry shared by every node bound to one connection.
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<Key, Arc<Listeners<Value>>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `kind` addressed to `topic`.
    pub fn on<F>(
        &self,
        kind: EventKind,
        topic: impl Into<Topic>,
        owner: impl Into<String>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Value) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut topics = self.lock();
        let id = topics
            .entry((kind, topic.clone()))
            .or_insert_with(|| Arc::new(Listeners::new()))
            .add(owner, callback);
        SubscriptionHandle { kind, topic, id }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, handle: SubscriptionHandle) -> bool {
        let mut topics = self.lock();
        let key = (handle.kind, handle.topic);
        let Some(listeners) = topics.get(&key) else {
            return false;
        };
        let removed = listeners.remove(handle.id);
        if listeners.is_empty() {
            topics.remove(&key);
        }
        removed
    }

    /// Deliver `event` to every subscriber of `(kind, topic)`.
    ///
    /// Returns the number of callbacks that handled the event successfully.
    /// Events nobody subscribed to are dropped.
    pub fn emit(&self, kind: EventKind, topic: &Topic, event: &Value) -> usize {
        let listeners = self.lock().get(&(kind, topic.clone())).map(Arc::clone);
        match listeners {
            Some(listeners) => listeners.emit(event),
            None => {
                tracing::trace!(%kind, %topic, "dropping event without subscribers");
                0
            }
        }
    }

    /// Number of callbacks registered for `(kind, topic)`.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind, topic: &Topic) -> usize {
        self.lock()
            .get(&(kind, topic.clone()))
            .map_or(0, |listeners| listeners.len())
    }

    /// Total number of live subscriptions across all keys.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.lock().values().map(|listeners| listeners.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Arc<Listeners<Value>>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
