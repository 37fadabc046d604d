//! Entity subscription — normalizes bus events for one entity and fans them
//! out to typed handlers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use hassflow_domain::entity_ref::EntityRef;
use hassflow_domain::error::FlowError;
use hassflow_domain::event::{
    ChangeDetector, EventKind, StateChangePayload, Topic, TriggerPayload, state_field_changed,
};
use hassflow_domain::id::ListenerId;

use crate::event_bus::{EventBus, SubscriptionHandle};
use crate::listeners::Listeners;

/// Inbound side of an entity: bus subscriptions plus ordered handlers.
pub struct EntitySubscription {
    inner: Arc<Inner>,
    bus: Arc<EventBus>,
    owner: String,
    handles: Mutex<Option<Vec<SubscriptionHandle>>>,
}

struct Inner {
    entity: EntityRef,
    detector: Mutex<ChangeDetector>,
    state_handlers: Listeners<StateChangePayload>,
    trigger_handlers: Listeners<TriggerPayload>,
}

impl EntitySubscription {
    pub fn new(bus: Arc<EventBus>, entity: EntityRef, owner: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entity,
                detector: Mutex::new(state_field_changed),
                state_handlers: Listeners::new(),
                trigger_handlers: Listeners::new(),
            }),
            bus,
            owner: owner.into(),
            handles: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.inner.entity
    }

    /// Replace the comparison deciding [`StateChangePayload::changed`].
    pub fn set_change_detector(&self, detector: ChangeDetector) {
        *self
            .inner
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = detector;
    }

    /// Append a state-change handler.
    pub fn on_state_change<F>(&self, owner: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&StateChangePayload) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.inner.state_handlers.add(owner, handler)
    }

    /// Append a trigger handler.
    pub fn on_trigger<F>(&self, owner: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&TriggerPayload) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.inner.trigger_handlers.add(owner, handler)
    }

    /// Remove a handler added through either `on_*` method.
    pub fn remove_handler(&self, id: ListenerId) -> bool {
        self.inner.state_handlers.remove(id) || self.inner.trigger_handlers.remove(id)
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.lock_handles().is_some()
    }

    /// Subscribe to state changes and triggers of the entity.
    ///
    /// Returns `false` without touching the bus when already subscribed.
    pub fn subscribe(&self) -> bool {
        let mut handles = self.lock_handles();
        if handles.is_some() {
            return false;
        }
        let topic = Topic::Entity(self.inner.entity.clone());

        let weak = Arc::downgrade(&self.inner);
        let state = self.bus.on(
            EventKind::StateChanged,
            topic.clone(),
            self.owner.clone(),
            move |raw: &Value| match weak.upgrade() {
                Some(inner) => inner.on_raw_state_change(raw),
                None => Ok(()),
            },
        );

        let weak = Arc::downgrade(&self.inner);
        let trigger = self.bus.on(
            EventKind::AutomationTriggered,
            topic,
            self.owner.clone(),
            move |raw: &Value| match weak.upgrade() {
                Some(inner) => inner.on_raw_trigger(raw),
                None => Ok(()),
            },
        );

        *handles = Some(vec![state, trigger]);
        true
    }

    /// Drop the bus subscriptions. Handlers stay registered.
    pub fn unsubscribe(&self) {
        let handles = self.lock_handles().take();
        for handle in handles.into_iter().flatten() {
            self.bus.off(handle);
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Option<Vec<SubscriptionHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EntitySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl Inner {
    fn on_raw_state_change(&self, raw: &Value) -> Result<(), FlowError> {
        let detector = *self.detector.lock().unwrap_or_else(PoisonError::into_inner);
        let payload = StateChangePayload::from_raw(raw, &self.entity.entity_id, detector)?;
        self.state_handlers.emit(&payload);
        Ok(())
    }

    fn on_raw_trigger(&self, raw: &Value) -> Result<(), FlowError> {
        let payload = TriggerPayload::from_raw(raw, &self.entity.entity_id)?;
        self.trigger_handlers.emit(&payload);
        Ok(())
    }
}
