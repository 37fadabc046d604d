//! Integration — registration lifecycle of one node with the hub.
//!
//! An integration builds its discovery payload through a node-supplied
//! builder, sends it whenever the connection is (or becomes) open, and sends
//! an explicit removal on teardown when it still can. Nothing is retried on a
//! timer: the only retry path is the next `connection_opened` event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use hassflow_domain::discovery::{DiscoveryPayload, HubCommand, Removal};
use hassflow_domain::error::CommandError;
use hassflow_domain::event::{EventKind, Topic};
use hassflow_domain::id::NodeId;

use crate::context::HubContext;
use crate::event_bus::SubscriptionHandle;
use crate::ports::Connection;

/// Builds a fresh discovery payload from current node state.
pub type PayloadBuilder = Arc<dyn Fn() -> DiscoveryPayload + Send + Sync>;

/// Where an integration stands with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Never registered, or explicitly removed.
    Unregistered,
    /// Waiting for the next `connection_opened` to register.
    AwaitingConnection,
    /// Discovery payload sent, acknowledgement outstanding.
    Pending,
    /// Hub acknowledged the discovery payload.
    Registered,
    /// Torn down; every further call is a no-op.
    Closed,
}

/// Registration lifecycle of one node. Cheap to clone.
pub struct Integration<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Integration<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    ctx: HubContext<C>,
    node_id: NodeId,
    build_payload: PayloadBuilder,
    state: Mutex<RegistrationState>,
    /// Bumped under the state lock each time a discovery goes out.
    attempt: AtomicU64,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl<C: Connection + 'static> Integration<C> {
    /// Create the integration and start watching the connection lifecycle.
    pub fn new(ctx: HubContext<C>, node_id: NodeId, build_payload: PayloadBuilder) -> Self {
        let inner = Arc::new(Inner {
            ctx,
            node_id,
            build_payload,
            state: Mutex::new(RegistrationState::Unregistered),
            attempt: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        });

        let bus = Arc::clone(inner.ctx.bus());
        let owner = inner.node_id.to_string();

        let weak = Arc::downgrade(&inner);
        let opened = bus.on(
            EventKind::ConnectionOpened,
            Topic::Connection,
            owner.clone(),
            move |_: &Value| {
                if let Some(inner) = weak.upgrade() {
                    spawn_registration(inner);
                }
                Ok(())
            },
        );

        let weak: Weak<Inner<C>> = Arc::downgrade(&inner);
        let closed = bus.on(
            EventKind::ConnectionClosed,
            Topic::Connection,
            owner,
            move |_: &Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_connection_closed();
                }
                Ok(())
            },
        );

        inner.lock_subscriptions().extend([opened, closed]);
        Self { inner }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    #[must_use]
    pub fn context(&self) -> &HubContext<C> {
        &self.inner.ctx
    }

    #[must_use]
    pub fn state(&self) -> RegistrationState {
        *self.inner.lock_state()
    }

    /// Build the current discovery payload without sending it.
    #[must_use]
    pub fn discovery_payload(&self) -> DiscoveryPayload {
        (self.inner.build_payload)()
    }

    /// Send the discovery payload if the connection is open.
    ///
    /// Never fails: a closed connection or a hub rejection leaves the
    /// integration in [`RegistrationState::AwaitingConnection`] until the
    /// next `connection_opened` event.
    pub async fn register(&self) -> RegistrationState {
        self.inner.register().await
    }

    /// Send an explicit removal if connected; skipped otherwise.
    ///
    /// Returns whether the hub acknowledged the removal.
    pub async fn deregister(&self) -> bool {
        let inner = &self.inner;
        if *inner.lock_state() == RegistrationState::Closed {
            return false;
        }
        *inner.lock_state() = RegistrationState::Unregistered;

        if !inner.ctx.connection().is_open() {
            tracing::debug!(node_id = %inner.node_id, "not connected, skipping deregistration");
            return false;
        }

        let removal = Removal::of(&(inner.build_payload)());
        match inner.ctx.connection().send(HubCommand::Remove(removal)).await {
            Ok(_) => {
                tracing::debug!(node_id = %inner.node_id, "deregistered from hub");
                true
            }
            Err(err) => {
                tracing::warn!(node_id = %inner.node_id, error = %err, "deregistration failed");
                false
            }
        }
    }

    /// Drop every bus subscription and refuse further registration.
    pub fn close(&self) {
        *self.inner.lock_state() = RegistrationState::Closed;
        let handles = std::mem::take(&mut *self.inner.lock_subscriptions());
        let bus = self.inner.ctx.bus();
        for handle in handles {
            bus.off(handle);
        }
    }
}

impl<C: Connection + 'static> Inner<C> {
    async fn register(&self) -> RegistrationState {
        let attempt = {
            let mut state = self.lock_state();
            match *state {
                RegistrationState::Closed | RegistrationState::Pending => return *state,
                _ => {}
            }
            if !self.ctx.connection().is_open() {
                tracing::debug!(
                    node_id = %self.node_id,
                    "connection closed, registration deferred"
                );
                *state = RegistrationState::AwaitingConnection;
                return *state;
            }
            *state = RegistrationState::Pending;
            self.attempt.fetch_add(1, Ordering::SeqCst) + 1
        };

        let payload = (self.build_payload)();
        let result = self.ctx.connection().send(HubCommand::Discover(payload)).await;

        let mut state = self.lock_state();
        if *state != RegistrationState::Pending || self.attempt.load(Ordering::SeqCst) != attempt {
            // closed, disconnected or superseded while the command was in flight
            tracing::debug!(node_id = %self.node_id, attempt, "stale registration result dropped");
            return *state;
        }
        *state = match result {
            Ok(_) => {
                tracing::debug!(node_id = %self.node_id, "registered with hub");
                RegistrationState::Registered
            }
            Err(CommandError::TransportUnavailable(_)) => {
                tracing::debug!(node_id = %self.node_id, "connection lost during registration");
                RegistrationState::AwaitingConnection
            }
            Err(CommandError::Rejected(err)) => {
                tracing::warn!(node_id = %self.node_id, error = %err, "hub rejected registration");
                RegistrationState::AwaitingConnection
            }
        };
        *state
    }

    fn on_connection_closed(&self) {
        let mut state = self.lock_state();
        if matches!(
            *state,
            RegistrationState::Pending | RegistrationState::Registered
        ) {
            *state = RegistrationState::AwaitingConnection;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<SubscriptionHandle>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_registration<C: Connection + 'static>(inner: Arc<Inner<C>>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                inner.register().await;
            });
        }
        Err(_) => {
            tracing::warn!(
                node_id = %inner.node_id,
                "no async runtime available, registration deferred"
            );
        }
    }
}
