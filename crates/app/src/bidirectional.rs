//! Bidirectional integration — registration plus inbound events plus
//! outbound value pushes for one node-owned entity.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use hassflow_domain::discovery::{Ack, EntityUpdate, HubCommand};
use hassflow_domain::entity_ref::EntityRef;
use hassflow_domain::error::{CommandError, FlowError, TransportUnavailable};
use hassflow_domain::event::{ChangeDetector, StateChangePayload, TriggerPayload};
use hassflow_domain::id::{ListenerId, NodeId};

use crate::context::HubContext;
use crate::integration::{Integration, PayloadBuilder, RegistrationState};
use crate::ports::Connection;
use crate::subscription::EntitySubscription;

/// [`Integration`] extended with event subscription and value pushes.
pub struct BidirectionalIntegration<C> {
    integration: Integration<C>,
    subscription: EntitySubscription,
}

impl<C: Connection + 'static> BidirectionalIntegration<C> {
    pub fn new(
        ctx: HubContext<C>,
        node_id: NodeId,
        entity: EntityRef,
        build_payload: PayloadBuilder,
    ) -> Self {
        let subscription =
            EntitySubscription::new(Arc::clone(ctx.bus()), entity, node_id.to_string());
        Self {
            integration: Integration::new(ctx, node_id, build_payload),
            subscription,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        self.subscription.entity()
    }

    #[must_use]
    pub fn integration(&self) -> &Integration<C> {
        &self.integration
    }

    pub fn set_change_detector(&self, detector: ChangeDetector) {
        self.subscription.set_change_detector(detector);
    }

    pub fn on_state_change<F>(&self, owner: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&StateChangePayload) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.subscription.on_state_change(owner, handler)
    }

    pub fn on_trigger<F>(&self, owner: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&TriggerPayload) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.subscription.on_trigger(owner, handler)
    }

    pub fn remove_handler(&self, id: ListenerId) -> bool {
        self.subscription.remove_handler(id)
    }

    /// Start listening for events addressed to the entity. Idempotent.
    pub fn subscribe(&self) -> bool {
        self.subscription.subscribe()
    }

    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_subscribed()
    }

    pub async fn register(&self) -> RegistrationState {
        self.integration.register().await
    }

    pub async fn deregister(&self) -> bool {
        self.integration.deregister().await
    }

    /// Push a new value for the entity to the hub.
    ///
    /// The connection is checked when this is called, not when the returned
    /// future is polled. Local state is never touched. The future owns
    /// everything it needs, so callers may await it, spawn it, or drop it.
    pub fn update_home_assistant(
        &self,
        value: Value,
    ) -> impl Future<Output = Result<Ack, CommandError>> + Send + 'static {
        let connection = Arc::clone(self.integration.context().connection());
        let server_id = self.entity().server_id.clone();
        let node_id = self.integration.node_id().clone();
        let open = connection.is_open();

        async move {
            if !open {
                return Err(TransportUnavailable {
                    server_id: server_id.to_string(),
                }
                .into());
            }
            let update = EntityUpdate::new(server_id, node_id, value);
            connection.send(HubCommand::UpdateEntity(update)).await
        }
    }

    /// Deregister if possible, then drop every subscription.
    pub async fn close(&self) {
        self.integration.deregister().await;
        self.subscription.unsubscribe();
        self.integration.close();
    }
}
