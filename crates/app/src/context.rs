//! Hub context — the connection and bus every node of one server shares.

use std::sync::Arc;

use hassflow_domain::entity_ref::EntityRef;
use hassflow_domain::error::ValidationError;
use hassflow_domain::id::ServerId;

use crate::event_bus::EventBus;
use crate::ports::Connection;

/// Explicit dependency passed to every integration and node shell.
///
/// Cheap to clone; the bus lives as long as the connection it belongs to.
pub struct HubContext<C> {
    connection: Arc<C>,
    bus: Arc<EventBus>,
}

impl<C> Clone for HubContext<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<C: Connection> HubContext<C> {
    pub fn new(connection: Arc<C>, bus: Arc<EventBus>) -> Self {
        Self { connection, bus }
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        self.connection.server_id()
    }

    /// Reference to `entity_id` on this context's server.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the server or entity id is blank.
    pub fn entity_ref(&self, entity_id: impl Into<String>) -> Result<EntityRef, ValidationError> {
        EntityRef::new(self.server_id().clone(), entity_id)
    }
}
