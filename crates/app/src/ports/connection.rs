//! Connection port — the transport to one hub server.

use std::future::Future;
use std::sync::Arc;

use hassflow_domain::discovery::{Ack, HubCommand};
use hassflow_domain::error::CommandError;
use hassflow_domain::id::ServerId;

/// A live (or temporarily closed) connection to a hub.
///
/// Inbound events do not go through this trait: the transport adapter pushes
/// them into the [`EventBus`](crate::event_bus::EventBus) of the connection.
pub trait Connection: Send + Sync {
    /// Server this connection talks to.
    fn server_id(&self) -> &ServerId;

    /// Whether commands can currently be sent.
    fn is_open(&self) -> bool;

    /// Send a command and wait for the hub's acknowledgement.
    ///
    /// Resolves to [`CommandError::TransportUnavailable`] when the connection
    /// is closed, or [`CommandError::Rejected`] when the hub answers with an
    /// error. Timeouts are the transport's business.
    fn send(&self, command: HubCommand) -> impl Future<Output = Result<Ack, CommandError>> + Send;
}

impl<T: Connection> Connection for Arc<T> {
    fn server_id(&self) -> &ServerId {
        (**self).server_id()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send(&self, command: HubCommand) -> impl Future<Output = Result<Ack, CommandError>> + Send {
        (**self).send(command)
    }
}
