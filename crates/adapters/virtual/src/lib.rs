//! # hassflow-adapter-virtual
//!
//! In-process hub that implements the [`Connection`] port without any IO.
//!
//! ## Behaviour
//!
//! | Command | Effect |
//! |---------|--------|
//! | discovery | upserts the registration keyed on `(server_id, node_id)`; entity discoveries also set the entity state |
//! | removal | drops the registration and its entity state |
//! | entity update | stores the new state of a registered entity, without echoing a state change |
//!
//! Raw hub events (`state_changed`, `automation_triggered`, connection
//! lifecycle) are injected into the [`EventBus`] of the connection.
//!
//! ## Dependency rule
//!
//! Depends on `hassflow-app` (port traits) and `hassflow-domain` only.

mod entities;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};

use hassflow_app::event_bus::EventBus;
use hassflow_app::ports::Connection;
use hassflow_domain::discovery::{Ack, DiscoveryPayload, HubCommand};
use hassflow_domain::entity_ref::EntityRef;
use hassflow_domain::error::{
    CommandError, CommandRejected, TransportUnavailable, ValidationError,
};
use hassflow_domain::event::{EventKind, Topic};
use hassflow_domain::id::{NodeId, ServerId};

use entities::{EntityStore, snapshot};

/// Simulated hub server.
pub struct VirtualHub {
    server_id: ServerId,
    bus: Arc<EventBus>,
    open: AtomicBool,
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    registrations: HashMap<(ServerId, NodeId), DiscoveryPayload>,
    entities: EntityStore,
    rejections: Vec<CommandRejected>,
    commands: Vec<HubCommand>,
}

impl VirtualHub {
    /// A closed hub named `server_id`, publishing into `bus`.
    #[must_use]
    pub fn new(server_id: impl Into<ServerId>, bus: Arc<EventBus>) -> Self {
        Self {
            server_id: server_id.into(),
            bus,
            open: AtomicBool::new(false),
            state: Mutex::new(HubState::default()),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Open the connection and announce it on the bus.
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            tracing::info!(server_id = %self.server_id, "virtual hub connected");
            self.bus
                .emit(EventKind::ConnectionOpened, &Topic::Connection, &Value::Null);
        }
    }

    /// Close the connection and announce it on the bus.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::info!(server_id = %self.server_id, "virtual hub disconnected");
            self.bus
                .emit(EventKind::ConnectionClosed, &Topic::Connection, &Value::Null);
        }
    }

    /// Reject the next command with the given error reply.
    pub fn reject_next(&self, code: &str, message: &str) {
        self.lock().rejections.push(CommandRejected {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    #[must_use]
    pub fn registration(&self, node_id: &NodeId) -> Option<DiscoveryPayload> {
        self.lock()
            .registrations
            .get(&(self.server_id.clone(), node_id.clone()))
            .cloned()
    }

    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Current hub-side snapshot of `entity_id`.
    #[must_use]
    pub fn entity_state(&self, entity_id: &str) -> Option<Value> {
        self.lock().entities.get(entity_id).cloned()
    }

    /// Every command accepted so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<HubCommand> {
        self.lock().commands.clone()
    }

    /// Change an entity on the hub side and emit the matching
    /// `state_changed` event. Returns the number of subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank entity id.
    pub fn set_state(&self, entity_id: &str, new_state: Value) -> Result<usize, ValidationError> {
        let entity = EntityRef::new(self.server_id.clone(), entity_id)?;
        let old_state = self.lock().entities.replace(entity_id, new_state.clone());
        let event = json!({
            "entity_id": entity_id,
            "old_state": old_state,
            "new_state": new_state,
        });
        Ok(self.bus.emit(EventKind::StateChanged, &Topic::Entity(entity), &event))
    }

    /// Fire the trigger of `entity_id`, e.g. a matched voice sentence.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank entity id.
    pub fn fire_trigger(
        &self,
        entity_id: &str,
        payload: Option<Value>,
    ) -> Result<usize, ValidationError> {
        let entity = EntityRef::new(self.server_id.clone(), entity_id)?;
        let event = json!({ "entity_id": entity_id, "payload": payload });
        Ok(self
            .bus
            .emit(EventKind::AutomationTriggered, &Topic::Entity(entity), &event))
    }

    fn apply(&self, command: HubCommand) -> Result<Ack, CommandError> {
        if !self.is_open() {
            return Err(TransportUnavailable {
                server_id: self.server_id.to_string(),
            }
            .into());
        }
        let mut state = self.lock();
        if !state.rejections.is_empty() {
            let rejection = state.rejections.remove(0);
            tracing::debug!(code = %rejection.code, "virtual hub rejecting command");
            return Err(rejection.into());
        }
        if command.server_id() != &self.server_id {
            return Err(CommandRejected {
                code: "unknown_server".to_string(),
                message: format!("server {} is not {}", command.server_id(), self.server_id),
            }
            .into());
        }

        match &command {
            HubCommand::Discover(payload) => {
                if let DiscoveryPayload::Entity { node_id, state: on, .. } = payload {
                    state
                        .entities
                        .replace(node_id.as_str(), snapshot(&Value::Bool(*on), &Map::new()));
                }
                let key = (payload.server_id().clone(), payload.node_id().clone());
                let replaced = state.registrations.insert(key, payload.clone()).is_some();
                tracing::debug!(node_id = %payload.node_id(), replaced, "registration stored");
            }
            HubCommand::Remove(removal) => {
                let key = (removal.server_id.clone(), removal.node_id.clone());
                state.registrations.remove(&key);
                state.entities.remove(removal.node_id.as_str());
                tracing::debug!(node_id = %removal.node_id, "registration removed");
            }
            HubCommand::UpdateEntity(update) => {
                let key = (update.server_id.clone(), update.node_id.clone());
                if !state.registrations.contains_key(&key) {
                    return Err(CommandRejected {
                        code: "not_found".to_string(),
                        message: format!("entity {} is not registered", update.node_id),
                    }
                    .into());
                }
                state.entities.replace(
                    update.node_id.as_str(),
                    snapshot(&update.state, &update.attributes),
                );
            }
        }
        state.commands.push(command);
        Ok(Ack::default())
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connection for VirtualHub {
    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, command: HubCommand) -> impl Future<Output = Result<Ack, CommandError>> + Send {
        let result = self.apply(command);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hassflow_domain::discovery::{EntityUpdate, Removal};

    fn hub() -> VirtualHub {
        let hub = VirtualHub::new("home", Arc::new(EventBus::new()));
        hub.open();
        hub
    }

    fn switch_discovery(node: &str, on: bool) -> DiscoveryPayload {
        DiscoveryPayload::Entity {
            server_id: ServerId::new("home"),
            node_id: NodeId::new(node),
            component: "switch".to_string(),
            config: Map::new(),
            state: on,
        }
    }

    #[tokio::test]
    async fn should_upsert_registrations() {
        let hub = hub();

        hub.send(HubCommand::Discover(switch_discovery("cfg1", true)))
            .await
            .unwrap();
        hub.send(HubCommand::Discover(switch_discovery("cfg1", false)))
            .await
            .unwrap();

        assert_eq!(hub.registration_count(), 1);
        assert_eq!(hub.entity_state("cfg1").unwrap()["state"], json!("off"));
    }

    #[tokio::test]
    async fn should_refuse_commands_when_closed() {
        let hub = VirtualHub::new("home", Arc::new(EventBus::new()));

        let result = hub
            .send(HubCommand::Discover(switch_discovery("cfg1", true)))
            .await;

        assert!(matches!(result, Err(CommandError::TransportUnavailable(_))));
        assert_eq!(hub.registration_count(), 0);
    }

    #[tokio::test]
    async fn should_reject_scripted_command_once() {
        let hub = hub();
        hub.reject_next("invalid_format", "bad payload");

        let first = hub
            .send(HubCommand::Discover(switch_discovery("cfg1", true)))
            .await;
        let second = hub
            .send(HubCommand::Discover(switch_discovery("cfg1", true)))
            .await;

        assert!(matches!(first, Err(CommandError::Rejected(_))));
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn should_reject_update_of_unregistered_entity() {
        let hub = hub();
        let update = EntityUpdate::new(ServerId::new("home"), NodeId::new("cfg1"), json!(true));

        let result = hub.send(HubCommand::UpdateEntity(update)).await;

        assert!(matches!(result, Err(CommandError::Rejected(_))));
    }

    #[tokio::test]
    async fn should_store_update_without_echo() {
        let hub = hub();
        hub.send(HubCommand::Discover(switch_discovery("cfg1", true)))
            .await
            .unwrap();
        let update = EntityUpdate::new(ServerId::new("home"), NodeId::new("cfg1"), json!(false));

        hub.send(HubCommand::UpdateEntity(update)).await.unwrap();

        assert_eq!(hub.entity_state("cfg1").unwrap()["state"], json!("off"));
    }

    #[tokio::test]
    async fn should_drop_registration_on_removal() {
        let hub = hub();
        let payload = switch_discovery("cfg1", true);
        hub.send(HubCommand::Discover(payload.clone())).await.unwrap();

        hub.send(HubCommand::Remove(Removal::of(&payload)))
            .await
            .unwrap();

        assert_eq!(hub.registration_count(), 0);
        assert!(hub.entity_state("cfg1").is_none());
    }

    #[tokio::test]
    async fn should_reject_commands_for_other_servers() {
        let hub = hub();
        let payload = DiscoveryPayload::SentenceTrigger {
            server_id: ServerId::new("cabin"),
            node_id: NodeId::new("s1"),
            sentences: vec!["hi".to_string()],
        };

        let result = hub.send(HubCommand::Discover(payload)).await;

        assert!(matches!(result, Err(CommandError::Rejected(_))));
    }

    #[test]
    fn should_emit_connection_lifecycle_once() {
        let bus = Arc::new(EventBus::new());
        let hub = VirtualHub::new("home", Arc::clone(&bus));
        let opened = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&opened);
        let _handle = bus.on(EventKind::ConnectionOpened, Topic::Connection, "test", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        hub.open();
        hub.open();

        assert!(hub.is_open());
        assert_eq!(*opened.lock().unwrap(), 1);
    }

    #[test]
    fn should_emit_state_change_with_previous_snapshot() {
        let bus = Arc::new(EventBus::new());
        let hub = VirtualHub::new("home", Arc::clone(&bus));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let entity = EntityRef::new("home", "person.alice").unwrap();
        let _handle = bus.on(EventKind::StateChanged, entity, "test", move |raw: &Value| {
            sink.lock().unwrap().push(raw.clone());
            Ok(())
        });

        hub.set_state("person.alice", json!({"state": "home"})).unwrap();
        hub.set_state("person.alice", json!({"state": "away"})).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0]["old_state"], Value::Null);
        assert_eq!(events[1]["old_state"], json!({"state": "home"}));
        assert_eq!(events[1]["new_state"], json!({"state": "away"}));
    }

    #[test]
    fn should_reject_blank_trigger_entity() {
        let hub = hub();
        assert_eq!(
            hub.fire_trigger(" ", None),
            Err(ValidationError::EmptyEntityId)
        );
    }
}
