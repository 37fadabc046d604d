//! Switch node — routes flow messages by the enabled state of an exposed
//! switch entity, and lets the flow flip that state.

use std::sync::{Arc, Weak};

use serde_json::{Value, json};

use hassflow_domain::config::SwitchNodeConfig;
use hassflow_domain::error::{CommandError, FlowError};
use hassflow_domain::event::{StateChangePayload, TriggerPayload};
use hassflow_domain::id::{ListenerId, NodeId};
use hassflow_domain::message::NodeMessage;
use hassflow_domain::output::{OutputContext, build_message};

use crate::controller::{ControllerBase, Done};
use crate::nodes::entity_config::EntityConfigNode;
use crate::ports::{Connection, NodeOutput, StatusReporter};

/// Deployed switch node.
pub struct SwitchNode<C> {
    controller: Arc<SwitchController<C>>,
    handlers: Vec<ListenerId>,
}

struct SwitchController<C> {
    base: ControllerBase,
    config: SwitchNodeConfig,
    config_json: Value,
    entity_config: Arc<EntityConfigNode<C>>,
}

impl<C: Connection + 'static> SwitchNode<C> {
    /// Attach a switch to the entity-config owning its entity.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError::Validation`] for an invalid configuration.
    pub fn deploy(
        config: SwitchNodeConfig,
        entity_config: Arc<EntityConfigNode<C>>,
        status: Arc<dyn StatusReporter>,
        output: Arc<dyn NodeOutput>,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let config_json = serde_json::to_value(&config).unwrap_or(Value::Null);
        let controller = Arc::new(SwitchController {
            base: ControllerBase::new(config.id.clone(), status, output),
            config,
            config_json,
            entity_config,
        });

        let integration = controller.entity_config.integration();
        let owner = controller.base.node_id().to_string();

        let weak = Arc::downgrade(&controller);
        let on_state =
            integration.on_state_change(owner.clone(), move |event: &StateChangePayload| {
                with_controller(&weak, |c| c.on_state_change(event))
            });
        let weak = Arc::downgrade(&controller);
        let on_trigger = integration.on_trigger(owner, move |event: &TriggerPayload| {
            with_controller(&weak, |c| c.on_trigger(event))
        });

        Ok(Self {
            controller,
            handlers: vec![on_state, on_trigger],
        })
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.controller.base.node_id()
    }

    /// Handle one input message and complete `done` exactly once.
    pub async fn on_input(&self, message: NodeMessage, done: Done) {
        done.complete(self.handle_input(message).await);
    }

    /// Handle one input message.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::CommandRejected`] if the hub rejected an enable
    /// command. The local state is already updated at that point. Input to a
    /// closed switch is ignored and succeeds.
    pub async fn handle_input(&self, message: NodeMessage) -> Result<(), FlowError> {
        self.controller.handle_input(message).await
    }

    /// Detach from the entity-config and silence the controller.
    pub fn close(&self) {
        self.controller.base.close();
        let integration = self.controller.entity_config.integration();
        for id in &self.handlers {
            integration.remove_handler(*id);
        }
    }
}

impl<C: Connection + 'static> SwitchController<C> {
    async fn handle_input(&self, mut message: NodeMessage) -> Result<(), FlowError> {
        if self.base.is_closed() {
            tracing::debug!(node_id = %self.base.node_id(), "input after close ignored");
            return Ok(());
        }
        if let Some(enable) = enable_flag(&message) {
            return self.enable(enable).await;
        }
        message.insert("outputType", Value::String("input".to_string()));
        self.base.route(self.entity_config.is_enabled(), "input", message);
        Ok(())
    }

    async fn enable(&self, enable: bool) -> Result<(), FlowError> {
        let node_id = self.base.node_id();
        let previous = self.entity_config.set_enabled(enable);
        tracing::debug!(%node_id, previous, enable, "switch state set");

        let push = self
            .entity_config
            .integration()
            .update_home_assistant(Value::Bool(enable));
        match push.await {
            Ok(_) => Ok(()),
            Err(CommandError::TransportUnavailable(err)) => {
                // the next discovery carries the new state
                tracing::debug!(%node_id, error = %err, "hub unreachable, state kept locally");
                Ok(())
            }
            Err(CommandError::Rejected(err)) => {
                tracing::warn!(%node_id, error = %err, "hub rejected switch state");
                Err(err.into())
            }
        }
    }

    fn on_state_change(&self, event: &StateChangePayload) -> Result<(), FlowError> {
        if !event.changed || !self.config.output_on_state_change {
            return Ok(());
        }
        let enabled = self.entity_config.is_enabled();
        let entity_state = Value::Bool(enabled);
        let entity = json!({ "state": enabled });
        let event_data = json!({
            "entity_id": event.entity_id,
            "old_state": event.old_state,
            "new_state": event.new_state,
        });
        let ctx = OutputContext {
            entity_state: Some(&entity_state),
            entity: Some(&entity),
            config: Some(&self.config_json),
            event_data: Some(&event_data),
            ..OutputContext::default()
        };
        let mut message = build_message(&self.config.output_properties, &ctx);
        message.insert("outputType", Value::String("stateChange".to_string()));
        if enabled {
            self.base.send(vec![Some(message), None]);
        } else {
            self.base.send(vec![None, Some(message)]);
        }
        Ok(())
    }

    fn on_trigger(&self, event: &TriggerPayload) -> Result<(), FlowError> {
        let mut message = NodeMessage::with_topic("triggered");
        if let Some(payload) = &event.payload {
            message.insert("payload", payload.clone());
        }
        self.base.route(self.entity_config.is_enabled(), "triggered", message);
        Ok(())
    }
}

fn with_controller<C, F>(weak: &Weak<SwitchController<C>>, f: F) -> Result<(), FlowError>
where
    F: FnOnce(&SwitchController<C>) -> Result<(), FlowError>,
{
    match weak.upgrade() {
        Some(controller) => f(&controller),
        None => Ok(()),
    }
}

/// `enable: bool` or `enable: {value: bool}`.
fn enable_flag(message: &NodeMessage) -> Option<bool> {
    match message.get_path("enable")? {
        Value::Bool(b) => Some(*b),
        Value::Object(obj) => obj.get("value").and_then(Value::as_bool),
        _ => None,
    }
}
