//! Entity-config node — owner of an exposed entity and its enabled state.
//!
//! Switch controllers never own state themselves: they share the
//! [`EnabledState`] of the entity-config they reference, and push changes
//! through its bidirectional integration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};

use hassflow_domain::config::EntityConfigNodeConfig;
use hassflow_domain::discovery::DiscoveryPayload;
use hassflow_domain::error::FlowError;
use hassflow_domain::event::StateChangePayload;
use hassflow_domain::id::ServerId;

use crate::bidirectional::BidirectionalIntegration;
use crate::context::HubContext;
use crate::integration::PayloadBuilder;
use crate::ports::Connection;

/// Local enabled state of an exposed switch entity.
#[derive(Debug)]
pub struct EnabledState(AtomicBool);

impl EnabledState {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    #[must_use]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Store `enabled` and return the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        self.0.swap(enabled, Ordering::SeqCst)
    }
}

/// Deployed entity-config node.
pub struct EntityConfigNode<C> {
    config: EntityConfigNodeConfig,
    enabled: Arc<EnabledState>,
    integration: BidirectionalIntegration<C>,
}

impl<C: Connection + 'static> EntityConfigNode<C> {
    /// Validate the configuration, start adopting hub-side state changes and
    /// register the entity.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError::Validation`] for an invalid configuration.
    /// Registration problems are not errors; see
    /// [`Integration::register`](crate::integration::Integration::register).
    pub async fn deploy(
        config: EntityConfigNodeConfig,
        ctx: HubContext<C>,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let entity = ctx.entity_ref(config.id.as_str())?;
        let enabled = Arc::new(EnabledState::new(config.initial_state));

        let builder = discovery_builder(&config, ctx.server_id().clone(), Arc::clone(&enabled));
        let integration = BidirectionalIntegration::new(ctx, config.id.clone(), entity, builder);

        // registered before any switch handler, so switches see the adopted state
        let state = Arc::clone(&enabled);
        let node_id = config.id.clone();
        integration.on_state_change(config.id.to_string(), move |event: &StateChangePayload| {
            let Some(value) = event.new_state_value().and_then(parse_enabled) else {
                return Ok(());
            };
            let previous = state.set(value);
            if previous != value {
                tracing::debug!(node_id = %node_id, enabled = value, "adopted hub state");
            }
            Ok(())
        });
        integration.subscribe();
        integration.register().await;

        Ok(Self {
            config,
            enabled,
            integration,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EntityConfigNodeConfig {
        &self.config
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Set the local enabled state and return the previous value.
    ///
    /// Nothing is sent to the hub; see
    /// [`BidirectionalIntegration::update_home_assistant`].
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.set(enabled)
    }

    #[must_use]
    pub fn integration(&self) -> &BidirectionalIntegration<C> {
        &self.integration
    }

    pub async fn close(&self) {
        self.integration.close().await;
    }
}

fn discovery_builder(
    config: &EntityConfigNodeConfig,
    server_id: ServerId,
    enabled: Arc<EnabledState>,
) -> PayloadBuilder {
    let node_id = config.id.clone();
    let component = config.entity_type.clone();
    let mut display = Map::new();
    if !config.name.is_empty() {
        display.insert("name".to_string(), Value::String(config.name.clone()));
    }
    if let Some(icon) = &config.icon {
        display.insert("icon".to_string(), Value::String(icon.clone()));
    }
    Arc::new(move || DiscoveryPayload::Entity {
        server_id: server_id.clone(),
        node_id: node_id.clone(),
        component: component.clone(),
        config: display.clone(),
        state: enabled.get(),
    })
}

/// Read a switch state as pushed by the hub.
#[must_use]
pub fn parse_enabled(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "on" | "true" => Some(true),
            "off" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
