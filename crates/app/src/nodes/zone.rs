//! Zone node — reports tracked entities entering or leaving zones.
//!
//! Zone geometry is learned from state changes of the configured `zone.*`
//! entities; transitions are computed on state changes of the tracked
//! entities once both the old and new locations are known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use hassflow_domain::config::ZoneNodeConfig;
use hassflow_domain::error::FlowError;
use hassflow_domain::event::StateChangePayload;
use hassflow_domain::id::NodeId;
use hassflow_domain::message::NodeMessage;
use hassflow_domain::zone::{Location, Zone, transition};

use crate::context::HubContext;
use crate::controller::ControllerBase;
use crate::ports::{Connection, NodeOutput, StatusReporter};
use crate::subscription::EntitySubscription;

/// Deployed zone node.
pub struct ZoneNode {
    controller: Arc<ZoneController>,
    subscriptions: Vec<EntitySubscription>,
}

struct ZoneController {
    base: ControllerBase,
    config: ZoneNodeConfig,
    zones: Mutex<HashMap<String, Zone>>,
}

impl ZoneNode {
    /// Subscribe to every configured zone and tracked entity.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError::Validation`] for an invalid configuration or a
    /// blank entity id.
    pub fn deploy<C: Connection>(
        config: ZoneNodeConfig,
        ctx: &HubContext<C>,
        status: Arc<dyn StatusReporter>,
        output: Arc<dyn NodeOutput>,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let owner = config.id.to_string();
        let controller = Arc::new(ZoneController {
            base: ControllerBase::new(config.id.clone(), status, output),
            config,
            zones: Mutex::new(HashMap::new()),
        });

        let mut subscriptions = Vec::new();
        for zone_id in &controller.config.zones {
            let entity = ctx.entity_ref(zone_id.as_str())?;
            let sub = EntitySubscription::new(Arc::clone(ctx.bus()), entity, owner.clone());
            let weak = Arc::downgrade(&controller);
            sub.on_state_change(owner.clone(), move |event: &StateChangePayload| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_zone_change(event);
                }
                Ok(())
            });
            subscriptions.push(sub);
        }
        for entity_id in &controller.config.entities {
            let entity = ctx.entity_ref(entity_id.as_str())?;
            let sub = EntitySubscription::new(Arc::clone(ctx.bus()), entity, owner.clone());
            let weak = Arc::downgrade(&controller);
            sub.on_state_change(owner.clone(), move |event: &StateChangePayload| {
                match weak.upgrade() {
                    Some(controller) => controller.on_tracked_change(event),
                    None => Ok(()),
                }
            });
            subscriptions.push(sub);
        }
        for sub in &subscriptions {
            sub.subscribe();
        }

        Ok(Self {
            controller,
            subscriptions,
        })
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.controller.base.node_id()
    }

    /// Seed or replace the geometry of a zone.
    pub fn learn_zone(&self, zone: Zone) {
        self.controller.lock_zones().insert(zone.entity_id.clone(), zone);
    }

    #[must_use]
    pub fn zone(&self, entity_id: &str) -> Option<Zone> {
        self.controller.lock_zones().get(entity_id).cloned()
    }

    pub fn close(&self) {
        self.controller.base.close();
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

impl ZoneController {
    fn on_zone_change(&self, event: &StateChangePayload) {
        let Some(snapshot) = &event.new_state else {
            return;
        };
        match Zone::from_snapshot(&event.entity_id, snapshot) {
            Some(zone) => {
                tracing::debug!(
                    node_id = %self.base.node_id(),
                    zone = %zone.entity_id,
                    radius = zone.radius,
                    "zone updated"
                );
                self.lock_zones().insert(event.entity_id.clone(), zone);
            }
            None => {
                tracing::debug!(
                    node_id = %self.base.node_id(),
                    zone = %event.entity_id,
                    "zone state without geometry"
                );
            }
        }
    }

    fn on_tracked_change(&self, event: &StateChangePayload) -> Result<(), FlowError> {
        let old = event.old_state.as_ref().and_then(Location::from_snapshot);
        let new = event.new_state.as_ref().and_then(Location::from_snapshot);
        let (Some(old), Some(new)) = (old, new) else {
            return Ok(());
        };

        let crossings: Vec<(String, _)> = {
            let zones = self.lock_zones();
            self.config
                .zones
                .iter()
                .filter_map(|id| zones.get(id))
                .filter_map(|zone| {
                    transition(zone, &old, &new).map(|t| (zone.entity_id.clone(), t))
                })
                .filter(|(_, t)| self.config.event.accepts(*t))
                .collect()
        };

        for (zone_id, crossing) in crossings {
            let mut message = NodeMessage::with_topic(event.entity_id.clone());
            message.insert(
                "payload",
                event.new_state_value().cloned().unwrap_or(Value::Null),
            );
            message.insert(
                "data",
                json!({
                    "entity_id": event.entity_id,
                    "old_state": event.old_state,
                    "new_state": event.new_state,
                }),
            );
            message.insert("zone", Value::String(zone_id.clone()));
            message.insert("event", Value::String(crossing.to_string()));
            self.base.send_single(message);
            self.base.set_success(&format!("{} {crossing} {zone_id}", event.entity_id));
        }
        Ok(())
    }

    fn lock_zones(&self) -> MutexGuard<'_, HashMap<String, Zone>> {
        self.zones.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
