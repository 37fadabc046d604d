//! Discovery payloads and the commands sent to the hub.
//!
//! A [`DiscoveryPayload`] is a value: it is rebuilt from node state on every
//! (re)registration and never mutated afterwards. The hub upserts
//! registrations on `(server_id, node_id)`, so sending the same payload twice
//! is harmless.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{NodeId, ServerId};

/// Wire tag identifying a hub message family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "nodered/discovery")]
    Discovery,
    #[serde(rename = "nodered/entity")]
    Entity,
    #[serde(rename = "nodered/sentence")]
    SentenceTrigger,
}

impl MessageType {
    /// The wire representation of the tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "nodered/discovery",
            Self::Entity => "nodered/entity",
            Self::SentenceTrigger => "nodered/sentence",
        }
    }
}

/// Registration announcement, one variant per node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiscoveryPayload {
    /// Exposes a node-owned entity (e.g. a switch) on the hub.
    #[serde(rename = "nodered/discovery")]
    Entity {
        server_id: ServerId,
        node_id: NodeId,
        component: String,
        config: Map<String, Value>,
        state: bool,
    },
    /// Registers a set of voice sentences that fire a trigger.
    #[serde(rename = "nodered/sentence")]
    SentenceTrigger {
        server_id: ServerId,
        node_id: NodeId,
        sentences: Vec<String>,
    },
}

impl DiscoveryPayload {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Entity { .. } => MessageType::Discovery,
            Self::SentenceTrigger { .. } => MessageType::SentenceTrigger,
        }
    }

    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        match self {
            Self::Entity { server_id, .. } | Self::SentenceTrigger { server_id, .. } => server_id,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Entity { node_id, .. } | Self::SentenceTrigger { node_id, .. } => node_id,
        }
    }
}

/// Explicit removal of a registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removal {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub server_id: ServerId,
    pub node_id: NodeId,
    pub remove: bool,
}

impl Removal {
    /// Build the removal message matching a registration.
    #[must_use]
    pub fn of(payload: &DiscoveryPayload) -> Self {
        Self {
            message_type: payload.message_type(),
            server_id: payload.server_id().clone(),
            node_id: payload.node_id().clone(),
            remove: true,
        }
    }
}

/// Push of a new value for a node-owned entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityUpdate {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub server_id: ServerId,
    pub node_id: NodeId,
    pub state: Value,
    pub attributes: Map<String, Value>,
}

impl EntityUpdate {
    #[must_use]
    pub fn new(server_id: ServerId, node_id: NodeId, state: Value) -> Self {
        Self {
            message_type: MessageType::Entity,
            server_id,
            node_id,
            state,
            attributes: Map::new(),
        }
    }
}

/// Every command the core sends over the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HubCommand {
    Discover(DiscoveryPayload),
    Remove(Removal),
    UpdateEntity(EntityUpdate),
}

impl HubCommand {
    /// Server the command is addressed to.
    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        match self {
            Self::Discover(p) => p.server_id(),
            Self::Remove(r) => &r.server_id,
            Self::UpdateEntity(u) => &u.server_id,
        }
    }
}

/// Transport-level acknowledgement of a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub result: Value,
}
