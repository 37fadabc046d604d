//! Persisted node configurations, as handed to node shells at deploy time.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::NodeId;
use crate::output::{OutputProperty, OutputValue};
use crate::zone::ZoneEvent;

/// Configuration of an entity-config node — the owner of an exposed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfigNodeConfig {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    /// Hub component the entity is exposed as.
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Enabled state before the hub has said anything.
    #[serde(default = "default_true")]
    pub initial_state: bool,
}

/// Configuration of a switch node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchNodeConfig {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    /// Id of the entity-config node owning the switch entity.
    pub entity_config: NodeId,
    #[serde(default)]
    pub output_on_state_change: bool,
    #[serde(default = "default_switch_outputs")]
    pub output_properties: Vec<OutputProperty>,
}

/// Configuration of a sentence (voice trigger) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceNodeConfig {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub sentences: Vec<String>,
    #[serde(default = "default_sentence_outputs")]
    pub output_properties: Vec<OutputProperty>,
}

/// Configuration of a zone node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneNodeConfig {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    /// Tracked entities (`person.*`, `device_tracker.*`).
    pub entities: Vec<String>,
    /// Zone entities (`zone.*`).
    pub zones: Vec<String>,
    #[serde(default)]
    pub event: ZoneEvent,
}

/// Any deployable flow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Switch(SwitchNodeConfig),
    Sentence(SentenceNodeConfig),
    Zone(ZoneNodeConfig),
}

impl NodeConfig {
    #[must_use]
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Switch(c) => &c.id,
            Self::Sentence(c) => &c.id,
            Self::Zone(c) => &c.id,
        }
    }

    /// Check the invariants of the wrapped configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Switch(c) => c.validate(),
            Self::Sentence(c) => c.validate(),
            Self::Zone(c) => c.validate(),
        }
    }
}

impl EntityConfigNodeConfig {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyNodeId`] for a blank id.
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.id)
    }
}

impl SwitchNodeConfig {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyNodeId`] for a blank id or
    /// entity-config reference.
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.id)?;
        non_empty(&self.entity_config)
    }
}

impl SentenceNodeConfig {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptySentences`] unless at least one
    /// non-blank sentence is configured.
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.id)?;
        if self.sentences.iter().all(|s| s.trim().is_empty()) {
            return Err(ValidationError::EmptySentences);
        }
        Ok(())
    }
}

impl ZoneNodeConfig {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyZoneSelection`] when no entity or no
    /// zone is configured.
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.id)?;
        if self.entities.is_empty() || self.zones.is_empty() {
            return Err(ValidationError::EmptyZoneSelection);
        }
        Ok(())
    }
}

fn non_empty(id: &NodeId) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyNodeId);
    }
    Ok(())
}

fn default_entity_type() -> String {
    "switch".to_string()
}

fn default_true() -> bool {
    true
}

fn default_switch_outputs() -> Vec<OutputProperty> {
    vec![OutputProperty::new("payload", OutputValue::EntityState)]
}

fn default_sentence_outputs() -> Vec<OutputProperty> {
    vec![
        OutputProperty::new("topic", OutputValue::TriggerId),
        OutputProperty::new("payload", OutputValue::TriggerId),
    ]
}
