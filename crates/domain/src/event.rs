//! Hub events — what the transport pushes and what controllers consume.
//!
//! Raw events arrive as JSON. Integrations normalize them into
//! [`StateChangePayload`] and [`TriggerPayload`] before any controller sees
//! them; a payload that does not fit its kind is a [`MalformedEventError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity_ref::EntityRef;
use crate::error::MalformedEventError;

/// Category of an event flowing through the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged,
    AutomationTriggered,
    ConnectionOpened,
    ConnectionClosed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChanged => f.write_str("state_changed"),
            Self::AutomationTriggered => f.write_str("automation_triggered"),
            Self::ConnectionOpened => f.write_str("connection_opened"),
            Self::ConnectionClosed => f.write_str("connection_closed"),
        }
    }
}

/// What an event is addressed to.
///
/// The bus is scoped to one connection, so connection lifecycle events need
/// no further qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Entity(EntityRef),
    Connection,
}

impl From<EntityRef> for Topic {
    fn from(value: EntityRef) -> Self {
        Self::Entity(value)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(entity) => entity.fmt(f),
            Self::Connection => f.write_str("connection"),
        }
    }
}

/// Decides whether a state transition is worth reporting.
pub type ChangeDetector = fn(Option<&Value>, Option<&Value>) -> bool;

/// Default [`ChangeDetector`]: compares only the `state` field of both
/// snapshots, ignoring attributes and timestamps.
#[must_use]
pub fn state_field_changed(old: Option<&Value>, new: Option<&Value>) -> bool {
    let old = old.and_then(|s| s.get("state"));
    let new = new.and_then(|s| s.get("state"));
    old != new
}

/// Normalized state-change notification for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangePayload {
    pub entity_id: String,
    pub old_state: Option<Value>,
    pub new_state: Option<Value>,
    pub changed: bool,
}

impl StateChangePayload {
    /// Normalize a raw `state_changed` event addressed to `expected`.
    ///
    /// # Errors
    ///
    /// Returns a [`MalformedEventError`] when `entity_id` is missing, does not
    /// match `expected`, or a state snapshot is neither an object nor null.
    pub fn from_raw(
        raw: &Value,
        expected: &str,
        detector: ChangeDetector,
    ) -> Result<Self, MalformedEventError> {
        let kind = EventKind::StateChanged;
        let entity_id = entity_id_of(raw, kind, expected)?;
        let old_state = snapshot(raw, kind, "old_state")?;
        let new_state = snapshot(raw, kind, "new_state")?;
        let changed = detector(old_state.as_ref(), new_state.as_ref());
        Ok(Self {
            entity_id,
            old_state,
            new_state,
            changed,
        })
    }

    /// The `state` field of the new snapshot, if any.
    #[must_use]
    pub fn new_state_value(&self) -> Option<&Value> {
        self.new_state.as_ref().and_then(|s| s.get("state"))
    }

    /// An attribute of the new snapshot, if any.
    #[must_use]
    pub fn new_attribute(&self, name: &str) -> Option<&Value> {
        self.new_state
            .as_ref()
            .and_then(|s| s.get("attributes"))
            .and_then(|a| a.get(name))
    }

    /// An attribute of the old snapshot, if any.
    #[must_use]
    pub fn old_attribute(&self, name: &str) -> Option<&Value> {
        self.old_state
            .as_ref()
            .and_then(|s| s.get("attributes"))
            .and_then(|a| a.get(name))
    }
}

/// Normalized one-shot trigger occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub entity_id: String,
    pub payload: Option<Value>,
}

impl TriggerPayload {
    /// Normalize a raw `automation_triggered` event addressed to `expected`.
    ///
    /// # Errors
    ///
    /// Returns a [`MalformedEventError`] when `entity_id` is missing or does
    /// not match `expected`.
    pub fn from_raw(raw: &Value, expected: &str) -> Result<Self, MalformedEventError> {
        let entity_id = entity_id_of(raw, EventKind::AutomationTriggered, expected)?;
        let payload = raw.get("payload").filter(|v| !v.is_null()).cloned();
        Ok(Self { entity_id, payload })
    }
}

fn entity_id_of(
    raw: &Value,
    kind: EventKind,
    expected: &str,
) -> Result<String, MalformedEventError> {
    let entity_id = raw
        .get("entity_id")
        .ok_or(MalformedEventError::MissingField {
            kind,
            field: "entity_id",
        })?
        .as_str()
        .ok_or(MalformedEventError::InvalidField {
            kind,
            field: "entity_id",
        })?;
    if entity_id != expected {
        return Err(MalformedEventError::EntityMismatch {
            kind,
            expected: expected.to_string(),
            actual: entity_id.to_string(),
        });
    }
    Ok(entity_id.to_string())
}

fn snapshot(
    raw: &Value,
    kind: EventKind,
    field: &'static str,
) -> Result<Option<Value>, MalformedEventError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
        Some(_) => Err(MalformedEventError::InvalidField { kind, field }),
    }
}
