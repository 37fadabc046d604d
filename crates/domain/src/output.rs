//! Output-property bindings — how a node maps event data onto its messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::NodeMessage;

/// Source of the value written into one message property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OutputValue {
    /// Static string.
    Str(String),
    /// Static number.
    Num(f64),
    /// Static boolean.
    Bool(bool),
    /// Static JSON value.
    Json(Value),
    /// Copy of a (dotted) path of the incoming message.
    Msg(String),
    /// The entity's current state value.
    EntityState,
    /// The whole entity snapshot.
    Entity,
    /// A (dotted) path of the node's configuration.
    Config(String),
    /// Identifier of what fired the node (e.g. the matched sentence).
    TriggerId,
    /// The raw event that caused the output.
    EventData,
}

/// One `property <- value` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputProperty {
    /// Dotted path of the message property to write.
    pub property: String,
    pub value: OutputValue,
}

impl OutputProperty {
    #[must_use]
    pub fn new(property: impl Into<String>, value: OutputValue) -> Self {
        Self {
            property: property.into(),
            value,
        }
    }
}

/// Values available to bindings when a message is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputContext<'a> {
    pub message: Option<&'a NodeMessage>,
    pub entity_state: Option<&'a Value>,
    pub entity: Option<&'a Value>,
    pub config: Option<&'a Value>,
    pub trigger_id: Option<&'a str>,
    pub event_data: Option<&'a Value>,
}

impl OutputValue {
    /// Resolve against `ctx`; `None` when the context lacks the source.
    #[must_use]
    pub fn resolve(&self, ctx: &OutputContext<'_>) -> Option<Value> {
        match self {
            Self::Str(s) => Some(Value::String(s.clone())),
            Self::Num(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Json(v) => Some(v.clone()),
            Self::Msg(path) => ctx.message.and_then(|m| m.get_path(path)).cloned(),
            Self::EntityState => ctx.entity_state.cloned(),
            Self::Entity => ctx.entity.cloned(),
            Self::Config(path) => ctx
                .config
                .and_then(|c| path.split('.').try_fold(c, |v, part| v.get(part)))
                .cloned(),
            Self::TriggerId => ctx.trigger_id.map(|id| Value::String(id.to_string())),
            Self::EventData => ctx.event_data.cloned(),
        }
    }
}

/// Write every resolvable binding into `message`, in order.
pub fn apply_output_properties(
    properties: &[OutputProperty],
    ctx: &OutputContext<'_>,
    message: &mut NodeMessage,
) {
    for prop in properties {
        if let Some(value) = prop.value.resolve(ctx) {
            message.set_path(&prop.property, value);
        }
    }
}

/// Build a fresh message from bindings.
#[must_use]
pub fn build_message(properties: &[OutputProperty], ctx: &OutputContext<'_>) -> NodeMessage {
    let mut message = NodeMessage::new();
    apply_output_properties(properties, ctx, &mut message);
    message
}
