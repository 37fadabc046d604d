//! Flow messages — open string-keyed maps exchanged between nodes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message travelling through the flow graph.
///
/// Only `topic` and `payload` are conventional; any other key is allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeMessage(Map<String, Value>);

/// One optional message per output slot, in output order.
pub type Outputs = Vec<Option<NodeMessage>>;

impl NodeMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A message with only `topic` set.
    #[must_use]
    pub fn with_topic(topic: impl Into<String>) -> Self {
        let mut msg = Self::new();
        msg.insert("topic", Value::String(topic.into()));
        msg
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.0.get("topic").and_then(Value::as_str)
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.0.get("payload")
    }

    /// Set a top-level key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Read a dotted path such as `data.new_state.state`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Write a dotted path, creating (or replacing non-object) intermediate
    /// levels as objects.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut current = &mut self.0;
        for part in parts {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert(last.to_string(), value);
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for NodeMessage {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Convert a JSON value into a message; non-objects become `{payload: value}`.
impl From<Value> for NodeMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut msg = Self::new();
                msg.insert("payload", other);
                msg
            }
        }
    }
}
