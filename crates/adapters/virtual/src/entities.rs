//! Entity store — state snapshots kept by the virtual hub.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

/// Hub-side state of every known entity, as `{state, attributes}` snapshots.
#[derive(Debug, Default)]
pub(crate) struct EntityStore {
    snapshots: HashMap<String, Value>,
}

impl EntityStore {
    pub(crate) fn get(&self, entity_id: &str) -> Option<&Value> {
        self.snapshots.get(entity_id)
    }

    /// Store `snapshot` and return the one it replaced.
    pub(crate) fn replace(&mut self, entity_id: &str, snapshot: Value) -> Option<Value> {
        self.snapshots.insert(entity_id.to_string(), snapshot)
    }

    pub(crate) fn remove(&mut self, entity_id: &str) -> Option<Value> {
        self.snapshots.remove(entity_id)
    }
}

/// Snapshot the hub keeps for a node-owned entity.
///
/// Booleans are stored the way the hub reports switches: `"on"` / `"off"`.
pub(crate) fn snapshot(state: &Value, attributes: &Map<String, Value>) -> Value {
    let state = match state {
        Value::Bool(true) => Value::String("on".to_string()),
        Value::Bool(false) => Value::String("off".to_string()),
        other => other.clone(),
    };
    json!({ "state": state, "attributes": attributes })
}
