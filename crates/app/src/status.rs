//! In-process status reporter keeping the last write of one node.

use std::sync::{Mutex, MutexGuard, PoisonError};

use hassflow_domain::id::NodeId;
use hassflow_domain::status::{StatusKind, StatusSnapshot};

use crate::ports::StatusReporter;

/// Last-write-wins status of one node, mirrored into the logs.
pub struct NodeStatus {
    node_id: NodeId,
    last: Mutex<Option<StatusSnapshot>>,
}

impl NodeStatus {
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            last: Mutex::new(None),
        }
    }

    /// The last status written, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.lock().clone()
    }

    fn write(&self, kind: StatusKind, label: &str) {
        let snapshot = StatusSnapshot::now(kind, label);
        tracing::debug!(
            node_id = %self.node_id,
            ?kind,
            status = %snapshot.text(),
            "status updated"
        );
        *self.lock() = Some(snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, Option<StatusSnapshot>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusReporter for NodeStatus {
    fn set_success(&self, label: &str) {
        self.write(StatusKind::Success, label);
    }

    fn set_failed(&self, label: &str) {
        self.write(StatusKind::Failed, label);
    }
}
