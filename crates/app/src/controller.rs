//! Controller base — shared input routing, status writes and completion.
//!
//! Every node controller owns a [`ControllerBase`]. Once the base is closed,
//! it neither emits nor writes status, so late hub results and late events
//! have no observable effect after teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hassflow_domain::error::FlowError;
use hassflow_domain::id::NodeId;
use hassflow_domain::message::{NodeMessage, Outputs};
use tokio::sync::oneshot;

use crate::ports::{NodeOutput, StatusReporter};

type DoneCallback = Box<dyn FnOnce(Result<(), FlowError>) + Send>;

/// Completion of one input message.
///
/// Consumed by [`Done::complete`], so it fires at most once. If it is
/// dropped without being completed, it completes successfully and logs.
#[must_use = "the input must be completed"]
pub struct Done {
    node_id: NodeId,
    callback: Option<DoneCallback>,
}

impl Done {
    pub fn new<F>(node_id: NodeId, callback: F) -> Self
    where
        F: FnOnce(Result<(), FlowError>) + Send + 'static,
    {
        Self {
            node_id,
            callback: Some(Box::new(callback)),
        }
    }

    /// A completion whose result is delivered through a oneshot channel.
    pub fn channel(node_id: NodeId) -> (Self, oneshot::Receiver<Result<(), FlowError>>) {
        let (tx, rx) = oneshot::channel();
        let done = Self::new(node_id, move |result| {
            // receiver gone means nobody waits for the result
            let _ = tx.send(result);
        });
        (done, rx)
    }

    /// A completion that only logs failures.
    pub fn logged(node_id: NodeId) -> Self {
        let id = node_id.clone();
        Self::new(node_id, move |result| {
            if let Err(err) = result {
                tracing::warn!(node_id = %id, error = %err, "input failed");
            }
        })
    }

    pub fn complete(mut self, result: Result<(), FlowError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!(node_id = %self.node_id, "input dropped without completion");
            callback(Ok(()));
        }
    }
}

/// Output, status and teardown state shared by every controller.
pub struct ControllerBase {
    node_id: NodeId,
    status: Arc<dyn StatusReporter>,
    output: Arc<dyn NodeOutput>,
    closed: AtomicBool,
}

impl ControllerBase {
    pub fn new(
        node_id: NodeId,
        status: Arc<dyn StatusReporter>,
        output: Arc<dyn NodeOutput>,
    ) -> Self {
        Self {
            node_id,
            status,
            output,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop every further emission and status write.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Emit one optional message per output slot.
    pub fn send(&self, outputs: Outputs) {
        if self.is_closed() {
            tracing::debug!(node_id = %self.node_id, "closed, dropping output");
            return;
        }
        self.output.send(outputs);
    }

    /// Emit on a single-output node.
    pub fn send_single(&self, message: NodeMessage) {
        self.send(vec![Some(message)]);
    }

    /// Two-output routing: `[msg, null]` when enabled, `[null, msg]`
    /// otherwise, with the matching status.
    pub fn route(&self, enabled: bool, label: &str, message: NodeMessage) {
        if self.is_closed() {
            tracing::debug!(node_id = %self.node_id, "closed, dropping routed message");
            return;
        }
        if enabled {
            self.status.set_success(label);
            self.output.send(vec![Some(message), None]);
        } else {
            self.status.set_failed(label);
            self.output.send(vec![None, Some(message)]);
        }
    }

    pub fn set_success(&self, label: &str) {
        if !self.is_closed() {
            self.status.set_success(label);
        }
    }

    pub fn set_failed(&self, label: &str) {
        if !self.is_closed() {
            self.status.set_failed(label);
        }
    }
}
