//! Channel-backed output sink handing node emissions to the host runtime.

use tokio::sync::mpsc;

use hassflow_domain::id::NodeId;
use hassflow_domain::message::Outputs;

use crate::ports::NodeOutput;

/// One emission of one node.
pub type Emission = (NodeId, Outputs);

/// [`NodeOutput`] forwarding every emission, tagged with the node id, into
/// an unbounded channel shared by all nodes of a flow.
#[derive(Clone)]
pub struct ChannelOutput {
    node_id: NodeId,
    sender: mpsc::UnboundedSender<Emission>,
}

impl ChannelOutput {
    #[must_use]
    pub fn new(node_id: NodeId, sender: mpsc::UnboundedSender<Emission>) -> Self {
        Self { node_id, sender }
    }
}

impl NodeOutput for ChannelOutput {
    fn send(&self, outputs: Outputs) {
        if self.sender.send((self.node_id.clone(), outputs)).is_err() {
            tracing::debug!(node_id = %self.node_id, "output receiver gone, dropping emission");
        }
    }
}
