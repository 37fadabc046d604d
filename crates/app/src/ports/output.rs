//! Output port — how a node hands messages back to the flow runtime.

use hassflow_domain::message::Outputs;

/// Message-emission primitive of the host runtime for one node.
pub trait NodeOutput: Send + Sync {
    /// Emit one optional message per output slot, in slot order.
    fn send(&self, outputs: Outputs);
}
