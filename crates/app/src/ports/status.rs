//! Status port — the indicator shown next to a node.

/// Last-write-wins status indicator of one node.
pub trait StatusReporter: Send + Sync {
    fn set_success(&self, label: &str);

    fn set_failed(&self, label: &str);
}
