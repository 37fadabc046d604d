//! Port definitions — traits that adapters and the host runtime implement.
//!
//! Ports are the boundaries between the integration core and the outside
//! world. They are defined here (in `app`) so that both the node layer and
//! the adapter layer can depend on them without circular dependencies.

pub mod connection;
pub mod output;
pub mod status;

pub use connection::Connection;
pub use output::NodeOutput;
pub use status::StatusReporter;
