//! Node shells — one module per deployable flow node.
//!
//! A node shell binds a persisted configuration, a status reporter and an
//! output sink to the shared [`HubContext`](crate::context::HubContext).

pub mod entity_config;
pub mod sentence;
pub mod switch;
pub mod zone;

pub use entity_config::{EnabledState, EntityConfigNode};
pub use sentence::SentenceNode;
pub use switch::SwitchNode;
pub use zone::ZoneNode;
