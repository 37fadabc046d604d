//! # hassflow-app
//!
//! Application layer — the integration core between flow nodes and a hub.
//!
//! ## Responsibilities
//! - Define **port traits** implemented by transports and the host runtime:
//!   - `Connection` — send commands to one hub server
//!   - `NodeOutput` — hand messages back to the flow runtime
//!   - `StatusReporter` — last-write-wins node status
//! - Provide the per-connection **event bus** and ordered listener registries
//! - Manage **integrations**: registration, event subscription, value pushes
//! - Implement the **controllers** of the entity-config, switch, sentence and
//!   zone nodes, plus the `Flow` that deploys and tears them down
//!
//! ## Dependency rule
//! Depends on `hassflow-domain` only (plus `tokio` for spawning and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bidirectional;
pub mod context;
pub mod controller;
pub mod event_bus;
pub mod flow;
pub mod integration;
pub mod listeners;
pub mod nodes;
pub mod output;
pub mod ports;
pub mod status;
pub mod subscription;

#[cfg(test)]
mod testing;
