//! # hassflow-domain
//!
//! Pure domain model for exposing hub entities as flow nodes.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions
//! - Name hub-side objects (**entity references**)
//! - Describe what the hub pushes (**events**) and how it is normalized
//! - Describe what is sent to the hub (**discovery payloads**, entity updates)
//! - Define flow **messages** and **output-property bindings**
//! - Define persisted **node configurations** and **zone** geometry
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod config;
pub mod discovery;
pub mod entity_ref;
pub mod event;
pub mod message;
pub mod output;
pub mod status;
pub mod zone;
