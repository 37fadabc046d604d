//! # hassflowd — hassflow daemon
//!
//! Composition root that wires the flow nodes to a hub connection and runs
//! until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize tracing
//! - Construct the hub connection and its event bus (adapter)
//! - Deploy entity-configs, then flow nodes, injecting the hub context
//! - Log node emissions
//! - Handle graceful shutdown (Ctrl-C): close every node while the
//!   connection is still open, so registrations are removed from the hub
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use hassflow_adapter_virtual::VirtualHub;
use hassflow_app::context::HubContext;
use hassflow_app::event_bus::EventBus;
use hassflow_app::flow::Flow;
use hassflow_app::output::Emission;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter).context("invalid log filter")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Hub connection
    let bus = Arc::new(EventBus::new());
    let hub = Arc::new(VirtualHub::new(config.hub.server_id.as_str(), Arc::clone(&bus)));
    let ctx = HubContext::new(Arc::clone(&hub), bus);

    // Output sink
    let (sender, receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(log_emissions(receiver));

    // Nodes
    let flow = Flow::deploy(ctx, config.entity_configs, config.nodes, &sender)
        .await
        .context("failed to deploy flow")?;
    drop(sender);

    if config.hub.connect_on_start {
        hub.open();
    }
    tracing::info!(server_id = %config.hub.server_id, "hassflowd running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    flow.close().await;
    drop(flow);
    hub.close();
    printer.await.context("output task failed")?;

    Ok(())
}

async fn log_emissions(mut receiver: mpsc::UnboundedReceiver<Emission>) {
    while let Some((node_id, outputs)) = receiver.recv().await {
        for (slot, message) in outputs.into_iter().enumerate() {
            if let Some(message) = message {
                tracing::info!(%node_id, slot, message = %message.into_value(), "node output");
            }
        }
    }
}
