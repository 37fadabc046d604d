//! Flow — every node deployed against one hub context.
//!
//! Entity-configs are deployed first so that switches can reference them;
//! teardown closes nodes in reverse order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use hassflow_domain::config::{EntityConfigNodeConfig, NodeConfig};
use hassflow_domain::error::{FlowError, NotFoundError, ValidationError};
use hassflow_domain::id::NodeId;
use hassflow_domain::message::NodeMessage;

use crate::context::HubContext;
use crate::controller::Done;
use crate::nodes::{EntityConfigNode, SentenceNode, SwitchNode, ZoneNode};
use crate::output::{ChannelOutput, Emission};
use crate::ports::{Connection, NodeOutput, StatusReporter};
use crate::status::NodeStatus;

/// A deployed flow node.
pub enum DeployedNode<C> {
    Switch(SwitchNode<C>),
    Sentence(SentenceNode<C>),
    Zone(ZoneNode),
}

impl<C: Connection + 'static> DeployedNode<C> {
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Switch(node) => node.node_id(),
            Self::Sentence(node) => node.node_id(),
            Self::Zone(node) => node.node_id(),
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Switch(node) => node.close(),
            Self::Sentence(node) => node.close().await,
            Self::Zone(node) => node.close(),
        }
    }
}

/// Every node of a flow, with their status reporters.
pub struct Flow<C> {
    entity_configs: Vec<Arc<EntityConfigNode<C>>>,
    nodes: Vec<DeployedNode<C>>,
    statuses: HashMap<NodeId, Arc<NodeStatus>>,
}

impl<C: Connection + 'static> Flow<C> {
    /// Deploy entity-configs, then flow nodes, emitting into `sender`.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError::Validation`] for an invalid or duplicate node
    /// and a [`FlowError::NotFound`] for a switch referencing an unknown
    /// entity-config. Nodes deployed before the failure are closed.
    pub async fn deploy(
        ctx: HubContext<C>,
        entity_configs: Vec<EntityConfigNodeConfig>,
        nodes: Vec<NodeConfig>,
        sender: &mpsc::UnboundedSender<Emission>,
    ) -> Result<Self, FlowError> {
        check_unique_ids(&entity_configs, &nodes)?;

        let mut flow = Self {
            entity_configs: Vec::new(),
            nodes: Vec::new(),
            statuses: HashMap::new(),
        };
        let deployed = flow.deploy_all(&ctx, entity_configs, nodes, sender).await;
        if let Err(err) = deployed {
            flow.close().await;
            return Err(err);
        }
        tracing::info!(
            entity_configs = flow.entity_configs.len(),
            nodes = flow.nodes.len(),
            "flow deployed"
        );
        Ok(flow)
    }

    async fn deploy_all(
        &mut self,
        ctx: &HubContext<C>,
        entity_configs: Vec<EntityConfigNodeConfig>,
        nodes: Vec<NodeConfig>,
        sender: &mpsc::UnboundedSender<Emission>,
    ) -> Result<(), FlowError> {
        for config in entity_configs {
            let node = EntityConfigNode::deploy(config, ctx.clone()).await?;
            tracing::debug!(node_id = %node.config().id, "entity config deployed");
            self.entity_configs.push(Arc::new(node));
        }

        for config in nodes {
            let node_id = config.id().clone();
            let status = Arc::new(NodeStatus::new(node_id.clone()));
            let reporter = Arc::clone(&status) as Arc<dyn StatusReporter>;
            let output = Arc::new(ChannelOutput::new(node_id.clone(), sender.clone()))
                as Arc<dyn NodeOutput>;

            let node = match config {
                NodeConfig::Switch(config) => {
                    let entity_config = self.find_entity_config(&config.entity_config)?;
                    let node = SwitchNode::deploy(config, entity_config, reporter, output)?;
                    DeployedNode::Switch(node)
                }
                NodeConfig::Sentence(config) => DeployedNode::Sentence(
                    SentenceNode::deploy(config, ctx.clone(), reporter, output).await?,
                ),
                NodeConfig::Zone(config) => {
                    DeployedNode::Zone(ZoneNode::deploy(config, ctx, reporter, output)?)
                }
            };
            tracing::debug!(%node_id, "node deployed");
            self.statuses.insert(node_id, status);
            self.nodes.push(node);
        }
        Ok(())
    }

    fn find_entity_config(&self, id: &NodeId) -> Result<Arc<EntityConfigNode<C>>, NotFoundError> {
        self.entity_configs
            .iter()
            .find(|node| &node.config().id == id)
            .cloned()
            .ok_or_else(|| NotFoundError {
                entity: "entity config",
                id: id.to_string(),
            })
    }

    #[must_use]
    pub fn entity_config(&self, id: &NodeId) -> Option<&EntityConfigNode<C>> {
        self.entity_configs
            .iter()
            .find(|node| &node.config().id == id)
            .map(Arc::as_ref)
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&DeployedNode<C>> {
        self.nodes.iter().find(|node| node.node_id() == id)
    }

    #[must_use]
    pub fn status(&self, id: &NodeId) -> Option<&NodeStatus> {
        self.statuses.get(id).map(Arc::as_ref)
    }

    /// Deliver an input message to the node `id`.
    ///
    /// Only switches take input; `done` completes with
    /// [`FlowError::NotFound`] for anything else.
    pub async fn input(&self, id: &NodeId, message: NodeMessage, done: Done) {
        match self.node(id) {
            Some(DeployedNode::Switch(node)) => node.on_input(message, done).await,
            _ => done.complete(Err(NotFoundError {
                entity: "input node",
                id: id.to_string(),
            }
            .into())),
        }
    }

    /// Close every node, flow nodes first, deregistering what can be.
    pub async fn close(&self) {
        for node in self.nodes.iter().rev() {
            node.close().await;
        }
        for node in self.entity_configs.iter().rev() {
            node.close().await;
        }
        tracing::info!("flow closed");
    }
}

fn check_unique_ids(
    entity_configs: &[EntityConfigNodeConfig],
    nodes: &[NodeConfig],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let ids = entity_configs
        .iter()
        .map(|c| &c.id)
        .chain(nodes.iter().map(NodeConfig::id));
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateNodeId(id.to_string()));
        }
    }
    Ok(())
}
