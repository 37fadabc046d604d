//! Sentence node — registers voice sentences and fires when one matches.

use std::sync::Arc;

use serde_json::Value;

use hassflow_domain::config::SentenceNodeConfig;
use hassflow_domain::discovery::DiscoveryPayload;
use hassflow_domain::error::FlowError;
use hassflow_domain::event::TriggerPayload;
use hassflow_domain::id::NodeId;
use hassflow_domain::output::{OutputContext, build_message};

use crate::bidirectional::BidirectionalIntegration;
use crate::context::HubContext;
use crate::controller::ControllerBase;
use crate::integration::PayloadBuilder;
use crate::ports::{Connection, NodeOutput, StatusReporter};

/// Deployed sentence node.
pub struct SentenceNode<C> {
    controller: Arc<SentenceController>,
    integration: BidirectionalIntegration<C>,
}

struct SentenceController {
    base: ControllerBase,
    config: SentenceNodeConfig,
    config_json: Value,
}

impl<C: Connection + 'static> SentenceNode<C> {
    /// Validate the configuration, listen for triggers and register the
    /// sentences with the hub.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError::Validation`] for an invalid configuration.
    pub async fn deploy(
        config: SentenceNodeConfig,
        ctx: HubContext<C>,
        status: Arc<dyn StatusReporter>,
        output: Arc<dyn NodeOutput>,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let entity = ctx.entity_ref(config.id.as_str())?;

        let server_id = ctx.server_id().clone();
        let node_id = config.id.clone();
        let sentences: Vec<String> = config
            .sentences
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        let builder: PayloadBuilder = Arc::new(move || DiscoveryPayload::SentenceTrigger {
            server_id: server_id.clone(),
            node_id: node_id.clone(),
            sentences: sentences.clone(),
        });

        let integration = BidirectionalIntegration::new(ctx, config.id.clone(), entity, builder);
        let controller = Arc::new(SentenceController {
            base: ControllerBase::new(config.id.clone(), status, output),
            config_json: serde_json::to_value(&config).unwrap_or(Value::Null),
            config,
        });

        let weak = Arc::downgrade(&controller);
        let owner = controller.base.node_id().to_string();
        integration.on_trigger(owner, move |event: &TriggerPayload| match weak.upgrade() {
            Some(controller) => controller.on_trigger(event),
            None => Ok(()),
        });
        integration.subscribe();
        integration.register().await;

        Ok(Self {
            controller,
            integration,
        })
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.controller.base.node_id()
    }

    #[must_use]
    pub fn integration(&self) -> &BidirectionalIntegration<C> {
        &self.integration
    }

    /// Deregister the sentences and silence the controller.
    pub async fn close(&self) {
        self.controller.base.close();
        self.integration.close().await;
    }
}

impl SentenceController {
    fn on_trigger(&self, event: &TriggerPayload) -> Result<(), FlowError> {
        let trigger_id = event
            .payload
            .as_ref()
            .and_then(|p| p.get("sentence"))
            .and_then(Value::as_str)
            .unwrap_or(event.entity_id.as_str());
        let ctx = OutputContext {
            config: Some(&self.config_json),
            trigger_id: Some(trigger_id),
            event_data: event.payload.as_ref(),
            ..OutputContext::default()
        };
        let message = build_message(&self.config.output_properties, &ctx);
        self.base.set_success(trigger_id);
        self.base.send_single(message);
        Ok(())
    }
}
