//! End-to-end tests for the full hassflow stack.
//!
//! Each test deploys real nodes through `Flow` against the in-process
//! virtual hub, injects hub events through it, and observes node emissions
//! on the output channel. No network is involved.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use hassflow_adapter_virtual::VirtualHub;
use hassflow_app::context::HubContext;
use hassflow_app::controller::Done;
use hassflow_app::event_bus::EventBus;
use hassflow_app::flow::Flow;
use hassflow_app::output::Emission;
use hassflow_domain::config::{EntityConfigNodeConfig, NodeConfig};
use hassflow_domain::discovery::{DiscoveryPayload, HubCommand};
use hassflow_domain::error::FlowError;
use hassflow_domain::id::NodeId;
use hassflow_domain::message::NodeMessage;
use hassflow_domain::status::StatusKind;

struct Harness {
    hub: Arc<VirtualHub>,
    flow: Flow<VirtualHub>,
    outputs: mpsc::UnboundedReceiver<Emission>,
}

impl Harness {
    async fn deploy(open: bool, entity_configs: Value, nodes: Value) -> Self {
        let bus = Arc::new(EventBus::new());
        let hub = Arc::new(VirtualHub::new("home", Arc::clone(&bus)));
        if open {
            hub.open();
        }
        let entity_configs: Vec<EntityConfigNodeConfig> =
            serde_json::from_value(entity_configs).unwrap();
        let nodes: Vec<NodeConfig> = serde_json::from_value(nodes).unwrap();
        let (sender, outputs) = mpsc::unbounded_channel();

        let flow = Flow::deploy(
            HubContext::new(Arc::clone(&hub), bus),
            entity_configs,
            nodes,
            &sender,
        )
        .await
        .unwrap();

        Self { hub, flow, outputs }
    }

    /// One entity-config `cfg1` and one switch `sw1` on it.
    async fn switch(output_on_state_change: bool) -> Self {
        Self::deploy(
            true,
            json!([{"id": "cfg1", "name": "Garden lights"}]),
            json!([{
                "type": "switch",
                "id": "sw1",
                "entity_config": "cfg1",
                "output_on_state_change": output_on_state_change,
            }]),
        )
        .await
    }

    async fn input(&self, node: &str, message: Value) -> Result<(), FlowError> {
        let (done, result) = Done::channel(NodeId::new(node));
        self.flow
            .input(&NodeId::new(node), NodeMessage::from(message), done)
            .await;
        result.await.unwrap()
    }

    fn drain(&mut self) -> Vec<Emission> {
        let mut emissions = Vec::new();
        while let Ok(emission) = self.outputs.try_recv() {
            emissions.push(emission);
        }
        emissions
    }

    fn status(&self, node: &str) -> Option<(StatusKind, String)> {
        self.flow
            .status(&NodeId::new(node))
            .and_then(|status| status.snapshot())
            .map(|snapshot| (snapshot.kind, snapshot.label))
    }

    fn enabled(&self, node: &str) -> bool {
        self.flow
            .entity_config(&NodeId::new(node))
            .unwrap()
            .is_enabled()
    }
}

/// Let registrations spawned on `connection_opened` run.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn payload_of(emission: &Emission, slot: usize) -> Option<&Value> {
    emission.1[slot].as_ref().and_then(NodeMessage::payload)
}

// ---------------------------------------------------------------------------
// Switch scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_route_input_to_first_output_when_enabled() {
    let mut harness = Harness::switch(false).await;

    harness.input("sw1", json!({"payload": 42})).await.unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    assert_eq!(payload_of(&emissions[0], 0), Some(&json!(42)));
    assert!(emissions[0].1[1].is_none());
    assert_eq!(
        harness.status("sw1"),
        Some((StatusKind::Success, "input".to_string()))
    );
}

#[tokio::test]
async fn should_route_input_to_second_output_when_disabled() {
    let mut harness = Harness::switch(false).await;
    harness.input("sw1", json!({"enable": false})).await.unwrap();

    harness.input("sw1", json!({"payload": 42})).await.unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    assert!(emissions[0].1[0].is_none());
    assert_eq!(payload_of(&emissions[0], 1), Some(&json!(42)));
    assert_eq!(
        harness.status("sw1"),
        Some((StatusKind::Failed, "input".to_string()))
    );
}

#[tokio::test]
async fn should_not_emit_state_change_without_output_on_state_change() {
    let mut harness = Harness::switch(false).await;

    harness.hub.set_state("cfg1", json!({"state": "off"})).unwrap();

    assert!(harness.drain().is_empty());
    assert!(!harness.enabled("cfg1"));
}

#[tokio::test]
async fn should_report_rejected_enable_push_with_state_already_changed() {
    let harness = Harness::switch(false).await;
    harness.hub.reject_next("invalid_state", "entity is locked");

    let result = harness.input("sw1", json!({"enable": false})).await;

    assert!(matches!(result, Err(FlowError::CommandRejected(_))));
    assert!(!harness.enabled("cfg1"));
}

#[tokio::test]
async fn should_emit_state_change_routed_by_adopted_state() {
    let mut harness = Harness::switch(true).await;

    harness.hub.set_state("cfg1", json!({"state": "off"})).unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    assert!(emissions[0].1[0].is_none());
    assert_eq!(payload_of(&emissions[0], 1), Some(&json!(false)));
}

#[tokio::test]
async fn should_push_enable_to_hub() {
    let harness = Harness::switch(false).await;

    harness
        .input("sw1", json!({"enable": {"value": false}}))
        .await
        .unwrap();

    assert_eq!(
        harness.hub.entity_state("cfg1").unwrap()["state"],
        json!("off")
    );
}

#[tokio::test]
async fn should_route_hub_trigger_through_switch() {
    let mut harness = Harness::switch(false).await;

    harness.hub.fire_trigger("cfg1", Some(json!("go"))).unwrap();

    let emissions = harness.drain();
    let message = emissions[0].1[0].as_ref().unwrap();
    assert_eq!(message.topic(), Some("triggered"));
    assert_eq!(message.payload(), Some(&json!("go")));
    assert_eq!(
        harness.status("sw1"),
        Some((StatusKind::Success, "triggered".to_string()))
    );
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_register_once_per_node_across_reconnects() {
    let harness = Harness::deploy(
        false,
        json!([{"id": "cfg1"}]),
        json!([{"type": "sentence", "id": "s1", "sentences": ["hello"]}]),
    )
    .await;
    assert_eq!(harness.hub.registration_count(), 0);

    harness.hub.open();
    settle().await;
    harness.hub.close();
    harness.hub.open();
    settle().await;

    assert_eq!(harness.hub.registration_count(), 2);
    let discoveries = harness
        .hub
        .commands()
        .into_iter()
        .filter(|cmd| matches!(cmd, HubCommand::Discover(_)))
        .count();
    assert_eq!(discoveries, 4);
}

#[tokio::test]
async fn should_resync_state_changed_while_disconnected() {
    let harness = Harness::switch(false).await;
    harness.hub.close();

    harness.input("sw1", json!({"enable": false})).await.unwrap();
    assert_eq!(
        harness.hub.entity_state("cfg1").unwrap()["state"],
        json!("on")
    );

    harness.hub.open();
    settle().await;

    let Some(DiscoveryPayload::Entity { state, .. }) =
        harness.hub.registration(&NodeId::new("cfg1"))
    else {
        panic!("cfg1 should be registered");
    };
    assert!(!state);
    assert_eq!(
        harness.hub.entity_state("cfg1").unwrap()["state"],
        json!("off")
    );
}

#[tokio::test]
async fn should_deregister_everything_on_shutdown() {
    let harness = Harness::deploy(
        true,
        json!([{"id": "cfg1"}]),
        json!([
            {"type": "switch", "id": "sw1", "entity_config": "cfg1"},
            {"type": "sentence", "id": "s1", "sentences": ["hello"]},
            {"type": "zone", "id": "z1", "entities": ["person.alice"], "zones": ["zone.home"]},
        ]),
    )
    .await;
    assert_eq!(harness.hub.registration_count(), 2);

    harness.flow.close().await;

    assert_eq!(harness.hub.registration_count(), 0);
    assert_eq!(harness.hub.bus().total_subscriptions(), 0);
}

// ---------------------------------------------------------------------------
// Completion, ordering and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_complete_every_input_exactly_once() {
    let harness = Harness::switch(false).await;
    let completions = Arc::new(Mutex::new(Vec::new()));
    let inputs = [
        json!({"payload": 1}),
        json!({"enable": false}),
        json!({"enable": true}),
    ];

    harness.hub.reject_next("invalid_state", "nope");
    for (index, message) in inputs.into_iter().enumerate() {
        let sink = Arc::clone(&completions);
        let done = Done::new(NodeId::new("sw1"), move |result| {
            sink.lock().unwrap().push((index, result.is_ok()));
        });
        harness
            .flow
            .input(&NodeId::new("sw1"), NodeMessage::from(message), done)
            .await;
    }
    harness.flow.close().await;
    let done = Done::new(NodeId::new("sw1"), {
        let sink = Arc::clone(&completions);
        move |result| sink.lock().unwrap().push((3, result.is_ok()))
    });
    harness
        .flow
        .input(&NodeId::new("sw1"), NodeMessage::from(json!({"payload": 2})), done)
        .await;

    assert_eq!(
        *completions.lock().unwrap(),
        vec![(0, true), (1, false), (2, true), (3, true)]
    );
}

#[tokio::test]
async fn should_deliver_to_switches_in_deployment_order() {
    let mut harness = Harness::deploy(
        true,
        json!([{"id": "cfg1"}]),
        json!([
            {"type": "switch", "id": "first", "entity_config": "cfg1"},
            {"type": "switch", "id": "second", "entity_config": "cfg1"},
        ]),
    )
    .await;

    harness.hub.fire_trigger("cfg1", None).unwrap();

    let order: Vec<String> = harness
        .drain()
        .into_iter()
        .map(|(node_id, _)| node_id.to_string())
        .collect();
    assert_eq!(order, vec!["first", "second"]);
}

#[tokio::test]
async fn should_not_leak_events_between_entities() {
    let mut harness = Harness::deploy(
        true,
        json!([{"id": "cfg1"}, {"id": "cfg2"}]),
        json!([
            {"type": "switch", "id": "sw1", "entity_config": "cfg1", "output_on_state_change": true},
            {"type": "switch", "id": "sw2", "entity_config": "cfg2", "output_on_state_change": true},
        ]),
    )
    .await;

    harness.hub.set_state("cfg1", json!({"state": "off"})).unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].0.as_str(), "sw1");
    assert!(!harness.enabled("cfg1"));
    assert!(harness.enabled("cfg2"));
}

// ---------------------------------------------------------------------------
// Sentence and zone nodes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_emit_sentence_trigger() {
    let mut harness = Harness::deploy(
        true,
        json!([]),
        json!([{"type": "sentence", "id": "s1", "sentences": ["turn on the garden"]}]),
    )
    .await;

    harness
        .hub
        .fire_trigger("s1", Some(json!({"sentence": "turn on the garden"})))
        .unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    assert_eq!(payload_of(&emissions[0], 0), Some(&json!("turn on the garden")));
    assert_eq!(
        harness.status("s1"),
        Some((StatusKind::Success, "turn on the garden".to_string()))
    );
}

#[tokio::test]
async fn should_emit_zone_enter() {
    let mut harness = Harness::deploy(
        true,
        json!([]),
        json!([{
            "type": "zone",
            "id": "z1",
            "entities": ["person.alice"],
            "zones": ["zone.home"],
            "event": "enter",
        }]),
    )
    .await;
    harness
        .hub
        .set_state(
            "zone.home",
            json!({"state": "0", "attributes": {"latitude": 48.8566, "longitude": 2.3522, "radius": 150.0}}),
        )
        .unwrap();
    harness
        .hub
        .set_state(
            "person.alice",
            json!({"state": "not_home", "attributes": {"latitude": 48.87, "longitude": 2.35}}),
        )
        .unwrap();

    harness
        .hub
        .set_state(
            "person.alice",
            json!({"state": "home", "attributes": {"latitude": 48.8567, "longitude": 2.3521}}),
        )
        .unwrap();

    let emissions = harness.drain();
    assert_eq!(emissions.len(), 1);
    let message = emissions[0].1[0].as_ref().unwrap();
    assert_eq!(message.topic(), Some("person.alice"));
    assert_eq!(message.get_path("event"), Some(&json!("enter")));
    assert_eq!(
        harness.status("z1"),
        Some((StatusKind::Success, "person.alice enter zone.home".to_string()))
    );
}
