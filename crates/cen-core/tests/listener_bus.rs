//! Listener dispatch: ordering, event positions, panic isolation and the
//! asynchronous adapter.

use std::path::Path;
use std::sync::Arc;

use cen_core::listeners::{AsyncListener, NetworkListener};
use cen_core::{ContextRef, ContextualEgoNetwork, EdgeRef, Interaction, NodeRef, Payload};
use cen_storage::FileStorage;
use parking_lot::Mutex;
use tempfile::TempDir;

fn open(dir: &Path) -> ContextualEgoNetwork {
    let storage = Arc::new(FileStorage::open(dir).unwrap());
    ContextualEgoNetwork::create_or_load(storage, "u1", None).unwrap()
}

/// Records every callback as one line, tagged with the listener's name.
struct Recorder {
    name: &'static str,
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self { name, events })
    }

    fn record(&self, event: String) {
        self.events.lock().push(format!("{}:{}", self.name, event));
    }
}

impl NetworkListener for Recorder {
    fn init(&self, _network: &ContextualEgoNetwork) {
        self.record("init".to_string());
    }

    fn on_create_node(&self, node: &NodeRef) {
        self.record(format!("create_node {}", node.id()));
    }

    fn on_remove_node(&self, node: &NodeRef) {
        self.record(format!("remove_node {}", node.id()));
    }

    fn on_create_context(&self, context: &ContextRef) {
        self.record(format!(
            "create_context {}",
            context.data().map(|d| d.kind().to_string()).unwrap_or_default()
        ));
    }

    fn on_add_node(&self, _context: &ContextRef, node: &NodeRef) {
        self.record(format!("add_node {}", node.id()));
    }

    fn on_remove_node_from_context(&self, context: &ContextRef, node: &NodeRef) {
        // the node must still be a member when this fires
        let still_member = context
            .nodes()
            .map(|nodes| nodes.iter().any(|n| n.id() == node.id()))
            .unwrap_or(false);
        self.record(format!("remove_member {} {}", node.id(), still_member));
    }

    fn on_create_edge(&self, edge: &EdgeRef) {
        self.record(format!("create_edge {}->{}", edge.src().id(), edge.dst().id()));
    }

    fn on_remove_edge(&self, edge: &EdgeRef) {
        self.record(format!("remove_edge {}->{}", edge.src().id(), edge.dst().id()));
    }

    fn on_create_interaction(&self, interaction: &Interaction) {
        self.record(format!("create_interaction {}", interaction.kind()));
    }
}

/// Panics on every node creation.
struct Panicker;

impl NetworkListener for Panicker {
    fn on_create_node(&self, _node: &NodeRef) {
        panic!("listener failure");
    }
}

#[test]
fn listeners_fire_in_registration_order() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path());
    let events = Arc::new(Mutex::new(Vec::new()));
    network.add_listener(Recorder::new("a", events.clone()));
    network.add_listener(Recorder::new("b", events.clone()));

    network.get_or_create_node("u2", None).unwrap();

    let log = events.lock().clone();
    assert_eq!(
        log,
        vec![
            "a:init",
            "b:init",
            "a:create_node u2",
            "b:create_node u2",
        ]
    );
}

#[test]
fn removal_callbacks_still_observe_the_entity() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path());
    let events = Arc::new(Mutex::new(Vec::new()));
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    network.add_listener(Recorder::new("a", events.clone()));

    home.remove_node(&u2).unwrap();

    let log = events.lock().clone();
    assert!(log.contains(&"a:remove_member u2 true".to_string()));
}

#[test]
fn a_panicking_listener_does_not_stop_the_rest() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path());
    let events = Arc::new(Mutex::new(Vec::new()));
    network.add_listener(Recorder::new("a", events.clone()));
    network.add_listener(Arc::new(Panicker));
    network.add_listener(Recorder::new("b", events.clone()));

    network.get_or_create_node("u2", None).unwrap();

    let log = events.lock().clone();
    assert!(log.contains(&"a:create_node u2".to_string()));
    assert!(log.contains(&"b:create_node u2".to_string()));
}

#[test]
fn structural_events_cover_the_whole_lifecycle() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path());
    let events = Arc::new(Mutex::new(Vec::new()));
    network.add_listener(Recorder::new("a", events.clone()));

    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    let edge = home.add_edge(&network.ego(), &u2).unwrap();
    edge.add_interaction(10, 0, Some(Payload::label("HANDSHAKE")))
        .unwrap();
    home.remove_edge(&network.ego(), &u2).unwrap();
    network.remove_node_if_exists("u2").unwrap();

    let log = events.lock().clone();
    let expected_in_order = [
        "a:init",
        "a:create_context home",
        "a:create_node u2",
        "a:add_node u2",
        "a:create_edge u1->u2",
        "a:create_interaction HANDSHAKE",
        "a:remove_edge u1->u2",
        "a:remove_member u2 true",
        "a:remove_node u2",
    ];
    let mut cursor = 0;
    for event in &log {
        if cursor < expected_in_order.len() && event == expected_in_order[cursor] {
            cursor += 1;
        }
    }
    assert_eq!(
        cursor,
        expected_in_order.len(),
        "expected {expected_in_order:?} in order within {log:?}"
    );
}

#[test]
fn the_async_adapter_preserves_order_and_drains_on_drop() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let network = open(dir.path());
        let recorder = Recorder::new("async", events.clone());
        network.add_listener(Arc::new(AsyncListener::new(recorder)));

        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
        home.add_edge(&network.ego(), &u2).unwrap();
        // dropping the network drops the adapter, which joins its worker
    }

    let log = events.lock().clone();
    assert_eq!(
        log,
        vec![
            "async:init",
            "async:create_context home",
            "async:create_node u2",
            "async:add_node u2",
            "async:create_edge u1->u2",
        ]
    );
}
