//! Structural invariants of the live model: shared node identity, ego
//! ubiquity, edge membership rules and removal cascades.

use std::path::Path;
use std::sync::Arc;

use cen_core::{CenError, ContextualEgoNetwork, NetworkConfig, Payload};
use cen_storage::FileStorage;
use serde_json::json;
use tempfile::TempDir;

fn open(dir: &Path, ego: &str) -> ContextualEgoNetwork {
    let storage = Arc::new(FileStorage::open(dir).unwrap());
    ContextualEgoNetwork::create_or_load(storage, ego, None).unwrap()
}

fn open_dev(dir: &Path, ego: &str) -> ContextualEgoNetwork {
    let storage = Arc::new(FileStorage::open(dir).unwrap());
    ContextualEgoNetwork::create_or_load_with_config(
        storage,
        ego,
        None,
        NetworkConfig::development(),
    )
    .unwrap()
}

#[test]
fn nodes_are_shared_across_contexts() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let work = network.get_or_create_context(Payload::label("work")).unwrap();

    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    work.add_node(&u2).unwrap();

    // one identity, many memberships
    let again = network.get_or_create_node("u2", None).unwrap();
    assert!(Arc::ptr_eq(&u2, &again));
    for context in [&home, &work] {
        let member = context
            .nodes()
            .unwrap()
            .into_iter()
            .find(|n| n.id() == "u2")
            .unwrap();
        assert!(Arc::ptr_eq(&member, &u2));
    }
}

#[test]
fn ego_is_a_member_of_every_context() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    for name in ["home", "work", "gym"] {
        let context = network.get_or_create_context(Payload::label(name)).unwrap();
        assert!(context
            .nodes()
            .unwrap()
            .iter()
            .any(|n| Arc::ptr_eq(n, &network.ego())));
    }
}

#[test]
fn edges_require_member_endpoints() {
    let dir = TempDir::new().unwrap();
    let network = open_dev(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let outsider = network.get_or_create_node("u2", None).unwrap();

    assert!(matches!(
        home.add_edge(&network.ego(), &outsider),
        Err(CenError::NotInContext { .. })
    ));
    assert!(matches!(
        home.add_edge(&network.ego(), &network.ego()),
        Err(CenError::SelfEdge)
    ));

    home.add_node(&outsider).unwrap();
    let edge = home.add_edge(&network.ego(), &outsider).unwrap();
    assert_eq!(edge.src().id(), "u1");
    assert_eq!(edge.dst().id(), "u2");
}

#[test]
fn duplicate_edge_is_an_error_in_development() {
    let dir = TempDir::new().unwrap();
    let network = open_dev(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    home.add_edge(&network.ego(), &u2).unwrap();

    assert!(matches!(
        home.add_edge(&network.ego(), &u2),
        Err(CenError::DuplicateEdge { .. })
    ));
    assert_eq!(home.edges().unwrap().len(), 1);
}

#[test]
fn duplicate_edge_yields_the_existing_edge_in_production() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    let first = home.add_edge(&network.ego(), &u2).unwrap();

    let second = home.add_edge(&network.ego(), &u2).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(home.edges().unwrap().len(), 1);
}

#[test]
fn edges_are_directed() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    home.add_edge(&network.ego(), &u2).unwrap();

    // the reverse direction is a distinct edge
    home.add_edge(&u2, &network.ego()).unwrap();
    assert_eq!(home.edges().unwrap().len(), 2);

    let ego = network.ego();
    let incoming: Vec<_> = home.in_edges(&ego).unwrap().collect();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].src().id(), "u2");
    let outgoing: Vec<_> = home.out_edges(&ego).unwrap().collect();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].dst().id(), "u2");
}

#[test]
fn removing_a_node_removes_its_edges() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    let u3 = network.get_or_create_node("u3", None).unwrap();
    home.add_node(&u2).unwrap();
    home.add_node(&u3).unwrap();
    home.add_edge(&network.ego(), &u2).unwrap();
    home.add_edge(&u2, &u3).unwrap();
    home.add_edge(&u3, &network.ego()).unwrap();

    home.remove_node(&u2).unwrap();

    let edges = home.edges().unwrap();
    assert_eq!(edges.len(), 1);
    assert!(edges
        .iter()
        .all(|e| e.src().id() != "u2" && e.dst().id() != "u2"));
    assert!(home.nodes().unwrap().iter().all(|n| n.id() != "u2"));
}

#[test]
fn the_ego_cannot_be_removed() {
    let dir = TempDir::new().unwrap();
    let network = open_dev(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    assert!(matches!(
        home.remove_node(&network.ego()),
        Err(CenError::EgoRemoval)
    ));
    assert!(matches!(
        network.remove_node_if_exists("u1"),
        Err(CenError::EgoRemoval)
    ));
}

#[test]
fn removing_a_node_from_the_network_reaches_unloaded_contexts() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let work = network.get_or_create_context(Payload::label("work")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    for context in [&home, &work] {
        context.add_node(&u2).unwrap();
        context.add_edge(&network.ego(), &u2).unwrap();
    }
    work.cleanup().unwrap();
    assert!(!work.is_loaded());

    network.remove_node_if_exists("u2").unwrap();

    // the unloaded context was visited and re-unloaded
    assert!(!work.is_loaded());
    for context in [&home, &work] {
        assert!(context.nodes().unwrap().iter().all(|n| n.id() != "u2"));
        assert!(context
            .edges()
            .unwrap()
            .iter()
            .all(|e| e.src().id() != "u2" && e.dst().id() != "u2"));
    }
    assert!(network.alters().iter().all(|n| n.id() != "u2"));
    assert!(!dir.path().join("u2.json").exists());
    // removal is idempotent
    network.remove_node_if_exists("u2").unwrap();
}

#[test]
fn get_or_create_context_selects_by_data() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let home = network
        .get_or_create_context(Payload::new("DefaultContextData", json!({"name": "home"})))
        .unwrap();
    let again = network
        .get_or_create_context(Payload::new("DefaultContextData", json!({"name": "home"})))
        .unwrap();
    assert!(Arc::ptr_eq(&home, &again));
    assert_eq!(network.contexts().len(), 1);

    let work = network
        .get_or_create_context(Payload::new("DefaultContextData", json!({"name": "work"})))
        .unwrap();
    assert!(!Arc::ptr_eq(&home, &work));
    assert_eq!(network.contexts().len(), 2);
}

#[test]
fn removing_a_context_clears_the_current_pointer() {
    let dir = TempDir::new().unwrap();
    let network = open(dir.path(), "u1");
    let a = network.get_or_create_context(Payload::label("A")).unwrap();
    let b = network.get_or_create_context(Payload::label("B")).unwrap();
    network.set_current(&b).unwrap();
    assert!(Arc::ptr_eq(&network.current_context().unwrap(), &b));

    let b_file = format!("{}.json", b.serialization_id().unwrap());
    network.save().unwrap();
    assert!(dir.path().join(&b_file).exists());

    network.remove_context(&b).unwrap();
    assert!(network.current_context().is_none());
    assert!(!dir.path().join(&b_file).exists());
    assert_eq!(network.contexts().len(), 1);
    assert!(Arc::ptr_eq(&network.contexts()[0], &a));
}

#[test]
fn interactions_validate_their_times() {
    let dir = TempDir::new().unwrap();
    let network = open_dev(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    home.add_node(&u2).unwrap();
    let edge = home.add_edge(&network.ego(), &u2).unwrap();

    assert!(matches!(
        edge.add_interaction(-1, 0, None),
        Err(CenError::NegativeTime)
    ));
    assert!(matches!(
        edge.add_interaction(0, -1, None),
        Err(CenError::NegativeTime)
    ));
    let interaction = edge.add_interaction(100, 25, None).unwrap();
    assert_eq!(interaction.end_time(), 125);
    assert_eq!(interaction.kind(), "");
}

#[test]
fn edge_alter_is_the_non_ego_endpoint() {
    let dir = TempDir::new().unwrap();
    let network = open_dev(dir.path(), "u1");
    let home = network.get_or_create_context(Payload::label("home")).unwrap();
    let u2 = network.get_or_create_node("u2", None).unwrap();
    let u3 = network.get_or_create_node("u3", None).unwrap();
    home.add_node(&u2).unwrap();
    home.add_node(&u3).unwrap();

    let with_ego = home.add_edge(&network.ego(), &u2).unwrap();
    assert!(Arc::ptr_eq(&with_ego.alter().unwrap(), &u2));
    assert!(Arc::ptr_eq(&with_ego.ego().unwrap(), &network.ego()));

    let between_alters = home.add_edge(&u2, &u3).unwrap();
    assert!(between_alters.ego().is_none());
    assert!(matches!(
        between_alters.alter(),
        Err(CenError::NoEgoEndpoint)
    ));
}

#[test]
fn foreign_nodes_are_rejected() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let network_a = open_dev(dir_a.path(), "a");
    let network_b = open_dev(dir_b.path(), "b");

    let foreign = network_b.get_or_create_node("stranger", None).unwrap();
    let home = network_a
        .get_or_create_context(Payload::label("home"))
        .unwrap();
    assert!(matches!(
        home.add_node(&foreign),
        Err(CenError::ForeignNode { .. })
    ));
}
