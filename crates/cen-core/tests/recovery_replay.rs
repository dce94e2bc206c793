//! The write-ahead journal: unsaved mutations survive an unclean shutdown.

use std::path::Path;
use std::sync::Arc;

use cen_core::listeners::RecoveryListener;
use cen_core::{ContextualEgoNetwork, Payload};
use cen_storage::FileStorage;
use tempfile::TempDir;

fn open_with_recovery(dir: &Path) -> ContextualEgoNetwork {
    let storage = Arc::new(FileStorage::open(dir).unwrap());
    let network = ContextualEgoNetwork::create_or_load(storage, "u1", None).unwrap();
    network.add_listener(Arc::new(RecoveryListener::new()));
    network
}

#[test]
fn unsaved_mutations_are_replayed() {
    let dir = TempDir::new().unwrap();
    {
        // a session that never calls save() and "crashes"
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
        home.add_edge(&network.ego(), &u2).unwrap();
    }

    let reopened = open_with_recovery(dir.path());
    let context = reopened.contexts().into_iter().next().unwrap();
    let edges = context.edges().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].src().id(), "u1");
    assert_eq!(edges[0].dst().id(), "u2");
    assert!(context.nodes().unwrap().iter().any(|n| n.id() == "u2"));
}

#[test]
fn journaled_interactions_are_replayed_with_their_payload() {
    let dir = TempDir::new().unwrap();
    {
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
        let edge = home.add_edge(&network.ego(), &u2).unwrap();
        edge.add_interaction(1000, 60, Some(Payload::label("HANDSHAKE")))
            .unwrap();
        edge.add_interaction(2000, 0, None).unwrap();
    }

    let reopened = open_with_recovery(dir.path());
    let context = reopened.contexts().into_iter().next().unwrap();
    let edges = context.edges().unwrap();
    let interactions = edges[0].interactions();
    assert_eq!(interactions.len(), 2);
    assert_eq!(interactions[0].start_time(), 1000);
    assert_eq!(interactions[0].duration(), 60);
    assert_eq!(interactions[0].kind(), "HANDSHAKE");
    assert_eq!(interactions[1].start_time(), 2000);
    assert_eq!(interactions[1].kind(), "");
}

#[test]
fn mutations_before_a_save_are_not_replayed_twice() {
    let dir = TempDir::new().unwrap();
    {
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
        home.add_edge(&network.ego(), &u2).unwrap();
        // persists everything; the journal suffix after this save is empty
        network.save().unwrap();
        // one unsaved mutation on top of the snapshot
        let u3 = network.get_or_create_node("u3", None).unwrap();
        home.add_node(&u3).unwrap();
    }

    let reopened = open_with_recovery(dir.path());
    let context = reopened.contexts().into_iter().next().unwrap();
    let nodes = context.nodes().unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().any(|n| n.id() == "u3"));
    assert_eq!(context.edges().unwrap().len(), 1);
}

#[test]
fn removals_are_replayed_in_order() {
    let dir = TempDir::new().unwrap();
    {
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        let u3 = network.get_or_create_node("u3", None).unwrap();
        home.add_node(&u2).unwrap();
        home.add_node(&u3).unwrap();
        home.add_edge(&network.ego(), &u2).unwrap();
        home.add_edge(&network.ego(), &u3).unwrap();
        home.remove_edge(&network.ego(), &u2).unwrap();
        home.remove_node(&u3).unwrap();
    }

    let reopened = open_with_recovery(dir.path());
    let context = reopened.contexts().into_iter().next().unwrap();
    assert!(context.edges().unwrap().is_empty());
    let nodes = context.nodes().unwrap();
    assert!(nodes.iter().any(|n| n.id() == "u2"));
    assert!(nodes.iter().all(|n| n.id() != "u3"));
}

#[test]
fn a_clean_session_replays_nothing() {
    let dir = TempDir::new().unwrap();
    {
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
        network.save().unwrap();
    }

    let reopened = open_with_recovery(dir.path());
    let context = reopened.contexts().into_iter().next().unwrap();
    assert_eq!(context.nodes().unwrap().len(), 2);
    assert!(context.edges().unwrap().is_empty());
}

#[test]
fn the_journal_is_truncated_after_replay() {
    let dir = TempDir::new().unwrap();
    {
        let network = open_with_recovery(dir.path());
        let home = network.get_or_create_context(Payload::label("home")).unwrap();
        let u2 = network.get_or_create_node("u2", None).unwrap();
        home.add_node(&u2).unwrap();
    }
    assert!(!std::fs::read_to_string(dir.path().join("recovery.log"))
        .unwrap()
        .is_empty());

    {
        let _reopened = open_with_recovery(dir.path());
    }
    // replayed state was saved; the fresh journal holds nothing to replay
    assert!(std::fs::read_to_string(dir.path().join("recovery.log"))
        .unwrap()
        .is_empty());
}
