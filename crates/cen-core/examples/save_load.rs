//! Build a small ego network, persist it, then load it back.
//!
//! Run twice to see the second run pick the saved state up:
//! `cargo run --example save_load`

use std::sync::Arc;

use cen_core::{ContextualEgoNetwork, Payload};
use cen_storage::FileStorage;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(FileStorage::open("ego-data/alice")?);
    let network = ContextualEgoNetwork::create_or_load(
        storage,
        "alice",
        Some(Payload::new("PersonData", json!({"first": "Alice"}))),
    )?;

    let home = network.get_or_create_context(Payload::label("home"))?;
    let bob = network.get_or_create_node("bob", None)?;
    let edge = home.get_or_add_edge(&network.ego(), &bob)?;
    edge.add_detected_interaction(Some(Payload::label("HANDSHAKE")))?;
    network.save()?;

    println!("ego: {}", network.ego().id());
    for context in network.contexts() {
        let edges = context.edges()?;
        println!(
            "context {:?}: {} nodes, {} edges",
            context.data()?.kind(),
            context.nodes()?.len(),
            edges.len()
        );
        for edge in edges {
            println!(
                "  {} -> {} ({} interactions)",
                edge.src().id(),
                edge.dst().id(),
                edge.interactions().len()
            );
        }
    }
    Ok(())
}
