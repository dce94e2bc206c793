//! Contextual Ego Network core library.
//!
//! A persistent, in-memory model of a multi-layer directed social graph
//! centered on a single *ego* participant. Each layer (a [`Context`])
//! carries its own alters, its own directed [`Edge`]s and a time-stamped
//! [`Interaction`] log per edge; nodes are shared across contexts, so one
//! identity has many memberships.
//!
//! # Architecture
//!
//! This crate defines:
//! - The entity graph ([`Node`], [`Edge`], [`Interaction`], [`Context`]) and
//!   its root aggregate [`ContextualEgoNetwork`]
//! - The lazy context lifecycle: contexts unload their payload to disk via
//!   [`Context::cleanup`] and reload transparently on the next access
//! - The identity-preserving object-graph serializer
//!   ([`serialization::Serializer`]) writing one document per registered
//!   entity through a pluggable [`cen_storage::Storage`] backend
//! - The listener bus ([`listeners::NetworkListener`]) with the write-ahead
//!   [`listeners::RecoveryListener`] that replays unsaved mutations after an
//!   unclean shutdown
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cen_core::{ContextualEgoNetwork, Payload};
//! use cen_storage::FileStorage;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
//! let network = ContextualEgoNetwork::create_or_load(storage, "alice", None).unwrap();
//!
//! let work = network.get_or_create_context(Payload::label("work")).unwrap();
//! let bob = network.get_or_create_node("bob", None).unwrap();
//! let edge = work.get_or_add_edge(&network.ego(), &bob).unwrap();
//! edge.add_detected_interaction(Some(Payload::label("HANDSHAKE"))).unwrap();
//! network.save().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod listeners;
mod network;
mod payload;
pub mod serialization;
mod types;

pub use config::NetworkConfig;
pub use error::{CenError, CenResult};
pub use network::ContextualEgoNetwork;
pub use payload::Payload;
pub use types::{Context, ContextRef, Edge, EdgeRef, Interaction, Node, NodeRef};
