//! In-process hooks on structural changes of the ego network.
//!
//! A listener opts into any subset of the callbacks; every method defaults to
//! a no-op. Listeners run synchronously in registration order — creation
//! callbacks after the change has taken effect, removal callbacks before it,
//! so removal observers still see the entity. A panic inside one listener is
//! caught and logged; later listeners still fire.
//!
//! Listeners are not persisted with the network and must be re-attached after
//! every [`create_or_load`](crate::ContextualEgoNetwork::create_or_load).
//! Avoid keeping references to removed nodes or contexts beyond the removal
//! callback.

mod async_run;
mod recovery;

pub use async_run::AsyncListener;
pub use recovery::RecoveryListener;

use crate::network::ContextualEgoNetwork;
use crate::types::{ContextRef, EdgeRef, Interaction, NodeRef};

/// Event hooks invoked on every structural change of a
/// [`ContextualEgoNetwork`].
///
/// Attach implementations with
/// [`add_listener`](ContextualEgoNetwork::add_listener). Methods take `&self`;
/// stateful listeners keep their state behind interior mutability, which also
/// lets a callback re-enter the network (for example to save an entity).
pub trait NetworkListener: Send + Sync {
    /// Called once, when the listener is added to a network.
    fn init(&self, network: &ContextualEgoNetwork) {
        let _ = network;
    }

    /// A node was created on the network (after it joined the alter list).
    fn on_create_node(&self, node: &NodeRef) {
        let _ = node;
    }

    /// A node is about to be removed from the network, after it has already
    /// left every context.
    fn on_remove_node(&self, node: &NodeRef) {
        let _ = node;
    }

    /// A context was created (after it joined the context list).
    fn on_create_context(&self, context: &ContextRef) {
        let _ = context;
    }

    /// A context finished loading its payload into memory.
    fn on_load_context(&self, context: &ContextRef) {
        let _ = context;
    }

    /// A context was saved (directly, via a network save, or on cleanup).
    fn on_save_context(&self, context: &ContextRef) {
        let _ = context;
    }

    /// A context is about to be removed from the network.
    fn on_remove_context(&self, context: &ContextRef) {
        let _ = context;
    }

    /// A node was added to a context (after insertion).
    fn on_add_node(&self, context: &ContextRef, node: &NodeRef) {
        let _ = (context, node);
    }

    /// A node is about to leave a context; its incident edges are removed
    /// right after this callback.
    fn on_remove_node_from_context(&self, context: &ContextRef, node: &NodeRef) {
        let _ = (context, node);
    }

    /// An edge was created in a context (after insertion).
    fn on_create_edge(&self, edge: &EdgeRef) {
        let _ = edge;
    }

    /// An edge is about to be removed from its context.
    fn on_remove_edge(&self, edge: &EdgeRef) {
        let _ = edge;
    }

    /// An interaction was recorded on an edge (after insertion).
    fn on_create_interaction(&self, interaction: &Interaction) {
        let _ = interaction;
    }
}
