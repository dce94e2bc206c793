//! Asynchronous forwarding of listener callbacks.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::warn;

use crate::listeners::NetworkListener;
use crate::network::ContextualEgoNetwork;
use crate::types::{ContextRef, EdgeRef, Interaction, NodeRef};

/// A callback captured with owned arguments, replayable on the worker.
enum Event {
    Init(ContextualEgoNetwork),
    CreateNode(NodeRef),
    RemoveNode(NodeRef),
    CreateContext(ContextRef),
    LoadContext(ContextRef),
    SaveContext(ContextRef),
    RemoveContext(ContextRef),
    AddNode(ContextRef, NodeRef),
    RemoveNodeFromContext(ContextRef, NodeRef),
    CreateEdge(EdgeRef),
    RemoveEdge(EdgeRef),
    CreateInteraction(Interaction),
}

/// Wraps a [`NetworkListener`] so its callbacks run off the mutating thread.
///
/// Each invocation is forwarded as an owned event onto a dedicated worker,
/// which replays them one at a time in FIFO order — at most one callback of
/// the wrapped listener is ever in flight. Useful when a listener does heavy
/// work that would otherwise stall every mutation.
///
/// Note that by the time a removal callback runs on the worker, the entity
/// has already left the network; the event's owned handles keep it alive for
/// the callback itself. Dropping the adapter drains the queue and joins the
/// worker.
pub struct AsyncListener {
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncListener {
    /// Spawns the worker and wraps `inner`.
    pub fn new(inner: Arc<dyn NetworkListener>) -> Self {
        let (sender, receiver) = mpsc::channel::<Event>();
        let worker = std::thread::Builder::new()
            .name("cen-async-listener".to_string())
            .spawn(move || {
                for event in receiver {
                    match event {
                        Event::Init(network) => inner.init(&network),
                        Event::CreateNode(node) => inner.on_create_node(&node),
                        Event::RemoveNode(node) => inner.on_remove_node(&node),
                        Event::CreateContext(context) => inner.on_create_context(&context),
                        Event::LoadContext(context) => inner.on_load_context(&context),
                        Event::SaveContext(context) => inner.on_save_context(&context),
                        Event::RemoveContext(context) => inner.on_remove_context(&context),
                        Event::AddNode(context, node) => inner.on_add_node(&context, &node),
                        Event::RemoveNodeFromContext(context, node) => {
                            inner.on_remove_node_from_context(&context, &node)
                        }
                        Event::CreateEdge(edge) => inner.on_create_edge(&edge),
                        Event::RemoveEdge(edge) => inner.on_remove_edge(&edge),
                        Event::CreateInteraction(interaction) => {
                            inner.on_create_interaction(&interaction)
                        }
                    }
                }
            })
            .expect("failed to spawn the async listener worker");
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, event: Event) {
        let sender = self.sender.lock();
        if let Some(sender) = sender.as_ref() {
            if sender.send(event).is_err() {
                warn!("async listener worker is gone; dropped event");
            }
        }
    }
}

impl Drop for AsyncListener {
    fn drop(&mut self) {
        // closing the channel lets the worker drain and exit
        *self.sender.get_mut() = None;
        if let Some(worker) = self.worker.get_mut().take() {
            // the last owner may die on the worker itself (a queued event
            // holds the network, the network holds this adapter); a thread
            // cannot join itself, so detach in that case
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            let _ = worker.join();
        }
    }
}

impl NetworkListener for AsyncListener {
    fn init(&self, network: &ContextualEgoNetwork) {
        self.send(Event::Init(network.clone()));
    }

    fn on_create_node(&self, node: &NodeRef) {
        self.send(Event::CreateNode(node.clone()));
    }

    fn on_remove_node(&self, node: &NodeRef) {
        self.send(Event::RemoveNode(node.clone()));
    }

    fn on_create_context(&self, context: &ContextRef) {
        self.send(Event::CreateContext(context.clone()));
    }

    fn on_load_context(&self, context: &ContextRef) {
        self.send(Event::LoadContext(context.clone()));
    }

    fn on_save_context(&self, context: &ContextRef) {
        self.send(Event::SaveContext(context.clone()));
    }

    fn on_remove_context(&self, context: &ContextRef) {
        self.send(Event::RemoveContext(context.clone()));
    }

    fn on_add_node(&self, context: &ContextRef, node: &NodeRef) {
        self.send(Event::AddNode(context.clone(), node.clone()));
    }

    fn on_remove_node_from_context(&self, context: &ContextRef, node: &NodeRef) {
        self.send(Event::RemoveNodeFromContext(context.clone(), node.clone()));
    }

    fn on_create_edge(&self, edge: &EdgeRef) {
        self.send(Event::CreateEdge(edge.clone()));
    }

    fn on_remove_edge(&self, edge: &EdgeRef) {
        self.send(Event::RemoveEdge(edge.clone()));
    }

    fn on_create_interaction(&self, interaction: &Interaction) {
        self.send(Event::CreateInteraction(interaction.clone()));
    }
}
