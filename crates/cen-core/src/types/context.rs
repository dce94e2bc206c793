//! One layer of the multi-layer social graph.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CenError, CenResult};
use crate::network::NetworkInner;
use crate::payload::Payload;
use crate::serialization::document::JsonMap;
use crate::serialization::{AnyRef, Decoder, Encoder, Persistent};
use crate::types::edge::{Edge, EdgeRef};
use crate::types::node::NodeRef;
use crate::types::{decode_module_data, encode_module_data};

/// Shared handle to a [`Context`].
pub type ContextRef = Arc<Context>;

/// The in-memory node/edge payload of a loaded context.
#[derive(Default)]
struct ContextGraph {
    nodes: Vec<NodeRef>,
    edges: BTreeMap<String, EdgeRef>,
}

impl ContextGraph {
    fn contains(&self, node: &NodeRef) -> bool {
        self.nodes.iter().any(|n| Arc::ptr_eq(n, node))
    }
}

/// A context of the contextual ego network.
///
/// A context owns its node membership list (always containing the ego while
/// loaded) and its edge collection. It is in one of two memory states:
/// *loaded*, with the node/edge payload resident, or *unloaded*, where only
/// the shell and its serialization id remain and the payload lives on disk.
/// [`cleanup`](Self::cleanup) saves and unloads; any read-side operation on
/// an unloaded context transparently reloads it first, so callers never
/// observe the difference.
///
/// Create contexts through
/// [`ContextualEgoNetwork::get_or_create_context`](crate::ContextualEgoNetwork::get_or_create_context).
pub struct Context {
    me: Weak<Context>,
    network: Weak<NetworkInner>,
    data: Mutex<Option<Payload>>,
    graph: Mutex<Option<ContextGraph>>,
    module_data: Mutex<BTreeMap<String, Payload>>,
}

impl Context {
    /// Creates a loaded context holding `data`, with the ego as its first
    /// member, registered with the network's serializer under a fresh id.
    pub(crate) fn create(network: &Arc<NetworkInner>, data: Payload) -> ContextRef {
        let ego = network.ego_ref();
        let context = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            network: Arc::downgrade(network),
            data: Mutex::new(Some(data)),
            graph: Mutex::new(Some(ContextGraph {
                nodes: vec![ego],
                edges: BTreeMap::new(),
            })),
            module_data: Mutex::new(BTreeMap::new()),
        });
        let any: AnyRef = context.clone();
        network.serializer().register(&any);
        context
    }

    /// An unloaded shell materialized from an `@id` reference; data and
    /// payload arrive with the next load.
    pub(crate) fn shell(network: &Arc<NetworkInner>) -> ContextRef {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            network: Arc::downgrade(network),
            data: Mutex::new(None),
            graph: Mutex::new(None),
            module_data: Mutex::new(BTreeMap::new()),
        })
    }

    fn me(&self) -> CenResult<ContextRef> {
        self.me.upgrade().ok_or(CenError::NetworkGone)
    }

    pub(crate) fn network(&self) -> CenResult<Arc<NetworkInner>> {
        self.network.upgrade().ok_or(CenError::NetworkGone)
    }

    fn any_ref(&self) -> CenResult<AnyRef> {
        let me: AnyRef = self.me()?;
        Ok(me)
    }

    /// Runs `f` against the loaded graph payload, reloading first if needed.
    fn with_graph<R>(&self, f: impl FnOnce(&ContextGraph) -> R) -> CenResult<R> {
        self.assert_loaded()?;
        match self.graph.lock().as_ref() {
            Some(graph) => Ok(f(graph)),
            None => Err(CenError::Decode("context payload unavailable".to_string())),
        }
    }

    fn with_graph_mut<R>(&self, f: impl FnOnce(&mut ContextGraph) -> R) -> CenResult<R> {
        self.assert_loaded()?;
        match self.graph.lock().as_mut() {
            Some(graph) => Ok(f(graph)),
            None => Err(CenError::Decode("context payload unavailable".to_string())),
        }
    }

    /// The id assigned to this context for serialization; also its file name.
    pub fn serialization_id(&self) -> CenResult<String> {
        let network = self.network()?;
        network
            .serializer()
            .registered_id(&self.any_ref()?)
            .ok_or(CenError::NotRegistered)
    }

    /// Whether the context payload is resident in memory.
    pub fn is_loaded(&self) -> bool {
        self.graph.lock().is_some()
    }

    /// Loads the context payload from storage and grants save permission.
    ///
    /// Performed automatically on demand by every other access operation.
    /// Member nodes referenced by the document materialize too (reload depth
    /// 1). Emits `on_load_context` when done.
    pub fn load(&self) -> CenResult<()> {
        let network = self.network()?;
        let any = self.any_ref()?;
        network.serializer().reload_with_depth(&any, 1)?;
        network.serializer().set_save_permission(&any, true)?;
        if self.graph.lock().is_none() {
            // nothing on disk: start from the empty layer
            *self.graph.lock() = Some(ContextGraph {
                nodes: vec![network.ego_ref()],
                edges: BTreeMap::new(),
            });
        }
        debug!(
            id = %network
                .serializer()
                .registered_id(&any)
                .unwrap_or_default(),
            "loaded context"
        );
        let me = self.me()?;
        network.emit(|l| l.on_load_context(&me));
        Ok(())
    }

    fn assert_loaded(&self) -> CenResult<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            self.load()
        }
    }

    /// Serializes the context to its file if it is loaded.
    ///
    /// Returns `Ok(false)` for an unloaded context, whose document is already
    /// up to date from the `cleanup` that unloaded it. Emits
    /// `on_save_context`.
    pub fn save(&self) -> CenResult<bool> {
        if !self.is_loaded() {
            return Ok(false);
        }
        let network = self.network()?;
        let saved = network.serializer().save(&self.any_ref()?)?;
        let me = self.me()?;
        network.emit(|l| l.on_save_context(&me));
        Ok(saved)
    }

    /// Saves the context, revokes its save permission and drops its payload
    /// from memory. The context transitions to the unloaded state; the next
    /// access reloads it transparently.
    pub fn cleanup(&self) -> CenResult<()> {
        self.save()?;
        let network = self.network()?;
        network
            .serializer()
            .set_save_permission(&self.any_ref()?, false)?;
        *self.graph.lock() = None;
        Ok(())
    }

    /// Deletes the context's file without touching its in-memory state.
    pub(crate) fn remove_from_storage(&self) -> CenResult<()> {
        let network = self.network()?;
        network.serializer().remove_from_storage(&self.any_ref()?)
    }

    /// The data attached to the context.
    pub fn data(&self) -> CenResult<Payload> {
        self.assert_loaded()?;
        self.data
            .lock()
            .clone()
            .ok_or_else(|| CenError::Decode("context has no data".to_string()))
    }

    /// A shallow copy of the context's node list.
    pub fn nodes(&self) -> CenResult<Vec<NodeRef>> {
        self.with_graph(|g| g.nodes.clone())
    }

    /// A shallow copy of the context's edge collection.
    pub fn edges(&self) -> CenResult<Vec<EdgeRef>> {
        self.with_graph(|g| g.edges.values().cloned().collect())
    }

    /// Adds a node to the context.
    ///
    /// # Errors
    ///
    /// - [`CenError::ForeignNode`] when the node belongs to a different
    ///   network
    /// - [`CenError::AlreadyInContext`] when the node is already a member
    pub fn add_node(self: &Arc<Self>, node: &NodeRef) -> CenResult<()> {
        let network = self.network()?;
        if !node.belongs_to(&network) {
            return network.soft(
                CenError::ForeignNode {
                    id: node.id().to_string(),
                },
                (),
            );
        }
        let added = self.with_graph_mut(|g| {
            if g.contains(node) {
                false
            } else {
                g.nodes.push(node.clone());
                true
            }
        })?;
        if !added {
            return network.soft(
                CenError::AlreadyInContext {
                    id: node.id().to_string(),
                },
                (),
            );
        }
        let any: AnyRef = node.clone();
        network.serializer().register_with_id(&any, node.id())?;
        let me = self.me()?;
        network.emit(|l| l.on_add_node(&me, node));
        Ok(())
    }

    /// Adds a node to the context unless it is already a member.
    pub fn add_node_if_necessary(self: &Arc<Self>, node: &NodeRef) -> CenResult<()> {
        let already = self.with_graph(|g| g.contains(node))?;
        if already {
            Ok(())
        } else {
            self.add_node(node)
        }
    }

    /// Removes a node and its incident edges from the context.
    ///
    /// # Errors
    ///
    /// - [`CenError::NotInContext`] when the node is not a member
    /// - [`CenError::EgoRemoval`] for the ego
    pub fn remove_node(self: &Arc<Self>, node: &NodeRef) -> CenResult<()> {
        let network = self.network()?;
        if !self.with_graph(|g| g.contains(node))? {
            return network.soft(
                CenError::NotInContext {
                    id: node.id().to_string(),
                },
                (),
            );
        }
        self.remove_node_if_exists(node)
    }

    /// Removes a node and its incident edges if it is a member; does nothing
    /// otherwise. The ego is never removable.
    pub fn remove_node_if_exists(self: &Arc<Self>, node: &NodeRef) -> CenResult<()> {
        let network = self.network()?;
        if Arc::ptr_eq(node, &network.ego_ref()) {
            return network.soft(CenError::EgoRemoval, ());
        }
        if !self.with_graph(|g| g.contains(node))? {
            return Ok(());
        }
        let me = self.me()?;
        network.emit(|l| l.on_remove_node_from_context(&me, node));
        self.with_graph_mut(|g| {
            g.edges
                .retain(|_, e| !Arc::ptr_eq(&e.src(), node) && !Arc::ptr_eq(&e.dst(), node));
            g.nodes.retain(|n| !Arc::ptr_eq(n, node));
        })?;
        Ok(())
    }

    /// Creates an edge between two member nodes.
    ///
    /// # Errors
    ///
    /// - [`CenError::SelfEdge`] when `src` and `dst` are the same node
    /// - [`CenError::NotInContext`] when either endpoint is not a member
    /// - [`CenError::DuplicateEdge`] when the edge already exists (the
    ///   production policy yields the existing edge instead — the caller
    ///   usually meant to add an interaction to it)
    pub fn add_edge(self: &Arc<Self>, src: &NodeRef, dst: &NodeRef) -> CenResult<EdgeRef> {
        let network = self.network()?;
        if Arc::ptr_eq(src, dst) {
            return Err(network.report(CenError::SelfEdge));
        }
        let (src_in, dst_in, existing) = self.with_graph(|g| {
            (
                g.contains(src),
                g.contains(dst),
                g.edges.get(&format!("{}@{}", src.id(), dst.id())).cloned(),
            )
        })?;
        if !src_in || !dst_in {
            let missing = if src_in { dst } else { src };
            return Err(network.report(CenError::NotInContext {
                id: missing.id().to_string(),
            }));
        }
        if let Some(existing) = existing {
            return network.soft(
                CenError::DuplicateEdge {
                    src: src.id().to_string(),
                    dst: dst.id().to_string(),
                },
                existing,
            );
        }
        let me = self.me()?;
        let edge = Edge::link(&me, src.clone(), dst.clone());
        self.with_graph_mut(|g| g.edges.insert(edge.key(), edge.clone()))?;
        network.emit(|l| l.on_create_edge(&edge));
        Ok(edge)
    }

    /// Looks up the edge between two member nodes.
    pub fn get_edge(&self, src: &NodeRef, dst: &NodeRef) -> CenResult<Option<EdgeRef>> {
        let network = self.network()?;
        if Arc::ptr_eq(src, dst) {
            return network.soft(CenError::SelfEdge, None);
        }
        self.with_graph(|g| g.edges.get(&format!("{}@{}", src.id(), dst.id())).cloned())
    }

    /// Looks up the edge between two nodes, creating it (and adding missing
    /// endpoints to the context) if it does not exist.
    pub fn get_or_add_edge(self: &Arc<Self>, src: &NodeRef, dst: &NodeRef) -> CenResult<EdgeRef> {
        self.add_node_if_necessary(src)?;
        self.add_node_if_necessary(dst)?;
        match self.get_edge(src, dst)? {
            Some(edge) => Ok(edge),
            None => self.add_edge(src, dst),
        }
    }

    /// Removes the edge between two nodes; `Ok(None)` when no such edge
    /// exists.
    pub fn remove_edge(&self, src: &NodeRef, dst: &NodeRef) -> CenResult<Option<EdgeRef>> {
        let network = self.network()?;
        let Some(edge) = self.get_edge(src, dst)? else {
            return Ok(None);
        };
        network.emit(|l| l.on_remove_edge(&edge));
        self.with_graph_mut(|g| g.edges.remove(&edge.key()))?;
        Ok(Some(edge))
    }

    /// The edges arriving at `node`, lazily filtered.
    pub fn in_edges(&self, node: &NodeRef) -> CenResult<impl Iterator<Item = EdgeRef>> {
        let snapshot = self.incident_snapshot(node)?;
        let target = node.clone();
        Ok(snapshot
            .into_iter()
            .filter(move |e| Arc::ptr_eq(&e.dst(), &target)))
    }

    /// The edges leaving `node`, lazily filtered.
    pub fn out_edges(&self, node: &NodeRef) -> CenResult<impl Iterator<Item = EdgeRef>> {
        let snapshot = self.incident_snapshot(node)?;
        let source = node.clone();
        Ok(snapshot
            .into_iter()
            .filter(move |e| Arc::ptr_eq(&e.src(), &source)))
    }

    fn incident_snapshot(&self, node: &NodeRef) -> CenResult<Vec<EdgeRef>> {
        let network = self.network()?;
        let (member, edges) = self.with_graph(|g| {
            (
                g.contains(node),
                g.edges.values().cloned().collect::<Vec<_>>(),
            )
        })?;
        if !member {
            return network.soft(
                CenError::NotInContext {
                    id: node.id().to_string(),
                },
                Vec::new(),
            );
        }
        Ok(edges)
    }

    /// Cross-module data stored under `key`.
    pub fn module_data(&self, key: &str) -> Option<Payload> {
        self.module_data.lock().get(key).cloned()
    }

    /// Stores cross-module data under `key`; persisted with the context.
    pub fn set_module_data(&self, key: &str, payload: Payload) {
        self.module_data.lock().insert(key.to_string(), payload);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field(
                "data",
                &self.data.lock().as_ref().map(|d| d.kind().to_string()),
            )
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Persistent for Context {
    fn class_name(&self) -> &'static str {
        "Context"
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> CenResult<JsonMap> {
        let graph = self.graph.lock();
        let Some(graph) = graph.as_ref() else {
            return Err(CenError::Decode(
                "cannot encode an unloaded context".to_string(),
            ));
        };
        let mut doc = JsonMap::new();
        doc.insert(
            "data".to_string(),
            Payload::encode_opt(self.data.lock().as_ref()),
        );
        let mut edges = Vec::with_capacity(graph.edges.len());
        for edge in graph.edges.values() {
            edges.push(edge.encode_doc(enc)?);
        }
        doc.insert("edges".to_string(), Value::Array(edges));
        let nodes: Vec<Value> = graph
            .nodes
            .iter()
            .map(|node| {
                let any: AnyRef = node.clone();
                enc.reference(&any)
            })
            .collect();
        doc.insert("nodes".to_string(), Value::Array(nodes));
        if let Some(bag) = encode_module_data(&self.module_data.lock()) {
            doc.insert("moduleData".to_string(), bag);
        }
        Ok(doc)
    }

    fn decode(&self, doc: &JsonMap, dec: &Decoder<'_>) -> CenResult<()> {
        let network = self.network()?;
        let me = self.me()?;

        if let Some(value) = doc.get("data") {
            match Payload::from_document(value) {
                Ok(Some(data)) => *self.data.lock() = Some(data),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "kept context data on decode error"),
            }
        }

        let mut graph = ContextGraph::default();
        if let Some(Value::Array(entries)) = doc.get("nodes") {
            for entry in entries {
                match network.resolve_node(entry, dec) {
                    Ok(node) => {
                        if !graph.contains(&node) {
                            graph.nodes.push(node);
                        }
                    }
                    Err(err) => warn!(error = %err, "dropped unresolvable context member"),
                }
            }
        }
        if let Some(Value::Array(entries)) = doc.get("edges") {
            for entry in entries {
                match Edge::decode_doc(&me, entry, dec) {
                    Ok(edge) => {
                        graph.edges.insert(edge.key(), edge);
                    }
                    Err(err) => warn!(error = %err, "dropped malformed edge"),
                }
            }
        }
        let ego = network.ego_ref();
        if !graph.contains(&ego) {
            graph.nodes.insert(0, ego);
        }
        *self.graph.lock() = Some(graph);
        *self.module_data.lock() = decode_module_data(doc.get("moduleData"));
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
