//! The root aggregate of the contextual ego network.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use cen_storage::Storage;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::NetworkConfig;
use crate::error::{CenError, CenResult};
use crate::listeners::NetworkListener;
use crate::payload::Payload;
use crate::serialization::document::{self, JsonMap};
use crate::serialization::{AnyRef, Decoder, Encoder, Persistent, Serializer};
use crate::types::{Context, ContextRef, Node, NodeRef};

/// Serialization id of the root document.
const ROOT_ID: &str = "CEN";
/// File name of the root document.
const ROOT_FILE: &str = "CEN.json";

/// A persistent, in-memory model of a contextual ego network: a multi-layer
/// directed social graph centered on a single ego participant.
///
/// The network exclusively owns the ego node, the alter list, the contexts
/// and the serializer bound to its storage root. Handles are cheap to clone;
/// they all point at the same network.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use cen_core::{ContextualEgoNetwork, Payload};
/// use cen_storage::FileStorage;
/// use serde_json::json;
///
/// let storage = Arc::new(FileStorage::open("ego-data/alice").unwrap());
/// let network = ContextualEgoNetwork::create_or_load(
///     storage,
///     "alice",
///     Some(Payload::new("PersonData", json!({"first": "Alice"}))),
/// )
/// .unwrap();
///
/// let home = network.get_or_create_context(Payload::label("home")).unwrap();
/// let bob = network.get_or_create_node("bob", None).unwrap();
/// home.add_node(&bob).unwrap();
/// let edge = home.add_edge(&network.ego(), &bob).unwrap();
/// edge.add_detected_interaction(Some(Payload::label("HANDSHAKE"))).unwrap();
/// network.save().unwrap();
/// ```
#[derive(Clone)]
pub struct ContextualEgoNetwork {
    inner: Arc<NetworkInner>,
}

/// Shared state of the network, registered with the serializer as `"CEN"`.
pub(crate) struct NetworkInner {
    me: Weak<NetworkInner>,
    config: NetworkConfig,
    serializer: Serializer,
    ego: Mutex<Option<NodeRef>>,
    alters: Mutex<Vec<NodeRef>>,
    contexts: Mutex<Vec<ContextRef>>,
    current: Mutex<Weak<Context>>,
    listeners: Mutex<Vec<Arc<dyn NetworkListener>>>,
}

impl ContextualEgoNetwork {
    /// Opens the network stored under `storage`, or creates a new one with a
    /// fresh ego node when no root document exists there.
    ///
    /// `ego_data` is only used when a new network is created. Attach
    /// listeners immediately after this call; they are not persisted.
    pub fn create_or_load(
        storage: Arc<dyn Storage>,
        ego_name: &str,
        ego_data: Option<Payload>,
    ) -> CenResult<Self> {
        Self::create_or_load_with_config(storage, ego_name, ego_data, NetworkConfig::default())
    }

    /// [`create_or_load`](Self::create_or_load) with an explicit
    /// configuration.
    pub fn create_or_load_with_config(
        storage: Arc<dyn Storage>,
        ego_name: &str,
        ego_data: Option<Payload>,
        config: NetworkConfig,
    ) -> CenResult<Self> {
        config.validate()?;
        if ego_name.is_empty() {
            return Err(CenError::EmptyNodeId);
        }
        let development = config.development;
        let inner = Arc::new_cyclic(|me| NetworkInner {
            me: me.clone(),
            serializer: Serializer::new(storage.clone(), development),
            config,
            ego: Mutex::new(None),
            alters: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            current: Mutex::new(Weak::new()),
            listeners: Mutex::new(Vec::new()),
        });
        let root: AnyRef = inner.clone();
        let network = Self {
            inner: inner.clone(),
        };

        if storage.exists(ROOT_FILE) {
            inner.serializer.register_with_id(&root, ROOT_ID)?;
            inner.serializer.reload(&root)?;
            let ego = inner.ego.lock().clone().ok_or_else(|| {
                CenError::Decode("root document does not reference an ego".to_string())
            })?;
            let ego_any: AnyRef = ego;
            inner.serializer.reload(&ego_any)?;
            for alter in inner.alters.lock().clone() {
                let any: AnyRef = alter;
                inner.serializer.reload(&any)?;
            }
            // context shells stay unloaded; keep the universal save away
            // from them until they are loaded again
            for context in inner.contexts.lock().clone() {
                if !context.is_loaded() {
                    let any: AnyRef = context;
                    inner.serializer.set_save_permission(&any, false)?;
                }
            }
            debug!(ego = %network.ego().id(), "loaded contextual ego network");
        } else {
            inner.serializer.remove_previous_saved()?;
            let ego = Node::create(&inner, ego_name, ego_data);
            let any: AnyRef = ego.clone();
            inner.serializer.register_with_id(&any, ego_name)?;
            *inner.ego.lock() = Some(ego);
            inner.serializer.register_with_id(&root, ROOT_ID)?;
            network.save()?;
            debug!(ego = %ego_name, "created contextual ego network");
        }
        Ok(network)
    }

    /// The ego node the network is centered on.
    pub fn ego(&self) -> NodeRef {
        self.inner.ego_ref()
    }

    /// A shallow copy of the alter list (the ego is not an alter).
    pub fn alters(&self) -> Vec<NodeRef> {
        self.inner.alters.lock().clone()
    }

    /// A shallow copy of the context list.
    pub fn contexts(&self) -> Vec<ContextRef> {
        self.inner.contexts.lock().clone()
    }

    /// The network's configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// Looks up the node with the given id, creating it (with `data`) if no
    /// such node exists. Creation appends the node to the alter list and
    /// emits `on_create_node`.
    pub fn get_or_create_node(&self, id: &str, data: Option<Payload>) -> CenResult<NodeRef> {
        if id.is_empty() {
            return Err(self.inner.report(CenError::EmptyNodeId));
        }
        if let Some(node) = self.inner.serializer.typed::<Node>(id) {
            return Ok(node);
        }
        let node = Node::create(&self.inner, id, data);
        let any: AnyRef = node.clone();
        self.inner.serializer.register_with_id(&any, id)?;
        self.inner.alters.lock().push(node.clone());
        self.inner.emit(|l| l.on_create_node(&node));
        Ok(node)
    }

    /// Removes the node with the given id from every context (loading and
    /// re-unloading unloaded ones on demand), from the alter list, from the
    /// serializer and from storage. Does nothing when no such node exists.
    ///
    /// The network is forcefully saved afterwards, so the removal cannot be
    /// undone by a missed save.
    pub fn remove_node_if_exists(&self, id: &str) -> CenResult<()> {
        let Some(node) = self.inner.serializer.typed::<Node>(id) else {
            return Ok(());
        };
        if Arc::ptr_eq(&node, &self.inner.ego_ref()) {
            return self.inner.soft(CenError::EgoRemoval, ());
        }
        for context in self.contexts() {
            let was_loaded = context.is_loaded();
            context.remove_node_if_exists(&node)?;
            if !was_loaded {
                context.cleanup()?;
            }
        }
        self.inner.emit(|l| l.on_remove_node(&node));
        self.inner
            .alters
            .lock()
            .retain(|alter| !Arc::ptr_eq(alter, &node));
        let any: AnyRef = node.clone();
        self.inner.serializer.remove_from_storage(&any)?;
        self.inner.serializer.unregister(&any);
        self.save()
    }

    /// Returns the context whose data equals `data`, creating one if none
    /// matches. The scan loads unloaded contexts on demand; creation emits
    /// `on_create_context`.
    pub fn get_or_create_context(&self, data: Payload) -> CenResult<ContextRef> {
        for context in self.contexts() {
            match context.data() {
                Ok(existing) if existing == data => return Ok(context),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "skipped a context that failed to load"),
            }
        }
        let context = Context::create(&self.inner, data);
        self.inner.contexts.lock().push(context.clone());
        self.inner.emit(|l| l.on_create_context(&context));
        Ok(context)
    }

    /// Finds a context by the serialization id it was assigned on creation.
    pub fn get_context_by_serialization_id(&self, id: &str) -> CenResult<Option<ContextRef>> {
        for context in self.contexts() {
            if context.serialization_id()? == id {
                return Ok(Some(context));
            }
        }
        Ok(None)
    }

    /// Removes a context from the network and deletes its file.
    ///
    /// Nodes stay in the network even when no other context references them.
    /// Clears the current context if it pointed at the removed one, then
    /// forcefully saves the network.
    pub fn remove_context(&self, context: &ContextRef) -> CenResult<()> {
        let member = self.contexts().iter().any(|c| Arc::ptr_eq(c, context));
        if !member {
            return self.inner.soft(CenError::ForeignContext, ());
        }
        self.inner.emit(|l| l.on_remove_context(context));
        {
            let mut current = self.inner.current.lock();
            if current.as_ptr() == Arc::as_ptr(context) {
                *current = Weak::new();
            }
        }
        self.inner
            .contexts
            .lock()
            .retain(|c| !Arc::ptr_eq(c, context));
        context.remove_from_storage()?;
        let any: AnyRef = context.clone();
        self.inner.serializer.unregister(&any);
        self.save()
    }

    /// Marks a member context as the current one.
    pub fn set_current(&self, context: &ContextRef) -> CenResult<()> {
        let member = self.contexts().iter().any(|c| Arc::ptr_eq(c, context));
        if !member {
            return self.inner.soft(CenError::ForeignContext, ());
        }
        *self.inner.current.lock() = Arc::downgrade(context);
        Ok(())
    }

    /// The current context, if one is set and still part of the network.
    pub fn current_context(&self) -> Option<ContextRef> {
        self.inner.current.lock().upgrade()
    }

    /// Saves every registered entity whose save permission is on — the root
    /// document, the nodes and every loaded context (unloaded contexts were
    /// already saved by their `cleanup`). Emits `on_save_context` for each
    /// loaded context.
    pub fn save(&self) -> CenResult<()> {
        self.inner.serializer.save_all_registered()?;
        for context in self.contexts() {
            if context.is_loaded() {
                self.inner.emit(|l| l.on_save_context(&context));
            }
        }
        Ok(())
    }

    /// Applies [`Context::cleanup`] to every context. Unsaved changes are
    /// persisted on the way out.
    pub fn cleanup(&self) -> CenResult<()> {
        for context in self.contexts() {
            context.cleanup()?;
        }
        Ok(())
    }

    /// Attaches a listener; its `init` hook runs immediately. Listeners are
    /// invoked in registration order and are not persisted.
    pub fn add_listener(&self, listener: Arc<dyn NetworkListener>) {
        self.inner.listeners.lock().push(listener.clone());
        listener.init(self);
    }

    /// The serializer owning this network's registry and storage.
    pub(crate) fn serializer(&self) -> &Serializer {
        &self.inner.serializer
    }

    /// The root as a registered object, for saving the root document.
    pub(crate) fn root_ref(&self) -> AnyRef {
        self.inner.clone()
    }

    /// A non-owning handle, for listeners that must not keep the network
    /// alive (the listener list and an owning handle would form a cycle).
    pub(crate) fn downgrade(&self) -> WeakNetwork {
        WeakNetwork {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning counterpart of [`ContextualEgoNetwork`].
pub(crate) struct WeakNetwork {
    inner: Weak<NetworkInner>,
}

impl WeakNetwork {
    pub(crate) fn upgrade(&self) -> Option<ContextualEgoNetwork> {
        self.inner
            .upgrade()
            .map(|inner| ContextualEgoNetwork { inner })
    }

    /// Whether this handle points at the given network.
    pub(crate) fn is(&self, network: &ContextualEgoNetwork) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&network.inner))
    }
}

impl std::fmt::Debug for ContextualEgoNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextualEgoNetwork")
            .field("ego", &self.inner.ego.lock().as_ref().map(|n| n.id().to_string()))
            .field("contexts", &self.inner.contexts.lock().len())
            .field("alters", &self.inner.alters.lock().len())
            .finish()
    }
}

impl NetworkInner {
    pub(crate) fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// The ego node. Set during construction, before the network is handed
    /// to callers.
    pub(crate) fn ego_ref(&self) -> NodeRef {
        self.ego
            .lock()
            .clone()
            .expect("the ego node is set during network construction")
    }

    /// Applies the escalation policy to a suppressible error: raised in
    /// development, logged with a neutral outcome in production.
    pub(crate) fn soft<T>(&self, err: CenError, fallback: T) -> CenResult<T> {
        if self.config.development {
            Err(err)
        } else {
            warn!(error = %err, "suppressed error");
            Ok(fallback)
        }
    }

    /// Logs an unconditionally raised error in production mode and returns
    /// it for propagation.
    pub(crate) fn report(&self, err: CenError) -> CenError {
        if !self.config.development {
            warn!(error = %err, "operation failed");
        }
        err
    }

    /// Invokes `f` on a snapshot of the listener list, in registration
    /// order. A panicking listener is logged and skipped; the rest still run.
    pub(crate) fn emit(&self, f: impl Fn(&dyn NetworkListener)) {
        let snapshot: Vec<Arc<dyn NetworkListener>> = self.listeners.lock().clone();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(&*listener))).is_err() {
                error!("a listener callback panicked; continuing with the remaining listeners");
            }
        }
    }

    /// Resolves a node reference, materializing and registering a shell when
    /// the id is not yet bound; fresh shells reload at the decoder's
    /// remaining depth.
    pub(crate) fn resolve_node(&self, value: &Value, dec: &Decoder<'_>) -> CenResult<NodeRef> {
        document::expect_class(value, "Node")?;
        let id = document::ref_id(value)?;
        if let Some(node) = dec.serializer().typed::<Node>(id) {
            return Ok(node);
        }
        let me = self.me.upgrade().ok_or(CenError::NetworkGone)?;
        let node = Node::shell(&me, id);
        let any: AnyRef = node.clone();
        dec.serializer().register_with_id(&any, id)?;
        if dec.depth() > 0 {
            dec.serializer().reload_with_depth(&any, dec.depth() - 1)?;
        }
        Ok(node)
    }

    /// Resolves a context reference, materializing an unloaded shell when the
    /// id is not yet bound.
    pub(crate) fn resolve_context(&self, value: &Value, dec: &Decoder<'_>) -> CenResult<ContextRef> {
        document::expect_class(value, "Context")?;
        let id = document::ref_id(value)?;
        if let Some(context) = dec.serializer().typed::<Context>(id) {
            return Ok(context);
        }
        let me = self.me.upgrade().ok_or(CenError::NetworkGone)?;
        let context = Context::shell(&me);
        let any: AnyRef = context.clone();
        dec.serializer().register_with_id(&any, id)?;
        if dec.depth() > 0 {
            dec.serializer().reload_with_depth(&any, dec.depth() - 1)?;
        }
        Ok(context)
    }
}

impl Persistent for NetworkInner {
    fn class_name(&self) -> &'static str {
        "ContextualEgoNetwork"
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> CenResult<JsonMap> {
        let mut doc = JsonMap::new();
        let alters: Vec<Value> = self
            .alters
            .lock()
            .iter()
            .map(|alter| {
                let any: AnyRef = alter.clone();
                enc.reference(&any)
            })
            .collect();
        doc.insert("alters".to_string(), Value::Array(alters));
        let contexts: Vec<Value> = self
            .contexts
            .lock()
            .iter()
            .map(|context| {
                let any: AnyRef = context.clone();
                enc.reference(&any)
            })
            .collect();
        doc.insert("contexts".to_string(), Value::Array(contexts));
        let current = match self.current.lock().upgrade() {
            Some(context) => {
                let any: AnyRef = context;
                enc.reference(&any)
            }
            None => Value::Null,
        };
        doc.insert("currentContext".to_string(), current);
        let ego: AnyRef = self.ego_ref();
        doc.insert("ego".to_string(), enc.reference(&ego));
        Ok(doc)
    }

    fn decode(&self, doc: &JsonMap, dec: &Decoder<'_>) -> CenResult<()> {
        match doc.get("ego") {
            Some(value) => {
                let ego = self.resolve_node(value, dec)?;
                *self.ego.lock() = Some(ego);
            }
            None => {
                return Err(CenError::Decode(
                    "root document does not reference an ego".to_string(),
                ))
            }
        }
        let mut alters = Vec::new();
        if let Some(Value::Array(entries)) = doc.get("alters") {
            for entry in entries {
                match self.resolve_node(entry, dec) {
                    Ok(node) => alters.push(node),
                    Err(err) => warn!(error = %err, "dropped unresolvable alter"),
                }
            }
        }
        *self.alters.lock() = alters;

        let mut contexts = Vec::new();
        if let Some(Value::Array(entries)) = doc.get("contexts") {
            for entry in entries {
                match self.resolve_context(entry, dec) {
                    Ok(context) => contexts.push(context),
                    Err(err) => warn!(error = %err, "dropped unresolvable context"),
                }
            }
        }
        *self.contexts.lock() = contexts;

        let current = match doc.get("currentContext") {
            Some(value) if !value.is_null() => {
                let id = document::ref_id(value)?;
                match dec.serializer().typed::<Context>(id) {
                    Some(context) => Arc::downgrade(&context),
                    None => {
                        warn!(id = %id, "current context is not part of the network");
                        Weak::new()
                    }
                }
            }
            _ => Weak::new(),
        };
        *self.current.lock() = current;
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
