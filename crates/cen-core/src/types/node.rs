//! Participants of the social graph.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::error::CenResult;
use crate::network::NetworkInner;
use crate::payload::Payload;
use crate::serialization::document::JsonMap;
use crate::serialization::{Decoder, Encoder, Persistent};
use crate::types::{decode_module_data, encode_module_data};

/// Shared handle to a [`Node`]. All contexts reference the same instance for
/// the same id.
pub type NodeRef = Arc<Node>;

/// A participant in the social graph.
///
/// Node identity is global: the network hands out one instance per id, and
/// every context membership is a reference to that instance. Create nodes
/// through
/// [`ContextualEgoNetwork::get_or_create_node`](crate::ContextualEgoNetwork::get_or_create_node).
///
/// A node carries an opaque [`Payload`] and a cross-module data bag for
/// extensions that need to piggyback state on graph entities.
pub struct Node {
    network: Weak<NetworkInner>,
    id: String,
    data: Mutex<Option<Payload>>,
    module_data: Mutex<BTreeMap<String, Payload>>,
}

impl Node {
    pub(crate) fn create(
        network: &Arc<NetworkInner>,
        id: &str,
        data: Option<Payload>,
    ) -> NodeRef {
        Arc::new(Self {
            network: Arc::downgrade(network),
            id: id.to_string(),
            data: Mutex::new(data),
            module_data: Mutex::new(BTreeMap::new()),
        })
    }

    /// An empty node materialized from an `@id` reference; its fields arrive
    /// with the next reload.
    pub(crate) fn shell(network: &Arc<NetworkInner>, id: &str) -> NodeRef {
        Self::create(network, id, None)
    }

    /// The node's global identifier, also its serialization id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The data attached to the node.
    pub fn data(&self) -> Option<Payload> {
        self.data.lock().clone()
    }

    /// Cross-module data stored under `key`.
    pub fn module_data(&self, key: &str) -> Option<Payload> {
        self.module_data.lock().get(key).cloned()
    }

    /// Stores cross-module data under `key`, replacing any previous entry.
    /// The bag is persisted with the node.
    pub fn set_module_data(&self, key: &str, payload: Payload) {
        self.module_data.lock().insert(key.to_string(), payload);
    }

    /// Whether this node was created by the given network.
    pub(crate) fn belongs_to(&self, network: &Arc<NetworkInner>) -> bool {
        std::ptr::eq(self.network.as_ptr(), Arc::as_ptr(network))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}

impl Persistent for Node {
    fn class_name(&self) -> &'static str {
        "Node"
    }

    fn encode(&self, _enc: &mut Encoder<'_>) -> CenResult<JsonMap> {
        let mut doc = JsonMap::new();
        doc.insert(
            "data".to_string(),
            Payload::encode_opt(self.data.lock().as_ref()),
        );
        doc.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(bag) = encode_module_data(&self.module_data.lock()) {
            doc.insert("moduleData".to_string(), bag);
        }
        Ok(doc)
    }

    fn decode(&self, doc: &JsonMap, _dec: &Decoder<'_>) -> CenResult<()> {
        if let Some(Value::String(id)) = doc.get("id") {
            if id != &self.id {
                warn!(expected = %self.id, found = %id, "node document id mismatch");
            }
        }
        if let Some(value) = doc.get("data") {
            match Payload::from_document(value) {
                Ok(data) => *self.data.lock() = data,
                Err(err) => warn!(id = %self.id, error = %err, "kept node data on decode error"),
            }
        }
        *self.module_data.lock() = decode_module_data(doc.get("moduleData"));
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
