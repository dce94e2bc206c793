//! Directed edges between context members.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::error::{CenError, CenResult};
use crate::payload::Payload;
use crate::serialization::document::{self, JsonMap, KEY_CLASS};
use crate::serialization::{AnyRef, Decoder, Encoder};
use crate::types::context::{Context, ContextRef};
use crate::types::interaction::Interaction;
use crate::types::node::NodeRef;
use crate::types::{decode_module_data, encode_module_data};

/// Shared handle to an [`Edge`].
pub type EdgeRef = Arc<Edge>;

/// A directed edge of the social graph, owned by exactly one context.
///
/// Both endpoints are members of that context and distinct; at most one edge
/// exists per ordered (source, destination) pair. The structural fields are
/// immutable — an edge accumulates [`Interaction`]s but never changes its
/// endpoints.
pub struct Edge {
    context: Weak<Context>,
    src: NodeRef,
    dst: NodeRef,
    interactions: Mutex<Vec<Interaction>>,
    module_data: Mutex<BTreeMap<String, Payload>>,
}

impl Edge {
    pub(crate) fn link(context: &Arc<Context>, src: NodeRef, dst: NodeRef) -> EdgeRef {
        Arc::new(Self {
            context: Arc::downgrade(context),
            src,
            dst,
            interactions: Mutex::new(Vec::new()),
            module_data: Mutex::new(BTreeMap::new()),
        })
    }

    /// The edge collection key, `"<src.id>@<dst.id>"`.
    pub(crate) fn key(&self) -> String {
        format!("{}@{}", self.src.id(), self.dst.id())
    }

    /// The source node.
    pub fn src(&self) -> NodeRef {
        self.src.clone()
    }

    /// The destination node.
    pub fn dst(&self) -> NodeRef {
        self.dst.clone()
    }

    /// The context the edge belongs to, while it is alive.
    pub fn context(&self) -> Option<ContextRef> {
        self.context.upgrade()
    }

    fn require_context(&self) -> CenResult<ContextRef> {
        self.context.upgrade().ok_or(CenError::NetworkGone)
    }

    /// The network's ego when it is one of this edge's endpoints.
    pub fn ego(&self) -> Option<NodeRef> {
        let context = self.context.upgrade()?;
        let ego = context.network().ok()?.ego_ref();
        if Arc::ptr_eq(&ego, &self.src) || Arc::ptr_eq(&ego, &self.dst) {
            Some(ego)
        } else {
            None
        }
    }

    /// The endpoint that is not the ego.
    ///
    /// # Errors
    ///
    /// [`CenError::NoEgoEndpoint`] when the ego is not an endpoint of this
    /// edge.
    pub fn alter(&self) -> CenResult<NodeRef> {
        let context = self.require_context()?;
        let network = context.network()?;
        let ego = network.ego_ref();
        if Arc::ptr_eq(&ego, &self.src) {
            Ok(self.dst.clone())
        } else if Arc::ptr_eq(&ego, &self.dst) {
            Ok(self.src.clone())
        } else {
            Err(network.report(CenError::NoEgoEndpoint))
        }
    }

    /// Records an interaction on this edge.
    ///
    /// # Errors
    ///
    /// [`CenError::NegativeTime`] when `start_time` or `duration` is
    /// negative.
    pub fn add_interaction(
        self: &Arc<Self>,
        start_time: i64,
        duration: i64,
        data: Option<Payload>,
    ) -> CenResult<Interaction> {
        let context = self.require_context()?;
        let network = context.network()?;
        if start_time < 0 || duration < 0 {
            return Err(network.report(CenError::NegativeTime));
        }
        let interaction = Interaction::record(Arc::downgrade(self), start_time, duration, data);
        self.interactions.lock().push(interaction.clone());
        network.emit(|l| l.on_create_interaction(&interaction));
        Ok(interaction)
    }

    /// Records an interaction with no duration at the current timestamp.
    pub fn add_detected_interaction(self: &Arc<Self>, data: Option<Payload>) -> CenResult<Interaction> {
        self.add_interaction(Utc::now().timestamp_millis(), 0, data)
    }

    /// A shallow copy of the edge's interaction list, in insertion order.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.interactions.lock().clone()
    }

    /// Cross-module data stored under `key`.
    pub fn module_data(&self, key: &str) -> Option<Payload> {
        self.module_data.lock().get(key).cloned()
    }

    /// Stores cross-module data under `key`; persisted with the context.
    pub fn set_module_data(&self, key: &str, payload: Payload) {
        self.module_data.lock().insert(key.to_string(), payload);
    }

    /// Encodes this edge as an inline composite document.
    pub(crate) fn encode_doc(&self, enc: &mut Encoder<'_>) -> CenResult<Value> {
        let mut doc = JsonMap::new();
        let src_ref: AnyRef = self.src.clone();
        let dst_ref: AnyRef = self.dst.clone();
        doc.insert(KEY_CLASS.to_string(), Value::String("Edge".to_string()));
        doc.insert("dst".to_string(), enc.reference(&dst_ref));
        let interactions: Vec<Value> = self
            .interactions
            .lock()
            .iter()
            .map(|interaction| {
                let mut idoc = JsonMap::new();
                idoc.insert(KEY_CLASS.to_string(), Value::String("Interaction".to_string()));
                idoc.insert(
                    "data".to_string(),
                    Payload::encode_opt(interaction.data()),
                );
                idoc.insert(
                    "duration".to_string(),
                    document::encode_i64(interaction.duration()),
                );
                idoc.insert(
                    "startTime".to_string(),
                    document::encode_i64(interaction.start_time()),
                );
                Value::Object(idoc)
            })
            .collect();
        doc.insert("interactions".to_string(), Value::Array(interactions));
        doc.insert("src".to_string(), enc.reference(&src_ref));
        if let Some(bag) = encode_module_data(&self.module_data.lock()) {
            doc.insert("moduleData".to_string(), bag);
        }
        Ok(Value::Object(doc))
    }

    /// Rebuilds an edge (and its interactions) from an inline composite
    /// document, wiring the back-reference to the owning context.
    pub(crate) fn decode_doc(
        context: &Arc<Context>,
        value: &Value,
        dec: &Decoder<'_>,
    ) -> CenResult<EdgeRef> {
        let network = context.network()?;
        let doc = document::as_object(value)?;
        document::expect_class(value, "Edge")?;
        let src = network.resolve_node(
            doc.get("src")
                .ok_or_else(|| CenError::Decode("edge document has no 'src'".to_string()))?,
            dec,
        )?;
        let dst = network.resolve_node(
            doc.get("dst")
                .ok_or_else(|| CenError::Decode("edge document has no 'dst'".to_string()))?,
            dec,
        )?;
        let edge = Edge::link(context, src, dst);
        if let Some(Value::Array(entries)) = doc.get("interactions") {
            let mut interactions = edge.interactions.lock();
            for entry in entries {
                match Self::decode_interaction(&edge, entry) {
                    Ok(interaction) => interactions.push(interaction),
                    Err(err) => {
                        warn!(edge = %edge.key(), error = %err, "dropped malformed interaction")
                    }
                }
            }
        }
        *edge.module_data.lock() = decode_module_data(doc.get("moduleData"));
        Ok(edge)
    }

    fn decode_interaction(edge: &EdgeRef, value: &Value) -> CenResult<Interaction> {
        let doc = document::as_object(value)?;
        document::expect_class(value, "Interaction")?;
        let start_time = document::decode_i64(
            doc.get("startTime")
                .ok_or_else(|| CenError::Decode("interaction has no 'startTime'".to_string()))?,
        )?;
        let duration = document::decode_i64(
            doc.get("duration")
                .ok_or_else(|| CenError::Decode("interaction has no 'duration'".to_string()))?,
        )?;
        let data = Payload::from_document(doc.get("data").unwrap_or(&Value::Null))?;
        Ok(Interaction::record(
            Arc::downgrade(edge),
            start_time,
            duration,
            data,
        ))
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("src", &self.src.id())
            .field("dst", &self.dst.id())
            .field("interactions", &self.interactions.lock().len())
            .finish()
    }
}
