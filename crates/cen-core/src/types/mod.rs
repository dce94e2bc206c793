//! Entities of the contextual ego network graph.

mod context;
mod edge;
mod interaction;
mod node;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

pub use context::{Context, ContextRef};
pub use edge::{Edge, EdgeRef};
pub use interaction::Interaction;
pub use node::{Node, NodeRef};

use crate::payload::Payload;
use crate::serialization::document::JsonMap;

/// Encodes a cross-module data bag; empty bags are omitted from documents.
pub(crate) fn encode_module_data(data: &BTreeMap<String, Payload>) -> Option<Value> {
    if data.is_empty() {
        return None;
    }
    let mut doc = JsonMap::new();
    for (key, payload) in data {
        doc.insert(key.clone(), payload.to_document());
    }
    Some(Value::Object(doc))
}

/// Decodes a cross-module data bag; malformed entries are dropped with a
/// warning, per the field-level failure policy.
pub(crate) fn decode_module_data(value: Option<&Value>) -> BTreeMap<String, Payload> {
    let mut data = BTreeMap::new();
    let Some(Value::Object(doc)) = value else {
        return data;
    };
    for (key, entry) in doc {
        match Payload::from_document(entry) {
            Ok(Some(payload)) => {
                data.insert(key.clone(), payload);
            }
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "dropped malformed module data entry"),
        }
    }
    data
}
