//! Opaque payloads carried by nodes, contexts and interactions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CenError, CenResult};
use crate::serialization::document::{KEY_CLASS, KEY_VALUE};

/// Opaque data attached to a node, context or interaction.
///
/// The core never interprets payloads; it only moves them between memory and
/// documents. A payload is a runtime type label (its *kind*) plus an
/// arbitrary JSON body, which is how domain schemas live outside the core
/// while still surviving a round-trip through storage.
///
/// Payload equality is structural (kind and body), which is what
/// [`get_or_create_context`](crate::ContextualEgoNetwork::get_or_create_context)
/// uses to select a context by its data.
///
/// # Examples
///
/// ```
/// use cen_core::Payload;
/// use serde_json::json;
///
/// let person = Payload::new("PersonData", json!({"first": "A", "surname": "B"}));
/// assert_eq!(person.kind(), "PersonData");
///
/// // A bare marker, such as an interaction label:
/// let handshake = Payload::label("HANDSHAKE");
/// assert_eq!(handshake.kind(), "HANDSHAKE");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    kind: String,
    body: Value,
}

impl Payload {
    /// Creates a payload with the given kind and JSON body.
    pub fn new(kind: impl Into<String>, body: Value) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Creates a bodiless marker payload; its kind is all it carries.
    pub fn label(kind: impl Into<String>) -> Self {
        Self::new(kind, Value::Null)
    }

    /// The payload's runtime type label.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The payload's JSON body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Encodes this payload as a self-describing document.
    ///
    /// Object bodies are flattened next to the `@class` tag; any other body
    /// (or an object carrying reserved keys of its own) is wrapped under
    /// `@value`.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(KEY_CLASS.to_string(), Value::String(self.kind.clone()));
        match &self.body {
            Value::Null => {}
            Value::Object(fields)
                if !fields.is_empty() && !fields.keys().any(|k| k.starts_with('@')) =>
            {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            other => {
                doc.insert(KEY_VALUE.to_string(), other.clone());
            }
        }
        Value::Object(doc)
    }

    /// Encodes an optional payload; absent payloads encode as `null`.
    pub fn encode_opt(payload: Option<&Payload>) -> Value {
        match payload {
            Some(p) => p.to_document(),
            None => Value::Null,
        }
    }

    /// Decodes a payload document produced by [`to_document`](Self::to_document).
    ///
    /// `null` decodes to `None`.
    ///
    /// # Errors
    ///
    /// [`CenError::Decode`] when the value is neither `null` nor an object
    /// tagged with `@class`.
    pub fn from_document(value: &Value) -> CenResult<Option<Payload>> {
        match value {
            Value::Null => Ok(None),
            Value::Object(doc) => {
                let kind = doc
                    .get(KEY_CLASS)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CenError::Decode("payload document is missing '@class'".to_string())
                    })?
                    .to_string();
                let body = if let Some(wrapped) = doc.get(KEY_VALUE) {
                    wrapped.clone()
                } else {
                    let fields: Map<String, Value> = doc
                        .iter()
                        .filter(|(k, _)| !k.starts_with('@'))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    if fields.is_empty() {
                        Value::Null
                    } else {
                        Value::Object(fields)
                    }
                };
                Ok(Some(Payload::new(kind, body)))
            }
            other => Err(CenError::Decode(format!(
                "expected a payload document, found {other}"
            ))),
        }
    }
}
