//! The typed-codec seam between entities and the serializer.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CenResult;
use crate::serialization::document::{JsonMap, KEY_CLASS, KEY_ID};
use crate::serialization::Serializer;

/// A registered object the serializer can persist to its own file.
///
/// Each implementor is one explicit codec: `encode` produces the document's
/// field map, `decode` applies a field map to the existing object in place.
/// In-place decoding is what makes partial reload work; references held by
/// other entities stay valid across a reload.
pub trait Persistent: Any + Send + Sync {
    /// The `@class` name written into documents.
    fn class_name(&self) -> &'static str;

    /// Encodes the object's fields (without the `@id`/`@class` envelope).
    fn encode(&self, enc: &mut Encoder<'_>) -> CenResult<JsonMap>;

    /// Applies a field map to this object, updating fields in place.
    ///
    /// A malformed field is logged and left at its previous value; only
    /// structural failures (a document that is not usable at all) should
    /// surface as errors.
    fn decode(&self, doc: &JsonMap, dec: &Decoder<'_>) -> CenResult<()>;

    /// Upcast used by the registry for typed lookups.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to any registered object.
pub type AnyRef = Arc<dyn Persistent>;

/// Identity key of a registered object: the address of its shared state.
pub(crate) fn object_key(obj: &AnyRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

/// Walk state for one `save` call.
///
/// Tracks which registered ids have already had their `@class` inlined, so a
/// reference carries the class only on its first occurrence in the document.
pub struct Encoder<'a> {
    serializer: &'a Serializer,
    known_classes: HashSet<String>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(serializer: &'a Serializer) -> Self {
        Self {
            serializer,
            known_classes: HashSet::new(),
        }
    }

    /// The serializer driving this walk.
    pub fn serializer(&self) -> &Serializer {
        self.serializer
    }

    /// Marks the document root so self-references stay bare `@id`s.
    pub(crate) fn mark_known(&mut self, id: &str) {
        self.known_classes.insert(id.to_string());
    }

    /// Encodes a reference to a registered object.
    ///
    /// Emits `{"@id": id}` with `@class` inlined on the first occurrence of
    /// that id within the current save. Unregistered objects are registered
    /// under a fresh id on the way through.
    pub fn reference(&mut self, obj: &AnyRef) -> Value {
        let id = self.serializer.register(obj);
        let mut doc = JsonMap::new();
        if self.known_classes.insert(id.clone()) {
            doc.insert(KEY_CLASS.to_string(), Value::String(obj.class_name().to_string()));
        }
        doc.insert(KEY_ID.to_string(), Value::String(id));
        Value::Object(doc)
    }
}

/// Walk state for one `reload` call.
///
/// Carries the remaining reload depth: resolving a reference to an object
/// that is not yet registered constructs a shell for it and, while depth
/// remains, reloads that shell from its own file at depth minus one.
pub struct Decoder<'a> {
    serializer: &'a Serializer,
    depth: u32,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(serializer: &'a Serializer, depth: u32) -> Self {
        Self { serializer, depth }
    }

    /// The serializer driving this walk.
    pub fn serializer(&self) -> &Serializer {
        self.serializer
    }

    /// Remaining levels of loading demand; zero means do not recurse.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}
