//! The self-describing document grammar.
//!
//! A document is a JSON object. Four keys are reserved:
//!
//! | Key      | Meaning                                                        |
//! |----------|----------------------------------------------------------------|
//! | `@id`    | Stable identity of a registered object (cross-document ref)    |
//! | `@class` | Runtime type name                                              |
//! | `@value` | Primitive representation of a wrapped value                    |
//! | `@par`   | Back-reference N steps up the decode stack (rejected here; the |
//! |          | entity codecs rebuild the only structural cycle directly)      |
//!
//! Every other key is a field name. Arrays denote ordered sequences,
//! string-keyed objects denote mappings, and primitives are encoded as
//! strings so a document never depends on JSON number semantics.

use serde_json::{Map, Value};

use crate::error::{CenError, CenResult};

/// Stable identity of a registered object.
pub const KEY_ID: &str = "@id";
/// Runtime type name.
pub const KEY_CLASS: &str = "@class";
/// Primitive representation of a wrapped value.
pub const KEY_VALUE: &str = "@value";
/// Positional back-reference up the decode stack.
pub const KEY_PAR: &str = "@par";

/// Alias for a JSON object map (key-sorted, so file bytes are stable).
pub type JsonMap = Map<String, Value>;

/// Encodes an integer as its string form.
pub fn encode_i64(value: i64) -> Value {
    Value::String(value.to_string())
}

/// Decodes an integer from its string form.
///
/// Accepts the `{"@class", "@value"}` wrapped shape and, leniently, a bare
/// JSON number written by a foreign producer.
pub fn decode_i64(value: &Value) -> CenResult<i64> {
    match value {
        Value::String(text) => text
            .parse::<i64>()
            .map_err(|e| CenError::Decode(format!("malformed integer '{text}': {e}"))),
        Value::Number(num) => num
            .as_i64()
            .ok_or_else(|| CenError::Decode(format!("non-integral number {num}"))),
        Value::Object(doc) => match doc.get(KEY_VALUE) {
            Some(wrapped) => decode_i64(wrapped),
            None if doc.contains_key(KEY_PAR) => Err(CenError::Decode(
                "'@par' back-references are not supported".to_string(),
            )),
            None => Err(CenError::Decode("expected a wrapped integer".to_string())),
        },
        other => Err(CenError::Decode(format!("expected an integer, found {other}"))),
    }
}

/// Extracts the `@id` of a reference document.
pub fn ref_id(value: &Value) -> CenResult<&str> {
    value
        .as_object()
        .and_then(|doc| doc.get(KEY_ID))
        .and_then(Value::as_str)
        .ok_or_else(|| CenError::Decode(format!("expected an '@id' reference, found {value}")))
}

/// The `@class` carried by a document, if any.
pub fn class_of(value: &Value) -> Option<&str> {
    value
        .as_object()
        .and_then(|doc| doc.get(KEY_CLASS))
        .and_then(Value::as_str)
}

/// Views a value as a document map.
pub fn as_object(value: &Value) -> CenResult<&JsonMap> {
    value
        .as_object()
        .ok_or_else(|| CenError::Decode(format!("expected a document, found {value}")))
}

/// Checks a reference's inline `@class` against the expected entity class.
///
/// References without an inline class are accepted; the registry entry is
/// authoritative in that case.
pub fn expect_class(value: &Value, expected: &'static str) -> CenResult<()> {
    match class_of(value) {
        None => Ok(()),
        Some(class) if class == expected => Ok(()),
        Some(class) => Err(CenError::UnknownClass {
            class: class.to_string(),
        }),
    }
}
