//! Identity-preserving object-graph serialization.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Instant;

use cen_storage::{Storage, StorageError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CenError, CenResult};
use crate::payload::Payload;
use crate::serialization::document::{JsonMap, KEY_CLASS, KEY_ID};
use crate::serialization::persistent::{object_key, AnyRef, Decoder, Encoder, Persistent};

/// Registry state: a bijection between serialization ids and live objects,
/// plus the per-object save-permission flags.
///
/// Objects are held weakly: the network owns its entities (and the root owns
/// the serializer), so owning registry entries would keep the whole graph
/// alive in a cycle. An entry whose object has been dropped behaves as
/// absent.
#[derive(Default)]
struct Registry {
    by_id: HashMap<String, Weak<dyn Persistent>>,
    ids: HashMap<usize, String>,
    save_disabled: HashSet<usize>,
}

/// Serializes registered objects to one document file each, with the
/// capability of reloading only parts of the object graph and saving only
/// particular objects.
///
/// An object becomes *registered* — referenced by id from other documents and
/// persisted to `<id>.json` under the storage root — through
/// [`register`](Self::register) (fresh UUID) or
/// [`register_with_id`](Self::register_with_id) (caller-chosen id). The
/// registry is a bijection at all times.
///
/// All entry points serialize against one internal lock, making concurrent
/// use safe but effectively sequential; the entities themselves remain
/// single-threaded property of their network.
pub struct Serializer {
    storage: Arc<dyn Storage>,
    development: bool,
    registry: Mutex<Registry>,
}

impl Serializer {
    /// Creates a serializer bound to a storage root.
    pub fn new(storage: Arc<dyn Storage>, development: bool) -> Self {
        Self {
            storage,
            development,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// The storage this serializer writes through.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn file_name(id: &str) -> String {
        format!("{id}.json")
    }

    /// Applies the escalation policy to a suppressible error.
    fn soft<T>(&self, err: CenError, fallback: T) -> CenResult<T> {
        if self.development {
            Err(err)
        } else {
            warn!(error = %err, "suppressed serializer error");
            Ok(fallback)
        }
    }

    /// Returns the object's id, registering it under a fresh UUID if needed.
    pub fn register(&self, obj: &AnyRef) -> String {
        let mut registry = self.registry.lock();
        if let Some(id) = registry.ids.get(&object_key(obj)) {
            return id.clone();
        }
        let mut id = Uuid::new_v4().to_string();
        while registry.by_id.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        registry.by_id.insert(id.clone(), Arc::downgrade(obj));
        registry.ids.insert(object_key(obj), id.clone());
        debug!(id = %id, class = obj.class_name(), "registered object");
        id
    }

    /// Registers the object under a specific id.
    ///
    /// Re-registering the same object under the same id is a no-op; binding
    /// an id that already belongs to a *different* object is an invariant
    /// violation (the existing binding is kept either way, so the registry
    /// stays bijective).
    pub fn register_with_id(&self, obj: &AnyRef, id: &str) -> CenResult<String> {
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.by_id.get(id).and_then(Weak::upgrade) {
            if object_key(&existing) == object_key(obj) {
                return Ok(id.to_string());
            }
            drop(registry);
            return self.soft(CenError::IdAlreadyBound { id: id.to_string() }, id.to_string());
        }
        if let Some(previous) = registry.ids.insert(object_key(obj), id.to_string()) {
            registry.by_id.remove(&previous);
        }
        registry.by_id.insert(id.to_string(), Arc::downgrade(obj));
        debug!(id = %id, class = obj.class_name(), "registered object");
        Ok(id.to_string())
    }

    /// The id the object is registered under, if any.
    pub fn registered_id(&self, obj: &AnyRef) -> Option<String> {
        self.registry.lock().ids.get(&object_key(obj)).cloned()
    }

    /// The registered object bound to `id`, if any.
    pub fn object(&self, id: &str) -> Option<AnyRef> {
        self.registry.lock().by_id.get(id).and_then(Weak::upgrade)
    }

    /// Typed registry lookup.
    pub fn typed<T: Persistent>(&self, id: &str) -> Option<Arc<T>> {
        self.object(id).and_then(|obj| obj.as_any().downcast::<T>().ok())
    }

    /// Removes the object from the registry.
    ///
    /// The object loses its id and will no longer be stored in its own file.
    pub fn unregister(&self, obj: &AnyRef) {
        let mut registry = self.registry.lock();
        if let Some(id) = registry.ids.remove(&object_key(obj)) {
            registry.by_id.remove(&id);
            registry.save_disabled.remove(&object_key(obj));
            debug!(id = %id, class = obj.class_name(), "unregistered object");
        }
    }

    /// Enables or disables saving of a registered object.
    ///
    /// While disabled, [`save`](Self::save) refuses the object and
    /// [`save_all_registered`](Self::save_all_registered) skips it.
    pub fn set_save_permission(&self, obj: &AnyRef, allow: bool) -> CenResult<()> {
        let mut registry = self.registry.lock();
        if !registry.ids.contains_key(&object_key(obj)) {
            drop(registry);
            return self.soft(CenError::NotRegistered, ());
        }
        if allow {
            registry.save_disabled.remove(&object_key(obj));
        } else {
            registry.save_disabled.insert(object_key(obj));
        }
        Ok(())
    }

    /// Serializes the object to `<id>.json`, replacing any previous file.
    ///
    /// Returns `Ok(false)` when the save was refused or failed under the
    /// production policy.
    pub fn save(&self, obj: &AnyRef) -> CenResult<bool> {
        let id = self.register(obj);
        if self.registry.lock().save_disabled.contains(&object_key(obj)) {
            return self.soft(CenError::SaveDisabled { id }, false);
        }
        let started = Instant::now();
        let mut enc = Encoder::new(self);
        enc.mark_known(&id);
        let fields = match obj.encode(&mut enc) {
            Ok(fields) => fields,
            Err(err) => return self.soft(err, false),
        };
        let mut doc = JsonMap::new();
        doc.insert(KEY_CLASS.to_string(), Value::String(obj.class_name().to_string()));
        doc.insert(KEY_ID.to_string(), Value::String(id.clone()));
        doc.extend(fields);
        let text = Value::Object(doc).to_string();
        match self.storage.save(&Self::file_name(&id), &text) {
            Ok(()) => {
                debug!(
                    id = %id,
                    class = obj.class_name(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "saved object"
                );
                Ok(true)
            }
            Err(err) => self.soft(err.into(), false),
        }
    }

    /// Saves every registered object whose save permission is on.
    pub fn save_all_registered(&self) -> CenResult<()> {
        let mut pending: Vec<(String, AnyRef)> = {
            let registry = self.registry.lock();
            registry
                .by_id
                .iter()
                .filter_map(|(id, weak)| weak.upgrade().map(|obj| (id.clone(), obj)))
                .filter(|(_, obj)| !registry.save_disabled.contains(&object_key(obj)))
                .collect()
        };
        pending.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (_, obj) in pending {
            self.save(&obj)?;
        }
        Ok(())
    }

    /// Reloads the object from its file without recursing into references.
    pub fn reload(&self, obj: &AnyRef) -> CenResult<bool> {
        self.reload_with_depth(obj, 0)
    }

    /// Reloads the object from its file, updating it in place.
    ///
    /// References to objects that are not yet registered materialize as
    /// shells; while `depth` remains, each fresh shell is itself reloaded at
    /// `depth - 1`. A missing file is a recoverable condition and yields
    /// `Ok(false)`.
    pub fn reload_with_depth(&self, obj: &AnyRef, depth: u32) -> CenResult<bool> {
        let Some(id) = self.registered_id(obj) else {
            return self.soft(CenError::NotRegistered, false);
        };
        let started = Instant::now();
        let text = match self.storage.load(&Self::file_name(&id)) {
            Ok(text) => text,
            Err(StorageError::NotFound { .. }) => {
                debug!(id = %id, "no saved document to reload");
                return Ok(false);
            }
            Err(err) => return self.soft(err.into(), false),
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => return self.soft(err.into(), false),
        };
        let Some(doc) = value.as_object() else {
            return self.soft(
                CenError::Decode(format!("document '{id}' is not an object")),
                false,
            );
        };
        let dec = Decoder::new(self, depth);
        match obj.decode(doc, &dec) {
            Ok(()) => {
                debug!(
                    id = %id,
                    class = obj.class_name(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "reloaded object"
                );
                Ok(true)
            }
            Err(err) => self.soft(err, false),
        }
    }

    /// Deletes the object's file without touching its in-memory state.
    pub fn remove_from_storage(&self, obj: &AnyRef) -> CenResult<()> {
        let Some(id) = self.registered_id(obj) else {
            return self.soft(CenError::NotRegistered, ());
        };
        match self.storage.delete(&Self::file_name(&id)) {
            Ok(()) => Ok(()),
            Err(err) => self.soft(err.into(), ()),
        }
    }

    /// Empties the storage root of any previously saved data.
    pub fn remove_previous_saved(&self) -> CenResult<()> {
        match self.storage.delete_all() {
            Ok(()) => Ok(()),
            Err(err) => self.soft(err.into(), ()),
        }
    }

    /// Serializes a payload to its string document form; `None` becomes the
    /// empty string. Used by the recovery journal.
    pub fn payload_to_string(&self, payload: Option<&Payload>) -> String {
        match payload {
            Some(payload) => payload.to_document().to_string(),
            None => String::new(),
        }
    }

    /// Parses a payload from its string document form.
    pub fn payload_from_string(&self, text: &str) -> CenResult<Option<Payload>> {
        if text.is_empty() {
            return Ok(None);
        }
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => return self.soft(err.into(), None),
        };
        match Payload::from_document(&value) {
            Ok(payload) => Ok(payload),
            Err(err) => self.soft(err, None),
        }
    }
}
