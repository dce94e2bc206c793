//! Key-to-blob storage backends for the contextual ego network.
//!
//! The serializer in `cen-core` persists one document per entity. This crate
//! abstracts where those documents live behind the [`Storage`] trait and
//! ships two backends:
//!
//! - [`FileStorage`]: the default filesystem backend. Writes are atomic
//!   (temp file + rename) and the root directory is claimed for the lifetime
//!   of the instance, so two live instances can never overlap.
//! - [`NullStorage`]: discards every write and fails every load. Useful for
//!   simulations and tests that must not touch the disk.
//!
//! File names are flat keys relative to the root (`"CEN.json"`,
//! `"<uuid>.json"`); backends may create intermediate directories when a key
//! contains separators.

mod error;
mod native;
mod null;

use std::path::PathBuf;

pub use error::{StorageError, StorageResult};
pub use native::FileStorage;
pub use null::NullStorage;

/// Abstract byte-blob backend keyed by file name.
///
/// One live instance owns one root; overlapping roots between live instances
/// are rejected when the backend is constructed.
pub trait Storage: Send + Sync {
    /// Atomically replaces the contents of `name` with `contents`.
    ///
    /// Creates intermediate directories as needed. A reader never observes a
    /// partially written file.
    fn save(&self, name: &str, contents: &str) -> StorageResult<()>;

    /// Reads the full contents of `name`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when no such file exists.
    fn load(&self, name: &str) -> StorageResult<String>;

    /// Deletes `name`. Deleting a file that does not exist is not an error.
    fn delete(&self, name: &str) -> StorageResult<()>;

    /// Whether `name` currently exists.
    fn exists(&self, name: &str) -> bool;

    /// Deletes every immediate file under the root. Subdirectories are kept.
    fn delete_all(&self) -> StorageResult<()>;

    /// The absolute path `name` resolves to, for diagnostics only.
    fn path_of(&self, name: &str) -> StorageResult<PathBuf>;
}
