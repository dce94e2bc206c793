//! A storage backend that stores nothing.

use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};
use crate::Storage;

/// A [`Storage`] implementation that discards writes and fails loads.
///
/// Intended for tests and large-scale simulations that exercise the in-memory
/// model without paying for disk I/O. `exists` always answers `false`, so an
/// ego network opened on top of it always starts fresh.
#[derive(Debug, Default)]
pub struct NullStorage;

impl NullStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for NullStorage {
    fn save(&self, _name: &str, _contents: &str) -> StorageResult<()> {
        Ok(())
    }

    fn load(&self, _name: &str) -> StorageResult<String> {
        Err(StorageError::Unsupported {
            backend: "NullStorage",
            op: "load",
        })
    }

    fn delete(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    fn exists(&self, _name: &str) -> bool {
        false
    }

    fn delete_all(&self) -> StorageResult<()> {
        Ok(())
    }

    fn path_of(&self, _name: &str) -> StorageResult<PathBuf> {
        Err(StorageError::Unsupported {
            backend: "NullStorage",
            op: "path_of",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_discarded() {
        let storage = NullStorage::new();
        storage.save("a.json", "x").unwrap();
        assert!(!storage.exists("a.json"));
        assert!(storage.load("a.json").is_err());
    }
}
