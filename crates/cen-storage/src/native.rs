//! Filesystem-backed storage.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::Storage;

/// Roots claimed by live [`FileStorage`] instances.
///
/// Guards against two instances writing into the same (or a nested)
/// directory; entries are released when the owning instance is dropped.
static LIVE_ROOTS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// The default [`Storage`] implementation, rooted at a directory path.
///
/// Every save replaces the target file atomically: contents are written to a
/// sibling temp file which is then renamed over the destination, so a crash
/// mid-save leaves either the old document or the new one, never a torn file.
///
/// # Example
///
/// ```
/// use cen_storage::{FileStorage, Storage};
///
/// let dir = tempfile::tempdir().unwrap();
/// let storage = FileStorage::open(dir.path()).unwrap();
/// storage.save("greeting.json", "{\"hello\":\"world\"}").unwrap();
/// assert!(storage.exists("greeting.json"));
/// assert!(storage.load("greeting.json").unwrap().contains("world"));
/// ```
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (and claims) a storage root, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidRoot`] for an empty or uncreatable path
    /// - [`StorageError::RootInUse`] when the root equals, contains, or is
    ///   contained in the root of another live instance
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::InvalidRoot {
                root: root.to_path_buf(),
                reason: "empty path".to_string(),
            });
        }
        fs::create_dir_all(root)?;
        let root = root.canonicalize().map_err(|e| StorageError::InvalidRoot {
            root: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut live = LIVE_ROOTS.lock();
        if live
            .iter()
            .any(|claimed| claimed.starts_with(&root) || root.starts_with(claimed))
        {
            return Err(StorageError::RootInUse { root });
        }
        live.insert(root.clone());
        debug!(root = %root.display(), "opened file storage");
        Ok(Self { root })
    }

    /// The claimed root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        LIVE_ROOTS.lock().remove(&self.root);
    }
}

impl Storage for FileStorage {
    fn save(&self, name: &str, contents: &str) -> StorageResult<()> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_file_name(format!(
            "{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or(name)
        ));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, name: &str) -> StorageResult<String> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.root.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    fn delete_all(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn path_of(&self, name: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.save("a.json", "{\"x\":\"1\"}").unwrap();
        assert_eq!(storage.load("a.json").unwrap(), "{\"x\":\"1\"}");
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.save("a.json", "old").unwrap();
        storage.save("a.json", "new").unwrap();
        assert_eq!(storage.load("a.json").unwrap(), "new");
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            storage.load("missing.json"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.save("a.json", "x").unwrap();
        storage.delete("a.json").unwrap();
        storage.delete("a.json").unwrap();
        assert!(!storage.exists("a.json"));
    }

    #[test]
    fn delete_all_removes_immediate_files() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.save("a.json", "x").unwrap();
        storage.save("b.json", "y").unwrap();
        storage.delete_all().unwrap();
        assert!(!storage.exists("a.json"));
        assert!(!storage.exists("b.json"));
    }

    #[test]
    fn overlapping_roots_are_rejected() {
        let dir = TempDir::new().unwrap();
        let _outer = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            FileStorage::open(dir.path()),
            Err(StorageError::RootInUse { .. })
        ));
        // nested root is an overlap too
        assert!(matches!(
            FileStorage::open(dir.path().join("nested")),
            Err(StorageError::RootInUse { .. })
        ));
    }

    #[test]
    fn root_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        {
            let _storage = FileStorage::open(dir.path()).unwrap();
        }
        assert!(FileStorage::open(dir.path()).is_ok());
    }
}
