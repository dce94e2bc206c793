//! Error types for cen-storage.
//!
//! This module defines the central error type [`StorageError`] used by every
//! storage backend, along with the [`StorageResult<T>`] type alias.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for storage operations.
///
/// Provides structured error variants for all failure modes of the key-to-blob
/// backends, enabling precise error handling and informative error messages.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A requested file does not exist under the storage root.
    ///
    /// # When This Occurs
    ///
    /// - Loading an entity document that was never saved
    /// - Loading after the file was deleted out of band
    #[error("file not found: {name}")]
    NotFound {
        /// The file name that was requested
        name: String,
    },

    /// The storage root is already claimed by another live storage instance.
    ///
    /// Two live instances must never share (or nest inside) the same root
    /// directory; the second open is rejected instead of silently aliasing
    /// the first instance's files.
    #[error("storage root already in use: {root}")]
    RootInUse {
        /// The conflicting root path
        root: PathBuf,
    },

    /// The storage root path is unusable.
    ///
    /// # When This Occurs
    ///
    /// - An empty root path
    /// - A root that cannot be created or canonicalized
    #[error("invalid storage root {root}: {reason}")]
    InvalidRoot {
        /// The offending root path
        root: PathBuf,
        /// Description of why the root was rejected
        reason: String,
    },

    /// The backend does not support the requested operation.
    ///
    /// Raised by [`NullStorage`](crate::NullStorage) for loads and path
    /// lookups, which have no meaning without a real filesystem behind them.
    #[error("{backend} does not support {op}")]
    Unsupported {
        /// Name of the backend
        backend: &'static str,
        /// Name of the unsupported operation
        op: &'static str,
    },

    /// An underlying filesystem operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_file_name() {
        let err = StorageError::NotFound {
            name: "CEN.json".to_string(),
        };
        assert!(err.to_string().contains("CEN.json"));
    }

    #[test]
    fn display_names_unsupported_operation() {
        let err = StorageError::Unsupported {
            backend: "NullStorage",
            op: "load",
        };
        assert!(err.to_string().contains("NullStorage"));
        assert!(err.to_string().contains("load"));
    }
}
