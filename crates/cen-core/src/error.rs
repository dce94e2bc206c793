//! Error types for cen-core.
//!
//! This module defines the central error type [`CenError`] used throughout
//! the crate, along with the [`CenResult<T>`] type alias.
//!
//! Whether a violation is raised or suppressed is decided by the network's
//! escalation policy (see [`NetworkConfig`](crate::config::NetworkConfig)):
//! with `development` on every error propagates to the caller, otherwise
//! argument and invariant errors are logged and the operation yields its
//! neutral default.

use cen_storage::StorageError;
use thiserror::Error;

/// Top-level error type for contextual ego network operations.
#[derive(Debug, Error)]
pub enum CenError {
    /// A caller-supplied value failed a basic argument check.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A node id must be a non-empty string.
    #[error("node id cannot be an empty string")]
    EmptyNodeId,

    /// An edge cannot connect a node to itself.
    #[error("source and destination cannot be the same node")]
    SelfEdge,

    /// An edge endpoint must be a member of the edge's context.
    #[error("node '{id}' is not a member of the context")]
    NotInContext {
        /// Id of the out-of-context node
        id: String,
    },

    /// The node is already a member of the context.
    #[error("node '{id}' is already a member of the context")]
    AlreadyInContext {
        /// Id of the duplicate node
        id: String,
    },

    /// At most one edge may exist per (source, destination) pair.
    ///
    /// Usually a sign that the caller meant to add an interaction on the
    /// existing edge instead.
    #[error("edge '{src}' -> '{dst}' already exists in the context")]
    DuplicateEdge {
        /// Source node id
        src: String,
        /// Destination node id
        dst: String,
    },

    /// The ego node cannot be removed.
    #[error("the ego node cannot be removed")]
    EgoRemoval,

    /// The node was created by a different ego network.
    #[error("node '{id}' belongs to a different ego network")]
    ForeignNode {
        /// Id of the foreign node
        id: String,
    },

    /// The context is not (or no longer) part of this ego network.
    #[error("context is not part of this ego network")]
    ForeignContext,

    /// Interaction timestamps and durations are non-negative.
    #[error("timestamp and duration cannot be negative")]
    NegativeTime,

    /// The edge does not have the ego as one of its endpoints.
    #[error("edge does not contain the ego")]
    NoEgoEndpoint,

    /// An explicit serialization id is already bound to a different object.
    #[error("id '{id}' is already bound to a different object")]
    IdAlreadyBound {
        /// The contested id
        id: String,
    },

    /// The object is not registered with the serializer.
    #[error("object is not registered with the serializer")]
    NotRegistered,

    /// Saving has been revoked for this registry entry.
    ///
    /// Happens when saving an unloaded context whose payload was dropped by
    /// `cleanup`; the on-disk document is already up to date.
    #[error("saving is disabled for '{id}'")]
    SaveDisabled {
        /// Serialization id of the object
        id: String,
    },

    /// A document names a class this implementation does not know.
    #[error("unknown class '{class}'")]
    UnknownClass {
        /// The unrecognized class name
        class: String,
    },

    /// A document or field could not be decoded.
    ///
    /// Field-level occurrences are logged and leave the field at its default;
    /// document-level occurrences abort the reload.
    #[error("decode error: {0}")]
    Decode(String),

    /// An underlying storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A weak back-reference outlived the network that owned it.
    #[error("the ego network has been dropped")]
    NetworkGone,
}

impl From<serde_json::Error> for CenError {
    fn from(err: serde_json::Error) -> Self {
        CenError::Serialization(err.to_string())
    }
}

/// Result type alias for contextual ego network operations.
pub type CenResult<T> = Result<T, CenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_edge() {
        let err = CenError::DuplicateEdge {
            src: "u1".to_string(),
            dst: "u2".to_string(),
        };
        assert!(err.to_string().contains("u1"));
        assert!(err.to_string().contains("u2"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: CenError = StorageError::NotFound {
            name: "CEN.json".to_string(),
        }
        .into();
        assert!(matches!(err, CenError::Storage(_)));
    }
}
