//! Store errors

/// Errors raised by a [`crate::Store`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique key is already taken
    #[error("{entity} with key '{key}' already exists")]
    Conflict {
        /// Entity kind
        entity: &'static str,
        /// Conflicting key
        key: String,
    },

    /// A write raced another commit over the same records; reload and retry
    #[error("{entity} '{key}' was changed by a concurrent commit")]
    Concurrent {
        /// Entity kind
        entity: &'static str,
        /// Contended key
        key: String,
    },

    /// A write references a parent that does not exist
    #[error("{entity} references missing {parent} {id}")]
    MissingReference {
        /// Entity being written
        entity: &'static str,
        /// Referenced entity kind
        parent: &'static str,
        /// Referenced id
        id: String,
    },

    /// Backend could not be reached or failed mid-operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Snapshot file IO
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_) | Self::Concurrent { .. })
    }
}
