//! Unified error type for the mirrorsearch indexing engine.
//!
//! Every variant carries an actionable message guiding the operator toward
//! resolution. The engine recovers from per-node failures locally (the node is
//! replaced by an error placeholder document); only a handful of conditions
//! propagate to the calling tracker, and of those only [`EngineError::RolledBack`]
//! requires the tracker to restart its cycle rather than retry.

/// Unified error type covering all failure modes across the indexing pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // === Concurrency errors ===
    /// The per-node lock could not be acquired within the configured timeout.
    ///
    /// Treated as fatal for the current operation on that node; the caller's
    /// per-node error path converts it into an error placeholder document.
    #[error(
        "Unable to acquire lock on node {node_id} after {waited_ms}ms. Another tracker is likely stuck on this node."
    )]
    LockTimeout {
        /// The node whose lock acquisition timed out.
        node_id: u64,
        /// How long the acquisition spun before giving up.
        waited_ms: u64,
    },

    /// The tracker's in-flight work was invalidated by a rollback.
    ///
    /// The calling tracker must restart its cycle (re-register and re-read
    /// tracker state) rather than retry the write immediately.
    #[error(
        "The tracker's work was rolled back by another tracker error. Restart the tracking cycle; the original cause was logged at rollback time."
    )]
    RolledBack,

    // === Collaborator errors ===
    /// A repository call (metadata fetch, text content fetch) failed.
    #[error("Repository {operation} failed: {source}")]
    Repository {
        /// Which repository operation failed.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An index-engine call (add, delete, search, commit) failed.
    #[error("Index {operation} failed: {source}")]
    Index {
        /// Which index operation failed.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The document cache could not be read or written.
    #[error("Document cache access failed for tenant \"{tenant}\" node {node_id}: {source}")]
    DocumentCache {
        /// Tenant the document belongs to.
        tenant: String,
        /// The node whose cached document was being accessed.
        node_id: u64,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The repository returned no metadata for a node that was expected to exist.
    #[error("No metadata in the repository for node {node_id}. The node may have been deleted; it will be removed from the index.")]
    MetadataMissing {
        /// The node id that produced no metadata.
        node_id: u64,
    },

    // === Shard range errors ===
    /// A shard range operation was refused or failed.
    #[error("Shard range operation refused: {reason}")]
    RangeRouter {
        /// Why the operation was refused.
        reason: String,
    },

    // === Configuration errors ===
    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    // === I/O errors ===
    /// Wraps `std::io::Error` for file operations (disk document cache).
    #[error("I/O error: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across all mirrorsearch crates.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Build a repository error from any underlying error.
    pub fn repository(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Repository {
            operation,
            source: Box::new(source),
        }
    }

    /// Build an index error from any underlying error.
    pub fn index(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Index {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether this error invalidates the whole tracking cycle.
    ///
    /// Only a rollback does; everything else is local to a node or operation.
    #[must_use]
    pub const fn invalidates_cycle(&self) -> bool {
        matches!(self, Self::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_message_names_the_node() {
        let err = EngineError::LockTimeout {
            node_id: 42,
            waited_ms: 120_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("node 42"));
        assert!(msg.contains("120000ms"));
    }

    #[test]
    fn rolled_back_invalidates_cycle() {
        assert!(EngineError::RolledBack.invalidates_cycle());
        assert!(!EngineError::MetadataMissing { node_id: 1 }.invalidates_cycle());
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EngineError::repository("node_metadata", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("node_metadata"));
    }

    #[test]
    fn invalid_config_message_is_actionable() {
        let err = EngineError::InvalidConfig {
            field: "lock_timeout_ms".into(),
            value: "0".into(),
            reason: "must be greater than zero".into(),
        };
        assert!(err.to_string().contains("lock_timeout_ms"));
        assert!(err.to_string().contains("must be greater than zero"));
    }
}
