//! Trait seams for the engine's external collaborators.
//!
//! - [`SearchIndex`]: the underlying full-text index engine (add/delete/commit,
//!   faceted counts, typed queries, rollback).
//! - [`RepositoryReader`]: the repository client (node metadata, text content).
//! - [`DocumentCache`]: the tenant-scoped store of the last fully-built
//!   document per node.
//!
//! All traits are object-safe and `Send + Sync`: one engine instance is shared
//! by several tracker threads, all I/O synchronous and blocking in the calling
//! thread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::types::{DocType, FieldName, IndexDocument, NodeMetaData};

// ---------------------------------------------------------------------------
// Index query model
// ---------------------------------------------------------------------------

/// Sort direction for index queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Commit flavor issued to the index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    /// Make changes visible to searchers without forcing a durable flush.
    Soft,
    /// Durable flush; used before shard range expansion.
    Hard,
}

/// Typed document selector for deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteSelector {
    /// Delete a single document by key.
    Key(String),
    /// Delete every document carrying this node id, including node, unindexed
    /// and error placeholder documents.
    NodeId(u64),
    /// Delete the document of a transaction.
    TransactionId(u64),
    /// Delete the document of an ACL.
    AclId(u64),
    /// Delete the document of an ACL change set.
    AclChangeSetId(u64),
    /// Delete every node document with an id strictly above the bound
    /// (shard-cap maintenance).
    NodeIdAbove(u64),
}

/// Filter component of an [`IndexQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Every document.
    All,
    /// Documents of one kind.
    DocType(DocType),
    /// Node documents whose content needs harvesting (`FtsStatus` New or Dirty).
    UncleanContent,
    /// Transaction documents whose cascade flag is still set.
    PendingCascades,
    /// Node documents listing this node reference among their ancestors.
    Ancestor(String),
    /// Documents whose numeric field equals the value.
    FieldLong(FieldName, i64),
    /// Documents whose text field equals the value.
    FieldText(FieldName, String),
}

/// A typed index query: filter plus optional sort and limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    /// Which documents match.
    pub filter: QueryFilter,
    /// Optional sort by a numeric field.
    pub sort: Option<(FieldName, SortOrder)>,
    /// Optional result cap.
    pub limit: Option<usize>,
}

impl IndexQuery {
    /// A query returning every match of the filter, unsorted.
    #[must_use]
    pub const fn filtered(filter: QueryFilter) -> Self {
        Self {
            filter,
            sort: None,
            limit: None,
        }
    }

    /// Builder-style sort.
    #[must_use]
    pub const fn sorted_by(mut self, field: FieldName, order: SortOrder) -> Self {
        self.sort = Some((field, order));
        self
    }

    /// Builder-style limit.
    #[must_use]
    pub const fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// SearchIndex
// ---------------------------------------------------------------------------

/// The external full-text index engine.
///
/// # Contract
///
/// - `add` with `overwrite` replaces any existing document with the same key.
/// - `get` is a real-time lookup: it must see uncommitted writes (used for
///   state markers under optimistic concurrency).
/// - `rollback` discards every uncommitted mutation since the last commit.
/// - `facet_ids` returns `(id, occurrence_count)` pairs in ascending id order
///   for the numeric field, restricted to `start..=end`, with counts below
///   `min_count` omitted.
pub trait SearchIndex: Send + Sync {
    /// Add (or replace) a document.
    fn add(&self, doc: &IndexDocument, overwrite: bool) -> EngineResult<()>;

    /// Delete documents matching the selector.
    fn delete(&self, selector: &DeleteSelector) -> EngineResult<()>;

    /// Real-time lookup of a single document by key.
    fn get(&self, id: &str) -> EngineResult<Option<IndexDocument>>;

    /// Run a typed query.
    fn search(&self, query: &IndexQuery) -> EngineResult<Vec<IndexDocument>>;

    /// Count matches of a filter.
    fn count(&self, filter: &QueryFilter) -> EngineResult<u64>;

    /// Faceted id counts over a numeric field within an inclusive range.
    fn facet_ids(
        &self,
        field: FieldName,
        start: u64,
        end: u64,
        min_count: u64,
    ) -> EngineResult<Vec<(u64, u64)>>;

    /// Document counts grouped by kind.
    fn doc_type_counts(&self) -> EngineResult<BTreeMap<DocType, u64>>;

    /// Highest or lowest node id among `Node` documents, if any exist.
    fn top_node_id(&self, order: SortOrder) -> EngineResult<Option<u64>>;

    /// Commit pending mutations.
    fn commit(&self, mode: CommitMode) -> EngineResult<()>;

    /// Discard uncommitted mutations.
    fn rollback(&self) -> EngineResult<()>;
}

// ---------------------------------------------------------------------------
// RepositoryReader
// ---------------------------------------------------------------------------

/// Which payload sections a metadata fetch should include.
///
/// Paths and parent associations are expensive on the repository side; bulk
/// fetches and delete handling request only what they need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
    /// Node ids to fetch.
    pub node_ids: Vec<u64>,
    /// Include path and ancestor information.
    pub include_paths: bool,
    /// Include the property map.
    pub include_properties: bool,
    /// Include aspect names.
    pub include_aspects: bool,
    /// Include the parent-association checksum and child ids.
    pub include_parent_associations: bool,
}

impl MetadataRequest {
    /// Full payload for a single node.
    #[must_use]
    pub fn full(node_id: u64) -> Self {
        Self {
            node_ids: vec![node_id],
            include_paths: true,
            include_properties: true,
            include_aspects: true,
            include_parent_associations: true,
        }
    }

    /// Full payload for a batch of nodes.
    #[must_use]
    pub fn full_batch(node_ids: Vec<u64>, include_paths: bool) -> Self {
        Self {
            node_ids,
            include_paths,
            include_properties: true,
            include_aspects: true,
            include_parent_associations: true,
        }
    }

    /// Minimal payload used when handling deletes.
    #[must_use]
    pub fn minimal(node_ids: Vec<u64>) -> Self {
        Self {
            node_ids,
            include_paths: false,
            include_properties: false,
            include_aspects: false,
            include_parent_associations: false,
        }
    }

    /// Path-only payload used by cascade traversal.
    #[must_use]
    pub fn paths_only(node_id: u64) -> Self {
        Self {
            node_ids: vec![node_id],
            include_paths: true,
            include_properties: false,
            include_aspects: false,
            include_parent_associations: true,
        }
    }
}

/// Outcome of a content transformation on the repository side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformStatus {
    /// Text was extracted successfully.
    Ok,
    /// The transformer failed; the exception detail accompanies the content.
    Failed,
    /// No transformer exists for the content's MIME type.
    NoTransform,
}

impl std::fmt::Display for TransformStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Failed => write!(f, "failed"),
            Self::NoTransform => write!(f, "no_transform"),
        }
    }
}

/// Harvested text content plus transformation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    /// The extracted text (empty on failure).
    pub text: String,
    /// How the transformation went.
    pub transform_status: TransformStatus,
    /// Failure detail when the transformation failed.
    pub transform_exception: Option<String>,
    /// How long the transformation took.
    pub transform_duration_ms: u64,
}

/// The repository client: fetches node metadata and text content on demand.
pub trait RepositoryReader: Send + Sync {
    /// Fetch metadata for the requested nodes.
    ///
    /// Nodes unknown to the repository are simply absent from the result;
    /// an error means the fetch itself failed.
    fn node_metadata(&self, request: &MetadataRequest) -> EngineResult<Vec<NodeMetaData>>;

    /// Fetch and transform the text content of one node's content revision.
    fn text_content(&self, node_id: u64, content_id: u64) -> EngineResult<TextContent>;
}

// ---------------------------------------------------------------------------
// DocumentCache
// ---------------------------------------------------------------------------

/// Tenant-scoped store of the last fully-built document per node.
///
/// Used to avoid refetching unchanged properties between the metadata phase
/// and the content phase, and to detect content staleness.
pub trait DocumentCache: Send + Sync {
    /// Load the cached document for a node, if present.
    fn retrieve(&self, tenant: &str, node_id: u64) -> EngineResult<Option<IndexDocument>>;

    /// Persist the latest built document for a node.
    fn store(&self, tenant: &str, node_id: u64, doc: &IndexDocument) -> EngineResult<()>;

    /// Drop the cached document for a node.
    fn remove(&self, tenant: &str, node_id: u64) -> EngineResult<()>;
}
