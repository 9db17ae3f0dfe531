//! Core types, trait seams, and concurrency primitives for the mirrorsearch
//! indexing engine.
//!
//! This crate defines the shared data model (nodes, transactions, ACLs, index
//! documents), the seams to the external collaborators (`SearchIndex`,
//! `RepositoryReader`, `DocumentCache`), the per-node lock registry, the
//! bounded freshness caches, and the error type used across the workspace.
//!
//! It has minimal external dependencies and is intended to be depended on by
//! every other crate in the workspace.

pub mod bitset;
pub mod cache;
pub mod error;
pub mod lock;
pub mod tracing_config;
pub mod traits;
pub mod types;

pub use bitset::IdBitSet;
pub use cache::{HarvestCache, MembershipCache};
pub use error::{EngineError, EngineResult};
pub use lock::{NodeLockGuard, NodeLockRegistry};
pub use traits::{
    CommitMode, DeleteSelector, DocumentCache, IndexQuery, MetadataRequest, QueryFilter,
    RepositoryReader, SearchIndex, SortOrder, TextContent, TransformStatus,
};
pub use types::{
    doc_keys, AclChangeSet, AclReaders, ContentProperty, DocType, FieldName, FieldValue,
    FtsStatus, FtsStatusCounts, IdReconciliation, IndexDocument, IndexHealthReport, Node,
    NodeDocRef, NodeMetaData, NodeStatus, PropertyValue, TrackerState, TrackerStats,
    TrackerSummary, Transaction,
};
