//! Data model shared across the mirrorsearch crates.
//!
//! Repository-side event types ([`Node`], [`NodeMetaData`], [`Transaction`],
//! [`AclChangeSet`], [`AclReaders`]) are produced by the repository client and
//! consumed once per event; the engine never mutates them. Index-side types
//! ([`IndexDocument`], [`DocType`], [`FtsStatus`]) model the field-bag
//! documents written to the full-text index. Replacement is always
//! delete-then-add, never merge.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository event types
// ---------------------------------------------------------------------------

/// Lifecycle status of a node event as reported by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// The node was created or updated and must be (re)indexed.
    Updated,
    /// The node was deleted and must be removed from the index.
    Deleted,
    /// The repository could not classify the change; treated as delete-then-update.
    Unknown,
    /// The node lives on another shard but its update may cascade into this one.
    ShardUpdated,
    /// The node lives on another shard and was deleted.
    ShardDeleted,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
            Self::Unknown => write!(f, "unknown"),
            Self::ShardUpdated => write!(f, "shard_updated"),
            Self::ShardDeleted => write!(f, "shard_deleted"),
        }
    }
}

/// A node change event pulled from the repository transaction log.
///
/// A `txn_id` of [`Node::REINDEX_TXN`] marks a forced re-index request (from
/// maintenance operations) rather than an ordinary transaction member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Repository-wide numeric node identifier.
    pub id: u64,
    /// The transaction this event belongs to.
    pub txn_id: u64,
    /// The ACL currently governing the node.
    pub acl_id: u64,
    /// Owning tenant.
    pub tenant: String,
    /// What happened to the node.
    pub status: NodeStatus,
}

impl Node {
    /// Sentinel transaction id used by forced re-index events.
    pub const REINDEX_TXN: u64 = u64::MAX;

    /// Whether this event is a forced re-index rather than tracker-driven work.
    #[must_use]
    pub const fn is_reindex(&self) -> bool {
        self.txn_id == Self::REINDEX_TXN
    }
}

/// A property value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Free-text property.
    Text(String),
    /// Boolean flag property.
    Flag(bool),
    /// Numeric property.
    Number(i64),
    /// Binary content reference with transform metadata.
    Content(ContentProperty),
}

/// Reference to a node's binary content as reported by the repository.
///
/// `content_id` changes whenever the underlying binary changes; the content
/// pipeline compares it against the cached document's applied content id to
/// decide whether harvested text is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProperty {
    /// Identifier of the current content revision.
    pub content_id: u64,
    /// Size of the content in bytes.
    pub size: u64,
    /// MIME type of the content.
    pub mimetype: String,
    /// Character encoding of the content.
    pub encoding: String,
    /// Locale of the content.
    pub locale: String,
}

/// Well-known property key carrying the index-control flag.
///
/// A node whose properties map this key to `PropertyValue::Flag(false)` must
/// not be fully indexed; a minimal unindexed placeholder is written instead.
pub const PROP_INDEX_CONTROL: &str = "index-control";

/// Well-known property key carrying the node's binary content reference.
pub const PROP_CONTENT: &str = "content";

/// Full node payload fetched on demand from the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetaData {
    /// Repository-wide numeric node identifier.
    pub id: u64,
    /// The ACL currently governing the node.
    pub acl_id: u64,
    /// The transaction that last touched the node.
    pub txn_id: u64,
    /// Owning tenant.
    pub tenant: String,
    /// Stable string reference for the node (used by ancestor fields).
    pub node_ref: String,
    /// Node type name.
    pub node_type: String,
    /// Node display name.
    pub name: String,
    /// Aspect names applied to the node.
    pub aspects: Vec<String>,
    /// Node properties by well-known key.
    pub properties: BTreeMap<String, PropertyValue>,
    /// All paths from a root to this node.
    pub paths: Vec<String>,
    /// References of all ancestors, nearest first.
    pub ancestors: Vec<String>,
    /// Ancestor paths (one per path, without the node's own segment).
    pub ancestor_paths: Vec<String>,
    /// Checksum over the parent-association chain; changes when the node moves.
    pub parent_assoc_crc: u64,
    /// Cascade token carried on the parent-association chain, when the node's
    /// type participates in flag-driven cascade tracking.
    pub cascade_txn: Option<u64>,
    /// Child node ids (used by path-comparison descendant traversal).
    pub child_ids: Vec<u64>,
    /// Owner authority, if any.
    pub owner: Option<String>,
}

impl NodeMetaData {
    /// Synthesize the minimal metadata for a pure delete event, for which the
    /// repository no longer has a payload.
    #[must_use]
    pub fn for_deleted_node(node: &Node) -> Self {
        Self {
            id: node.id,
            acl_id: node.acl_id,
            txn_id: node.txn_id,
            tenant: node.tenant.clone(),
            node_ref: String::new(),
            node_type: String::new(),
            name: String::new(),
            aspects: Vec::new(),
            properties: BTreeMap::new(),
            paths: Vec::new(),
            ancestors: Vec::new(),
            ancestor_paths: Vec::new(),
            parent_assoc_crc: 0,
            cascade_txn: None,
            child_ids: Vec::new(),
            owner: None,
        }
    }

    /// The node's content property, if it has one.
    #[must_use]
    pub fn content_property(&self) -> Option<&ContentProperty> {
        match self.properties.get(PROP_CONTENT) {
            Some(PropertyValue::Content(content)) => Some(content),
            _ => None,
        }
    }

    /// Whether the index-control property permits full indexing.
    ///
    /// Absent property means indexed; only an explicit `Flag(false)` opts out.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        !matches!(
            self.properties.get(PROP_INDEX_CONTROL),
            Some(PropertyValue::Flag(false))
        )
    }
}

/// A unit of repository change grouping node updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: u64,
    /// Commit timestamp in epoch milliseconds.
    pub commit_time_ms: u64,
    /// Number of node updates in the transaction.
    pub updates: u64,
    /// Number of node deletes in the transaction.
    pub deletes: u64,
}

impl Transaction {
    /// A transaction carrying only identity and commit time.
    #[must_use]
    pub const fn new(id: u64, commit_time_ms: u64) -> Self {
        Self {
            id,
            commit_time_ms,
            updates: 0,
            deletes: 0,
        }
    }
}

/// A unit of repository change grouping access-control-list updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclChangeSet {
    /// Change-set identifier.
    pub id: u64,
    /// Commit timestamp in epoch milliseconds.
    pub commit_time_ms: u64,
    /// Number of ACLs in the change set.
    pub acl_count: u64,
}

impl AclChangeSet {
    /// A change set carrying only identity and commit time.
    #[must_use]
    pub const fn new(id: u64, commit_time_ms: u64) -> Self {
        Self {
            id,
            commit_time_ms,
            acl_count: 0,
        }
    }
}

/// Reader and denied authorities for one ACL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclReaders {
    /// ACL identifier.
    pub acl_id: u64,
    /// The change set that produced this ACL revision.
    pub change_set_id: u64,
    /// Owning tenant; authorities are tenant-qualified when indexed.
    pub tenant: String,
    /// Authorities allowed to read.
    pub readers: Vec<String>,
    /// Authorities explicitly denied.
    pub denied: Vec<String>,
}

/// Tenant-qualify an authority name.
///
/// The default tenant leaves authorities untouched; any other tenant appends
/// an `@tenant` suffix so cross-tenant authorities never collide.
#[must_use]
pub fn tenant_qualified_authority(authority: &str, tenant: &str) -> String {
    if tenant.is_empty() {
        authority.to_owned()
    } else {
        format!("{authority}@{tenant}")
    }
}

/// Reference to a node document due for content harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocRef {
    /// Owning tenant.
    pub tenant: String,
    /// Node identifier.
    pub node_id: u64,
    /// Content locale recorded on the indexed document, if any.
    pub content_locale: Option<String>,
    /// Latest content revision already applied to the indexed document.
    pub applied_content_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Index document model
// ---------------------------------------------------------------------------

/// Kind of document stored in the index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DocType {
    /// A fully indexed node.
    Node,
    /// A placeholder for a node whose index-control property opts out.
    UnindexedNode,
    /// A placeholder recording a node-level indexing failure.
    ErrorNode,
    /// An access-control list.
    Acl,
    /// A repository transaction.
    Tx,
    /// An ACL change set.
    AclTx,
    /// A tracker state marker (fixed logical key).
    State,
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => write!(f, "Node"),
            Self::UnindexedNode => write!(f, "UnindexedNode"),
            Self::ErrorNode => write!(f, "ErrorNode"),
            Self::Acl => write!(f, "Acl"),
            Self::Tx => write!(f, "Tx"),
            Self::AclTx => write!(f, "AclTx"),
            Self::State => write!(f, "State"),
        }
    }
}

/// Content freshness of a node document.
///
/// Transitions are driven only by the content pipeline: `New` (no cached
/// document) and `Dirty` (cached content id no longer matches the live
/// property) both mean "needs content harvesting"; `Clean` means harvested
/// text matches the latest content revision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FtsStatus {
    /// No harvested content exists yet.
    New,
    /// Harvested content is stale for the current content revision.
    Dirty,
    /// Harvested content is up to date.
    Clean,
}

impl FtsStatus {
    /// Whether this status requires a content harvest.
    #[must_use]
    pub const fn needs_harvest(self) -> bool {
        matches!(self, Self::New | Self::Dirty)
    }
}

impl fmt::Display for FtsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Dirty => write!(f, "Dirty"),
            Self::Clean => write!(f, "Clean"),
        }
    }
}

/// Typed field names of the index schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FieldName {
    /// Numeric node identifier.
    DbId,
    /// Transaction identifier (on `Tx` documents).
    TxId,
    /// Transaction the document was last written in (on node documents).
    InTxId,
    /// ACL identifier (on `Acl` and node documents).
    AclId,
    /// Change set the ACL was last written in.
    InAclTxId,
    /// ACL change-set identifier (on `AclTx` documents).
    AclTxId,
    /// Transaction commit time in epoch milliseconds.
    TxCommitTime,
    /// ACL change-set commit time in epoch milliseconds.
    AclTxCommitTime,
    /// Stored transaction id on `Tx` documents and the transaction state marker.
    StateTxId,
    /// Stored transaction commit time on `Tx` documents and the state marker.
    StateTxCommitTime,
    /// Stored change-set id on the ACL state marker.
    StateAclTxId,
    /// Stored change-set commit time on the ACL state marker.
    StateAclTxCommitTime,
    /// Optimistic-concurrency version token on state markers.
    Version,
    /// One-bit flag: 1 while a transaction's cascades are pending.
    CascadeFlag,
    /// Content freshness marker.
    FtsStatus,
    /// Owning tenant.
    Tenant,
    /// Owner authority.
    Owner,
    /// Node type name.
    NodeType,
    /// Aspect names (multi-valued).
    Aspect,
    /// Node display name.
    Name,
    /// Paths from a root to the node (multi-valued).
    Path,
    /// Ancestor node references (multi-valued).
    Ancestor,
    /// Ancestor paths (multi-valued).
    AncestorPath,
    /// Checksum over the parent-association chain.
    ParentAssocCrc,
    /// Cascade token carried by shard-external ancestors.
    CascadeTx,
    /// Reader authorities (multi-valued).
    Reader,
    /// Denied authorities (multi-valued).
    Denied,
    /// Harvested text content.
    Content,
    /// Content revision applied to the harvested text.
    ContentId,
    /// Content size in bytes.
    ContentSize,
    /// Content MIME type.
    ContentMimetype,
    /// Content encoding.
    ContentEncoding,
    /// Content locale.
    ContentLocale,
    /// Content transform outcome.
    TransformStatus,
    /// Content transform failure detail.
    TransformException,
    /// Content transform duration in milliseconds.
    TransformDurationMs,
    /// Failure message on error placeholder documents.
    ErrorMessage,
    /// Truncated failure trace on error placeholder documents.
    ErrorTrace,
    /// Free-text generic property field.
    Property,
}

/// A field value inside an [`IndexDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Signed numeric value.
    Long(i64),
    /// Text value.
    Text(String),
    /// Multi-valued field.
    Many(Vec<FieldValue>),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        // Ids in this system fit i64; saturate rather than wrap on the sentinel.
        Self::Long(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// A field-bag document destined for (or read back from) the index.
///
/// At most one non-error live document exists per node id at any time; the
/// engine deletes old documents before adding the new one within the same
/// locked section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Composite document key (see [`doc_keys`]).
    pub id: String,
    /// Document kind.
    pub doc_type: DocType,
    /// Typed fields.
    pub fields: BTreeMap<FieldName, FieldValue>,
}

impl IndexDocument {
    /// Create an empty document with the given key and kind.
    #[must_use]
    pub fn new(id: impl Into<String>, doc_type: DocType) -> Self {
        Self {
            id: id.into(),
            doc_type,
            fields: BTreeMap::new(),
        }
    }

    /// Replace a field's value.
    pub fn set(&mut self, field: FieldName, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    /// Builder-style [`IndexDocument::set`].
    #[must_use]
    pub fn with(mut self, field: FieldName, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Append a value to a multi-valued field.
    pub fn add(&mut self, field: FieldName, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.get_mut(&field) {
            None => {
                self.fields.insert(field, FieldValue::Many(vec![value]));
            }
            Some(FieldValue::Many(values)) => values.push(value),
            Some(existing) => {
                let first = existing.clone();
                *existing = FieldValue::Many(vec![first, value]);
            }
        }
    }

    /// Remove a field entirely.
    pub fn clear(&mut self, field: FieldName) {
        self.fields.remove(&field);
    }

    /// Read a numeric field (single-valued).
    #[must_use]
    pub fn long(&self, field: FieldName) -> Option<i64> {
        match self.fields.get(&field)? {
            FieldValue::Long(value) => Some(*value),
            FieldValue::Text(text) => text.parse().ok(),
            FieldValue::Many(_) => None,
        }
    }

    /// Read an unsigned numeric field, rejecting negative values.
    #[must_use]
    pub fn unsigned(&self, field: FieldName) -> Option<u64> {
        self.long(field).and_then(|v| u64::try_from(v).ok())
    }

    /// Read a text field (single-valued).
    #[must_use]
    pub fn text(&self, field: FieldName) -> Option<&str> {
        match self.fields.get(&field)? {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Read every value of a multi-valued text field.
    #[must_use]
    pub fn texts(&self, field: FieldName) -> Vec<&str> {
        match self.fields.get(&field) {
            Some(FieldValue::Text(text)) => vec![text.as_str()],
            Some(FieldValue::Many(values)) => values
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Overwrite the content-freshness marker.
    pub fn mark_fts_status(&mut self, status: FtsStatus) {
        self.set(FieldName::FtsStatus, status.to_string());
    }

    /// Read the content-freshness marker.
    #[must_use]
    pub fn fts_status(&self) -> Option<FtsStatus> {
        match self.text(FieldName::FtsStatus)? {
            "New" => Some(FtsStatus::New),
            "Dirty" => Some(FtsStatus::Dirty),
            "Clean" => Some(FtsStatus::Clean),
            _ => None,
        }
    }
}

/// Composite document keys and the fixed state-marker keys.
pub mod doc_keys {
    /// Fixed key of the transaction state marker.
    pub const TX_STATE: &str = "TRACKER!STATE!TX";
    /// Fixed key of the ACL change-set state marker.
    pub const ACL_TX_STATE: &str = "TRACKER!STATE!ACLTX";
    /// Fixed key of the index-cap marker.
    pub const CAP_STATE: &str = "TRACKER!STATE!CAP";
    /// Prefix of error placeholder document keys.
    pub const ERROR_PREFIX: &str = "ERROR-";

    /// Key of a node document.
    #[must_use]
    pub fn node(tenant: &str, node_id: u64) -> String {
        format!("{tenant}!{node_id}")
    }

    /// Key of an error placeholder document.
    #[must_use]
    pub fn error_node(node_id: u64) -> String {
        format!("{ERROR_PREFIX}{node_id}")
    }

    /// Key of an ACL document.
    #[must_use]
    pub fn acl(tenant: &str, acl_id: u64) -> String {
        format!("{tenant}!ACL!{acl_id}")
    }

    /// Key of a transaction document.
    #[must_use]
    pub fn transaction(txn_id: u64) -> String {
        format!("TX-{txn_id}")
    }

    /// Key of an ACL change-set document.
    #[must_use]
    pub fn acl_change_set(change_set_id: u64) -> String {
        format!("ACLTX-{change_set_id}")
    }

    /// Parse a node document key back into `(tenant, node_id)`.
    #[must_use]
    pub fn parse_node(key: &str) -> Option<(String, u64)> {
        let (tenant, id) = key.rsplit_once('!')?;
        Some((tenant.to_owned(), id.parse().ok()?))
    }
}

// ---------------------------------------------------------------------------
// Tracker state
// ---------------------------------------------------------------------------

/// Resumable tracking position, owned by the tracker and read/updated only
/// through the engine's accessors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Commit time of the newest transaction confirmed indexed.
    pub last_indexed_tx_commit_time: u64,
    /// Id of the newest transaction confirmed indexed.
    pub last_indexed_tx_id: u64,
    /// Commit time of the newest ACL change set confirmed indexed.
    pub last_indexed_change_set_commit_time: u64,
    /// Id of the newest ACL change set confirmed indexed.
    pub last_indexed_change_set_id: u64,
    /// Hole-free lower bound for resuming transaction tracking.
    pub last_good_tx_commit_time: u64,
    /// Hole-free lower bound for resuming ACL change-set tracking.
    pub last_good_change_set_commit_time: u64,
    /// When the tracker last started a cycle (epoch milliseconds).
    pub last_start_time: u64,
    /// Upper bound (now minus lag) past which this cycle must not index.
    pub time_to_stop_indexing: u64,
}

// ---------------------------------------------------------------------------
// Tracker statistics
// ---------------------------------------------------------------------------

/// Cumulative tracker statistics, cheap to record from any thread.
#[derive(Debug, Default)]
pub struct TrackerStats {
    node_count: AtomicU64,
    node_time_ns: AtomicU64,
    acl_count: AtomicU64,
    acl_time_ns: AtomicU64,
    txn_count: AtomicU64,
    content_count: AtomicU64,
    content_time_ns: AtomicU64,
    error_count: AtomicU64,
}

/// Point-in-time snapshot of [`TrackerStats`], returned by the SUMMARY
/// maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
    /// Nodes indexed since start (or last reset).
    pub node_count: u64,
    /// Total time spent indexing nodes, nanoseconds.
    pub node_time_ns: u64,
    /// ACLs indexed.
    pub acl_count: u64,
    /// Total time spent indexing ACLs, nanoseconds.
    pub acl_time_ns: u64,
    /// Transactions indexed.
    pub txn_count: u64,
    /// Content harvests performed.
    pub content_count: u64,
    /// Total time spent harvesting content, nanoseconds.
    pub content_time_ns: u64,
    /// Nodes replaced by error placeholders.
    pub error_count: u64,
}

impl TrackerStats {
    /// Record one node indexing operation.
    pub fn add_node_time(&self, elapsed_ns: u64) {
        self.node_count.fetch_add(1, Ordering::Relaxed);
        self.node_time_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
    }

    /// Record one ACL indexing operation.
    pub fn add_acl_time(&self, elapsed_ns: u64) {
        self.acl_count.fetch_add(1, Ordering::Relaxed);
        self.acl_time_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
    }

    /// Record one indexed transaction.
    pub fn add_txn(&self) {
        self.txn_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one content harvest.
    pub fn add_content_time(&self, elapsed_ns: u64) {
        self.content_count.fetch_add(1, Ordering::Relaxed);
        self.content_time_ns
            .fetch_add(elapsed_ns, Ordering::Relaxed);
    }

    /// Record one node replaced by an error placeholder.
    pub fn add_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters, optionally resetting them.
    pub fn summary(&self, reset: bool) -> TrackerSummary {
        let read = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        TrackerSummary {
            node_count: read(&self.node_count),
            node_time_ns: read(&self.node_time_ns),
            acl_count: read(&self.acl_count),
            acl_time_ns: read(&self.acl_time_ns),
            txn_count: read(&self.txn_count),
            content_count: read(&self.content_count),
            content_time_ns: read(&self.content_time_ns),
            error_count: read(&self.error_count),
        }
    }
}

// ---------------------------------------------------------------------------
// Health report
// ---------------------------------------------------------------------------

/// Drift between a repository-supplied id set and the index, for one id kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdReconciliation {
    /// Documents of this kind in the index.
    pub docs_in_index: u64,
    /// Ids known to the repository.
    pub ids_in_db: u64,
    /// Distinct ids present in the index.
    pub unique_ids_in_index: u64,
    /// Ids present in the index but unknown to the repository.
    pub in_index_not_db: std::collections::BTreeSet<u64>,
    /// Ids known to the repository but missing from the index.
    pub missing_from_index: std::collections::BTreeSet<u64>,
    /// Ids present more than once in the index.
    pub duplicated_in_index: std::collections::BTreeSet<u64>,
}

/// Per-status node counts for the content pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtsStatusCounts {
    /// Nodes with up-to-date harvested content.
    pub clean: u64,
    /// Nodes with stale harvested content.
    pub dirty: u64,
    /// Nodes never harvested.
    pub new: u64,
}

/// Read-only aggregate produced by one health query; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealthReport {
    /// Transaction or ACL change-set reconciliation, per report kind.
    pub reconciliation: IdReconciliation,
    /// Document counts by kind.
    pub doc_type_counts: BTreeMap<DocType, u64>,
    /// Node ids with more than one `Node` document.
    pub duplicated_nodes: std::collections::BTreeSet<u64>,
    /// Node ids with more than one `ErrorNode` document.
    pub duplicated_error_nodes: std::collections::BTreeSet<u64>,
    /// Node ids with more than one `UnindexedNode` document.
    pub duplicated_unindexed_nodes: std::collections::BTreeSet<u64>,
    /// Content-freshness totals.
    pub fts_status_counts: FtsStatusCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindex_sentinel_is_detected() {
        let node = Node {
            id: 1,
            txn_id: Node::REINDEX_TXN,
            acl_id: 1,
            tenant: String::new(),
            status: NodeStatus::Updated,
        };
        assert!(node.is_reindex());
    }

    #[test]
    fn index_control_defaults_to_indexed() {
        let node = Node {
            id: 7,
            txn_id: 1,
            acl_id: 1,
            tenant: String::new(),
            status: NodeStatus::Deleted,
        };
        let mut meta = NodeMetaData::for_deleted_node(&node);
        assert!(meta.is_indexed());

        meta.properties
            .insert(PROP_INDEX_CONTROL.into(), PropertyValue::Flag(false));
        assert!(!meta.is_indexed());

        meta.properties
            .insert(PROP_INDEX_CONTROL.into(), PropertyValue::Flag(true));
        assert!(meta.is_indexed());
    }

    #[test]
    fn content_property_is_extracted() {
        let node = Node {
            id: 7,
            txn_id: 1,
            acl_id: 1,
            tenant: String::new(),
            status: NodeStatus::Deleted,
        };
        let mut meta = NodeMetaData::for_deleted_node(&node);
        assert!(meta.content_property().is_none());

        meta.properties.insert(
            PROP_CONTENT.into(),
            PropertyValue::Content(ContentProperty {
                content_id: 99,
                size: 10,
                mimetype: "text/plain".into(),
                encoding: "utf-8".into(),
                locale: "en".into(),
            }),
        );
        assert_eq!(meta.content_property().unwrap().content_id, 99);
    }

    #[test]
    fn authority_is_tenant_qualified() {
        assert_eq!(tenant_qualified_authority("alice", ""), "alice");
        assert_eq!(tenant_qualified_authority("alice", "acme"), "alice@acme");
    }

    #[test]
    fn document_set_and_read_back() {
        let mut doc = IndexDocument::new(doc_keys::node("t", 5), DocType::Node);
        doc.set(FieldName::DbId, 5_u64);
        doc.set(FieldName::Tenant, "t");
        assert_eq!(doc.long(FieldName::DbId), Some(5));
        assert_eq!(doc.unsigned(FieldName::DbId), Some(5));
        assert_eq!(doc.text(FieldName::Tenant), Some("t"));
        assert!(doc.long(FieldName::TxId).is_none());
    }

    #[test]
    fn multi_valued_fields_accumulate() {
        let mut doc = IndexDocument::new("k", DocType::Node);
        doc.add(FieldName::Path, "/a");
        doc.add(FieldName::Path, "/b");
        assert_eq!(doc.texts(FieldName::Path), vec!["/a", "/b"]);

        // A single value promoted to multi-valued keeps the original.
        doc.set(FieldName::Aspect, "one");
        doc.add(FieldName::Aspect, "two");
        assert_eq!(doc.texts(FieldName::Aspect), vec!["one", "two"]);
    }

    #[test]
    fn fts_status_round_trips_through_the_field() {
        let mut doc = IndexDocument::new("k", DocType::Node);
        assert!(doc.fts_status().is_none());
        doc.mark_fts_status(FtsStatus::Dirty);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Dirty));
        assert!(doc.fts_status().unwrap().needs_harvest());
        doc.mark_fts_status(FtsStatus::Clean);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Clean));
        assert!(!doc.fts_status().unwrap().needs_harvest());
    }

    #[test]
    fn node_keys_round_trip() {
        let key = doc_keys::node("acme", 123);
        assert_eq!(doc_keys::parse_node(&key), Some(("acme".into(), 123)));
        assert_eq!(doc_keys::parse_node("garbage"), None);
    }

    #[test]
    fn state_keys_are_fixed() {
        assert_eq!(doc_keys::TX_STATE, "TRACKER!STATE!TX");
        assert_eq!(doc_keys::ACL_TX_STATE, "TRACKER!STATE!ACLTX");
        assert_eq!(doc_keys::error_node(9), "ERROR-9");
    }

    #[test]
    fn stats_summary_and_reset() {
        let stats = TrackerStats::default();
        stats.add_node_time(100);
        stats.add_node_time(50);
        stats.add_error();

        let summary = stats.summary(false);
        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.node_time_ns, 150);
        assert_eq!(summary.error_count, 1);

        let reset = stats.summary(true);
        assert_eq!(reset.node_count, 2);
        assert_eq!(stats.summary(false).node_count, 0);
    }

    #[test]
    fn document_serde_round_trip() {
        let mut doc = IndexDocument::new(doc_keys::transaction(4), DocType::Tx);
        doc.set(FieldName::TxId, 4_u64);
        doc.set(FieldName::TxCommitTime, 1_700_000_000_000_u64);
        doc.set(FieldName::CascadeFlag, 1_i64);

        let json = serde_json::to_string(&doc).expect("serialize");
        let back: IndexDocument = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(doc, back);
    }
}
