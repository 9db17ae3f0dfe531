//! In-memory test doubles for the engine's external collaborators.
//!
//! [`InMemoryIndex`] implements the full [`SearchIndex`] contract over two
//! document maps (working and committed) so commit/rollback semantics can be
//! exercised; [`ScriptedRepository`] serves canned metadata and text content
//! and can be told to fail specific nodes.
//!
//! These doubles back both the unit tests in this crate and the integration
//! tests under `tests/`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use mirrorsearch_core::{
    CommitMode, DeleteSelector, DocType, EngineError, EngineResult, FieldName, IndexDocument,
    IndexQuery, MetadataRequest, NodeMetaData, QueryFilter, RepositoryReader, SearchIndex,
    SortOrder, TextContent, TransformStatus,
};

// ---------------------------------------------------------------------------
// In-memory index
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct IndexState {
    working: BTreeMap<String, IndexDocument>,
    committed: BTreeMap<String, IndexDocument>,
    soft_commits: u64,
    hard_commits: u64,
    rollbacks: u64,
}

/// In-memory [`SearchIndex`] with real-time reads and commit/rollback.
///
/// Reads (`get`, `search`, `count`, facets) see uncommitted writes, matching
/// the real-time semantics state markers rely on; `rollback` restores the
/// last committed view.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: Mutex<IndexState>,
}

impl InMemoryIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in the working view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().working.len()
    }

    /// Whether the working view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in the working view, for assertions.
    #[must_use]
    pub fn all_docs(&self) -> Vec<IndexDocument> {
        self.lock().working.values().cloned().collect()
    }

    /// How many soft commits have run.
    #[must_use]
    pub fn soft_commits(&self) -> u64 {
        self.lock().soft_commits
    }

    /// How many hard commits have run.
    #[must_use]
    pub fn hard_commits(&self) -> u64 {
        self.lock().hard_commits
    }

    /// How many rollbacks have run.
    #[must_use]
    pub fn rollbacks(&self) -> u64 {
        self.lock().rollbacks
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn is_node_rooted(doc_type: DocType) -> bool {
    matches!(
        doc_type,
        DocType::Node | DocType::UnindexedNode | DocType::ErrorNode
    )
}

fn matches_filter(doc: &IndexDocument, filter: &QueryFilter) -> bool {
    match filter {
        QueryFilter::All => true,
        QueryFilter::DocType(doc_type) => doc.doc_type == *doc_type,
        QueryFilter::UncleanContent => {
            doc.doc_type == DocType::Node
                && doc.fts_status().is_some_and(|status| status.needs_harvest())
        }
        QueryFilter::PendingCascades => {
            doc.doc_type == DocType::Tx && doc.long(FieldName::CascadeFlag) == Some(1)
        }
        QueryFilter::Ancestor(node_ref) => doc
            .texts(FieldName::Ancestor)
            .iter()
            .any(|ancestor| ancestor == node_ref),
        QueryFilter::FieldLong(field, value) => doc.long(*field) == Some(*value),
        QueryFilter::FieldText(field, value) => doc.text(*field) == Some(value.as_str()),
    }
}

impl SearchIndex for InMemoryIndex {
    fn add(&self, doc: &IndexDocument, overwrite: bool) -> EngineResult<()> {
        let mut state = self.lock();
        if !overwrite && state.working.contains_key(&doc.id) {
            return Ok(());
        }
        state.working.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn delete(&self, selector: &DeleteSelector) -> EngineResult<()> {
        let mut state = self.lock();
        let retain = |doc: &IndexDocument| -> bool {
            // True keeps the document.
            match selector {
                DeleteSelector::Key(key) => doc.id != *key,
                DeleteSelector::NodeId(node_id) => {
                    !(is_node_rooted(doc.doc_type)
                        && doc.unsigned(FieldName::DbId) == Some(*node_id))
                }
                DeleteSelector::TransactionId(txn_id) => {
                    !(doc.doc_type == DocType::Tx
                        && doc.unsigned(FieldName::TxId) == Some(*txn_id))
                }
                DeleteSelector::AclId(acl_id) => {
                    !(doc.doc_type == DocType::Acl
                        && doc.unsigned(FieldName::AclId) == Some(*acl_id))
                }
                DeleteSelector::AclChangeSetId(change_set_id) => {
                    !(doc.doc_type == DocType::AclTx
                        && doc.unsigned(FieldName::AclTxId) == Some(*change_set_id))
                }
                DeleteSelector::NodeIdAbove(bound) => {
                    !(is_node_rooted(doc.doc_type)
                        && doc.unsigned(FieldName::DbId).is_some_and(|id| id > *bound))
                }
            }
        };
        state.working.retain(|_, doc| retain(doc));
        Ok(())
    }

    fn get(&self, id: &str) -> EngineResult<Option<IndexDocument>> {
        Ok(self.lock().working.get(id).cloned())
    }

    fn search(&self, query: &IndexQuery) -> EngineResult<Vec<IndexDocument>> {
        let state = self.lock();
        let mut docs: Vec<IndexDocument> = state
            .working
            .values()
            .filter(|doc| matches_filter(doc, &query.filter))
            .cloned()
            .collect();
        if let Some((field, order)) = query.sort {
            docs.sort_by_key(|doc| doc.long(field).unwrap_or(i64::MAX));
            if order == SortOrder::Descending {
                docs.reverse();
            }
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    fn count(&self, filter: &QueryFilter) -> EngineResult<u64> {
        let state = self.lock();
        Ok(state
            .working
            .values()
            .filter(|doc| matches_filter(doc, filter))
            .count() as u64)
    }

    fn facet_ids(
        &self,
        field: FieldName,
        start: u64,
        end: u64,
        min_count: u64,
    ) -> EngineResult<Vec<(u64, u64)>> {
        let state = self.lock();
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for doc in state.working.values() {
            if let Some(id) = doc.unsigned(field) {
                if id >= start && id <= end {
                    *counts.entry(id).or_insert(0) += 1;
                }
            }
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .collect())
    }

    fn doc_type_counts(&self) -> EngineResult<BTreeMap<DocType, u64>> {
        let state = self.lock();
        let mut counts = BTreeMap::new();
        for doc in state.working.values() {
            *counts.entry(doc.doc_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn top_node_id(&self, order: SortOrder) -> EngineResult<Option<u64>> {
        let state = self.lock();
        let ids = state
            .working
            .values()
            .filter(|doc| doc.doc_type == DocType::Node)
            .filter_map(|doc| doc.unsigned(FieldName::DbId));
        Ok(match order {
            SortOrder::Ascending => ids.min(),
            SortOrder::Descending => ids.max(),
        })
    }

    fn commit(&self, mode: CommitMode) -> EngineResult<()> {
        let mut state = self.lock();
        state.committed = state.working.clone();
        match mode {
            CommitMode::Soft => state.soft_commits += 1,
            CommitMode::Hard => state.hard_commits += 1,
        }
        Ok(())
    }

    fn rollback(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.working = state.committed.clone();
        state.rollbacks += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted repository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RepoState {
    metadata: HashMap<u64, NodeMetaData>,
    content: HashMap<(u64, u64), TextContent>,
    fail_metadata_for: HashSet<u64>,
    fail_content_for: HashSet<u64>,
    metadata_calls: u64,
}

/// [`RepositoryReader`] serving canned responses.
#[derive(Debug, Default)]
pub struct ScriptedRepository {
    state: Mutex<RepoState>,
}

impl ScriptedRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this metadata for its node id.
    pub fn put_metadata(&self, meta: NodeMetaData) {
        self.lock().metadata.insert(meta.id, meta);
    }

    /// Forget a node, as if it were deleted repository-side.
    pub fn remove_metadata(&self, node_id: u64) {
        self.lock().metadata.remove(&node_id);
    }

    /// Serve this text content for `(node_id, content_id)`.
    pub fn put_content(&self, node_id: u64, content_id: u64, text: &str) {
        self.lock().content.insert(
            (node_id, content_id),
            TextContent {
                text: text.to_owned(),
                transform_status: TransformStatus::Ok,
                transform_exception: None,
                transform_duration_ms: 1,
            },
        );
    }

    /// Make metadata fetches that include this node fail.
    pub fn fail_metadata_for(&self, node_id: u64) {
        self.lock().fail_metadata_for.insert(node_id);
    }

    /// Stop failing metadata fetches for this node.
    pub fn heal_metadata_for(&self, node_id: u64) {
        self.lock().fail_metadata_for.remove(&node_id);
    }

    /// Make content fetches for this node fail.
    pub fn fail_content_for(&self, node_id: u64) {
        self.lock().fail_content_for.insert(node_id);
    }

    /// How many metadata fetches have been served.
    #[must_use]
    pub fn metadata_calls(&self) -> u64 {
        self.lock().metadata_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl RepositoryReader for ScriptedRepository {
    fn node_metadata(&self, request: &MetadataRequest) -> EngineResult<Vec<NodeMetaData>> {
        let mut state = self.lock();
        state.metadata_calls += 1;
        for node_id in &request.node_ids {
            if state.fail_metadata_for.contains(node_id) {
                return Err(EngineError::repository(
                    "node_metadata",
                    std::io::Error::other(format!("scripted failure for node {node_id}")),
                ));
            }
        }
        Ok(request
            .node_ids
            .iter()
            .filter_map(|node_id| state.metadata.get(node_id).cloned())
            .collect())
    }

    fn text_content(&self, node_id: u64, content_id: u64) -> EngineResult<TextContent> {
        let state = self.lock();
        if state.fail_content_for.contains(&node_id) {
            return Err(EngineError::repository(
                "text_content",
                std::io::Error::other(format!("scripted content failure for node {node_id}")),
            ));
        }
        Ok(state
            .content
            .get(&(node_id, content_id))
            .cloned()
            .unwrap_or_else(|| TextContent {
                text: format!("text of node {node_id} revision {content_id}"),
                transform_status: TransformStatus::Ok,
                transform_exception: None,
                transform_duration_ms: 1,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsearch_core::types::doc_keys;

    fn node_doc(tenant: &str, node_id: u64, txn_id: u64) -> IndexDocument {
        let mut doc = IndexDocument::new(doc_keys::node(tenant, node_id), DocType::Node);
        doc.set(FieldName::DbId, node_id);
        doc.set(FieldName::InTxId, txn_id);
        doc.set(FieldName::Tenant, tenant);
        doc
    }

    #[test]
    fn add_get_delete_round_trip() {
        let index = InMemoryIndex::new();
        index.add(&node_doc("t", 1, 1), true).unwrap();
        assert!(index.get("t!1").unwrap().is_some());

        index.delete(&DeleteSelector::NodeId(1)).unwrap();
        assert!(index.get("t!1").unwrap().is_none());
    }

    #[test]
    fn delete_by_node_id_takes_error_docs_too() {
        let index = InMemoryIndex::new();
        index.add(&node_doc("t", 1, 1), true).unwrap();
        let mut error_doc = IndexDocument::new(doc_keys::error_node(1), DocType::ErrorNode);
        error_doc.set(FieldName::DbId, 1_u64);
        index.add(&error_doc, true).unwrap();

        index.delete(&DeleteSelector::NodeId(1)).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn rollback_restores_committed_view() {
        let index = InMemoryIndex::new();
        index.add(&node_doc("t", 1, 1), true).unwrap();
        index.commit(CommitMode::Soft).unwrap();

        index.add(&node_doc("t", 2, 1), true).unwrap();
        assert_eq!(index.len(), 2);

        index.rollback().unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get("t!1").unwrap().is_some());
    }

    #[test]
    fn facets_respect_range_and_min_count() {
        let index = InMemoryIndex::new();
        for (node_id, txn_id) in [(1, 10), (2, 10), (3, 11), (4, 30)] {
            index.add(&node_doc("t", node_id, txn_id), true).unwrap();
        }
        let facets = index.facet_ids(FieldName::InTxId, 10, 20, 1).unwrap();
        assert_eq!(facets, vec![(10, 2), (11, 1)]);

        let duplicated = index.facet_ids(FieldName::InTxId, 0, 100, 2).unwrap();
        assert_eq!(duplicated, vec![(10, 2)]);
    }

    #[test]
    fn sorted_search_orders_numerically() {
        let index = InMemoryIndex::new();
        for (node_id, txn_id) in [(1, 30), (2, 10), (3, 20)] {
            index.add(&node_doc("t", node_id, txn_id), true).unwrap();
        }
        let docs = index
            .search(
                &IndexQuery::filtered(QueryFilter::DocType(DocType::Node))
                    .sorted_by(FieldName::InTxId, SortOrder::Ascending),
            )
            .unwrap();
        let txns: Vec<i64> = docs
            .iter()
            .filter_map(|doc| doc.long(FieldName::InTxId))
            .collect();
        assert_eq!(txns, vec![10, 20, 30]);
    }

    #[test]
    fn scripted_repository_fails_on_demand() {
        let repo = ScriptedRepository::new();
        repo.fail_metadata_for(7);
        let err = repo
            .node_metadata(&MetadataRequest::full(7))
            .unwrap_err();
        assert!(err.to_string().contains("node_metadata"));

        repo.heal_metadata_for(7);
        assert!(repo.node_metadata(&MetadataRequest::full(7)).unwrap().is_empty());
    }
}
