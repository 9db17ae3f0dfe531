//! The indexing/consistency engine.
//!
//! One [`IndexEngine`] instance is shared by every tracker thread of an index
//! core. It receives node/ACL/transaction events, builds documents, acquires
//! per-node locks, writes through to the index engine, maintains state
//! markers, and answers health/report queries.
//!
//! Failure semantics: any error while building/writing a node's document is
//! caught and the node is replaced by an `ErrorNode` placeholder carrying the
//! error message and a truncated failure trace. Errors are not retried
//! automatically; [`IndexEngine::retry_error_nodes`] re-queues every node
//! currently error-flagged. Bulk indexing degrades to one-node-at-a-time
//! processing instead of aborting the whole batch.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use mirrorsearch_core::types::doc_keys;
use mirrorsearch_core::{
    CommitMode, DeleteSelector, DocType, DocumentCache, EngineError, EngineResult, FieldName,
    HarvestCache, IndexDocument, IndexQuery, MembershipCache, MetadataRequest, Node,
    NodeLockRegistry, NodeMetaData, NodeStatus, QueryFilter, RepositoryReader, SearchIndex,
    TrackerStats, TrackerSummary, Transaction,
};

use crate::config::EngineConfig;
use crate::document;
use crate::gate::{WriteGate, WriterToken};

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Render an error and its source chain for an error placeholder document.
pub(crate) fn error_trace(error: &EngineError) -> String {
    let mut trace = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

/// The shared indexing engine for one index core.
pub struct IndexEngine {
    pub(crate) index: Arc<dyn SearchIndex>,
    pub(crate) repository: Arc<dyn RepositoryReader>,
    pub(crate) document_cache: Arc<dyn DocumentCache>,
    pub(crate) config: EngineConfig,
    pub(crate) locks: NodeLockRegistry,
    pub(crate) gate: WriteGate,
    /// Serializes commit and rollback against each other.
    pub(crate) commit_and_rollback: Mutex<()>,
    /// Serializes shard range expansion against itself.
    pub(crate) expand_guard: Mutex<()>,
    /// Transactions confirmed present in the index.
    pub(crate) txn_cache: MembershipCache,
    /// ACL change sets confirmed present in the index.
    pub(crate) change_set_cache: MembershipCache,
    /// Transactions whose dirty/new content has already been harvested.
    pub(crate) harvested: HarvestCache,
    /// Transactions already cascade-processed.
    pub(crate) cascade_processed: MembershipCache,
    pub(crate) stats: TrackerStats,
}

impl IndexEngine {
    /// Create an engine over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(
        index: Arc<dyn SearchIndex>,
        repository: Arc<dyn RepositoryReader>,
        document_cache: Arc<dyn DocumentCache>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let locks = NodeLockRegistry::new(
            Duration::from_millis(config.lock_timeout_ms),
            Duration::from_millis(config.lock_poll_ms),
        );
        let txn_cache = MembershipCache::new(config.membership_cache_capacity);
        let change_set_cache = MembershipCache::new(config.membership_cache_capacity);
        let cascade_processed = MembershipCache::new(config.membership_cache_capacity);
        let harvested = HarvestCache::new(
            config.harvest_cache_capacity,
            config.harvest_retention_ms,
            config.harvest_purge_interval_ms,
        );
        Ok(Self {
            index,
            repository,
            document_cache,
            config,
            locks,
            gate: WriteGate::new(),
            commit_and_rollback: Mutex::new(()),
            expand_guard: Mutex::new(()),
            txn_cache,
            change_set_cache,
            harvested,
            cascade_processed,
            stats: TrackerStats::default(),
        })
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether cascade tracking is enabled on this core.
    #[must_use]
    pub fn cascade_tracking_enabled(&self) -> bool {
        self.config.cascade_tracking_enabled
    }

    // -----------------------------------------------------------------------
    // Tracker registration and commit/rollback
    // -----------------------------------------------------------------------

    /// Register the calling tracker for one cycle of writes.
    pub fn register_tracker(&self) -> WriterToken {
        self.gate.register()
    }

    /// Deregister a tracker at the end of its cycle.
    pub fn deregister_tracker(&self, token: &WriterToken) {
        self.gate.deregister(token);
    }

    /// Soft-commit pending index mutations.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated, or
    /// an index error if the commit itself fails.
    pub fn commit(&self, token: &WriterToken) -> EngineResult<()> {
        let _serialize = self
            .commit_and_rollback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.gate.check_writable(token)?;
        self.index.commit(CommitMode::Soft)
    }

    /// Hard-commit pending index mutations (durable flush).
    ///
    /// Runs from maintenance paths (shard expansion), so it is not gated on a
    /// writer token.
    pub fn hard_commit(&self) -> EngineResult<()> {
        let _serialize = self
            .commit_and_rollback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.index.commit(CommitMode::Hard)
    }

    /// Discard uncommitted index mutations and invalidate all writers.
    ///
    /// Every freshness cache is purged: entries recorded for uncommitted
    /// documents would otherwise claim work as done that the rollback undid.
    pub fn rollback(&self) -> EngineResult<()> {
        let _serialize = self
            .commit_and_rollback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        info!(generation = self.gate.generation(), "rolling back index core");
        self.gate.invalidate_writers();
        self.txn_cache.clear();
        self.change_set_cache.clear();
        self.harvested.clear();
        self.cascade_processed.clear();
        self.index.rollback()
    }

    // -----------------------------------------------------------------------
    // Node indexing
    // -----------------------------------------------------------------------

    /// Index one node event.
    ///
    /// Leaves the index consistent even under partial failure: a failed node
    /// is replaced by an `ErrorNode` placeholder and the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated, or
    /// an index error if even the error placeholder cannot be written.
    pub fn index_node(
        &self,
        node: &Node,
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        let start = Instant::now();
        debug!(node_id = node.id, status = %node.status, txn_id = node.txn_id, "indexing node");

        if let Err(error) = self.index_node_inner(node, overwrite) {
            if error.invalidates_cycle() {
                return Err(error);
            }
            warn!(
                node_id = node.id,
                txn_id = node.txn_id,
                %error,
                "node index failed and skipped; recording error placeholder"
            );
            let placeholder = document::build_error_document(
                node,
                &error.to_string(),
                &error_trace(&error),
                self.config.error_trace_cap_bytes,
            );
            self.index.add(&placeholder, overwrite)?;
            self.stats.add_error();
        }

        self.stats
            .add_node_time(u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX));
        Ok(())
    }

    fn index_node_inner(&self, node: &Node, overwrite: bool) -> EngineResult<()> {
        let cascade = self.config.cascade_tracking_enabled;

        let deletes = matches!(node.status, NodeStatus::Deleted | NodeStatus::Unknown)
            || (cascade
                && matches!(
                    node.status,
                    NodeStatus::ShardDeleted | NodeStatus::ShardUpdated
                ));
        if deletes {
            self.delete_node_event(node)?;
        }

        let updates = matches!(node.status, NodeStatus::Updated | NodeStatus::Unknown)
            || (cascade && node.status == NodeStatus::ShardUpdated);
        if updates {
            self.update_node_event(node, overwrite)?;
        }
        Ok(())
    }

    /// Remove a node's cached document and every index document for its id.
    fn delete_node_event(&self, node: &Node) -> EngineResult<()> {
        if node.status != NodeStatus::Deleted {
            // The repository may still know the node (unknown/shard events);
            // the fetch is best-effort context for logging only.
            let known = self
                .repository
                .node_metadata(&MetadataRequest::minimal(vec![node.id]))?;
            debug!(
                node_id = node.id,
                known_to_repository = !known.is_empty(),
                "deleting node"
            );
        }
        let _guard = self.locks.acquire(node.id)?;
        self.document_cache.remove(&node.tenant, node.id)?;
        self.index.delete(&DeleteSelector::NodeId(node.id))
    }

    fn update_node_event(&self, node: &Node, overwrite: bool) -> EngineResult<()> {
        let _guard = self.locks.acquire(node.id)?;

        let metas = self
            .repository
            .node_metadata(&MetadataRequest::full(node.id))?;
        let Some(meta) = metas.into_iter().next() else {
            return Err(EngineError::MetadataMissing { node_id: node.id });
        };

        if meta.txn_id > node.txn_id {
            // The node has moved on to a later transaction; it will be
            // indexed when that transaction is processed.
            debug!(node_id = node.id, event_txn = node.txn_id, current_txn = meta.txn_id, "stale event skipped");
            return Ok(());
        }

        if node.is_reindex() {
            self.harvested.remove(meta.txn_id);
        }

        match node.status {
            NodeStatus::Updated | NodeStatus::Unknown => {
                self.write_node_document(node, &meta, overwrite)
            }
            NodeStatus::ShardUpdated => {
                if meta.cascade_txn.is_some() {
                    self.index_non_shard_cascade(&meta)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Build and write the document for an updated node. Caller holds the
    /// node lock.
    pub(crate) fn write_node_document(
        &self,
        node: &Node,
        meta: &NodeMetaData,
        overwrite: bool,
    ) -> EngineResult<()> {
        if !meta.is_indexed() {
            debug!(node_id = meta.id, "node opts out of indexing");
            self.index.delete(&DeleteSelector::NodeId(node.id))?;
            self.document_cache.remove(&meta.tenant, meta.id)?;
            if self.config.record_unindexed_nodes {
                let placeholder = document::build_unindexed_document(meta);
                self.index.add(&placeholder, overwrite)?;
            }
            return Ok(());
        }

        let cached = self.document_cache.retrieve(&meta.tenant, meta.id)?;
        let doc = document::build_node_document(meta, cached.as_ref(), &self.config);

        // Old documents (including any error placeholder) go before the new
        // one lands, within the same locked section.
        self.index.delete(&DeleteSelector::NodeId(node.id))?;
        self.document_cache.store(&meta.tenant, meta.id, &doc)?;
        self.index.add(&doc, overwrite)
    }

    /// Index a batch of node events.
    ///
    /// The bulk path shares metadata fetches; if it fails, the batch degrades
    /// to one-node-at-a-time processing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn index_nodes(
        &self,
        nodes: &[Node],
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        match self.index_nodes_bulk(nodes, overwrite) {
            Ok(()) => Ok(()),
            Err(error) if error.invalidates_cycle() => Err(error),
            Err(error) => {
                warn!(%error, "bulk indexing failed, retrying one node at a time");
                for node in nodes {
                    self.index_node(node, token, true)?;
                }
                Ok(())
            }
        }
    }

    fn index_nodes_bulk(&self, nodes: &[Node], overwrite: bool) -> EngineResult<()> {
        let cascade = self.config.cascade_tracking_enabled;
        let by_id: std::collections::HashMap<u64, &Node> =
            nodes.iter().map(|node| (node.id, node)).collect();

        let mut deleted = Vec::new();
        let mut unknown = Vec::new();
        let mut updated = Vec::new();
        let mut shard_updated = Vec::new();
        let mut shard_deleted = Vec::new();
        for node in nodes {
            match node.status {
                NodeStatus::Deleted => deleted.push(node.id),
                NodeStatus::Unknown => unknown.push(node.id),
                NodeStatus::Updated => updated.push(node.id),
                NodeStatus::ShardUpdated if cascade => shard_updated.push(node.id),
                NodeStatus::ShardDeleted if cascade => shard_deleted.push(node.id),
                NodeStatus::ShardUpdated | NodeStatus::ShardDeleted => {}
            }
        }

        // Delete phase: deleted, unknown, and shard events all clear the
        // node's documents first.
        if !deleted.is_empty()
            || !unknown.is_empty()
            || !shard_deleted.is_empty()
            || !shard_updated.is_empty()
        {
            let mut metas: Vec<NodeMetaData> = deleted
                .iter()
                .filter_map(|id| by_id.get(id))
                .map(|node| NodeMetaData::for_deleted_node(node))
                .collect();
            if !unknown.is_empty() {
                metas.extend(
                    self.repository
                        .node_metadata(&MetadataRequest::minimal(unknown.clone()))?,
                );
            }

            let mut to_delete: Vec<u64> = Vec::new();
            for meta in &metas {
                if let Some(node) = by_id.get(&meta.id) {
                    if meta.txn_id > node.txn_id {
                        // Moved on to a later transaction; indexed later.
                        continue;
                    }
                }
                to_delete.push(meta.id);
            }
            to_delete.extend(shard_deleted.iter().copied());
            to_delete.extend(shard_updated.iter().copied());

            debug!(doc_count = to_delete.len(), "bulk deleting nodes");
            for node_id in to_delete {
                let tenant = by_id
                    .get(&node_id)
                    .map(|node| node.tenant.as_str())
                    .unwrap_or_default();
                let _guard = self.locks.acquire(node_id)?;
                self.document_cache.remove(tenant, node_id)?;
                self.index.delete(&DeleteSelector::NodeId(node_id))?;
            }
        }

        // Update phase.
        let mut to_update = updated;
        to_update.extend(unknown);
        to_update.extend(shard_updated);
        if to_update.is_empty() {
            return Ok(());
        }

        let metas = self.repository.node_metadata(&MetadataRequest::full_batch(
            to_update,
            self.config.paths_in_node_batches,
        ))?;

        for meta in metas {
            let Some(node) = by_id.get(&meta.id).copied() else {
                continue;
            };
            let start = Instant::now();

            if meta.txn_id > node.txn_id {
                continue;
            }

            if node.status == NodeStatus::ShardUpdated {
                if meta.cascade_txn.is_some() {
                    self.index_non_shard_cascade(&meta)?;
                }
                continue;
            }

            if node.is_reindex() {
                self.harvested.remove(meta.txn_id);
            }

            // Path data may be excluded from bulk fetches; recover it per node.
            let meta = if self.config.paths_in_node_batches {
                meta
            } else {
                match self
                    .repository
                    .node_metadata(&MetadataRequest::full(meta.id))?
                    .into_iter()
                    .next()
                {
                    Some(full) => full,
                    None => continue,
                }
            };

            let _guard = self.locks.acquire(meta.id)?;
            self.write_node_document(node, &meta, overwrite)?;
            self.stats
                .add_node_time(u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX));
        }
        Ok(())
    }

    /// Record the cascade token of a node whose full document lives on
    /// another shard; the cascade tracker needs only the reference and token.
    pub(crate) fn index_non_shard_cascade(&self, meta: &NodeMetaData) -> EngineResult<()> {
        let Some(cascade_txn) = meta.cascade_txn else {
            return Ok(());
        };
        let mut doc = IndexDocument::new(doc_keys::node(&meta.tenant, meta.id), DocType::Node);
        doc.set(FieldName::DbId, meta.id);
        doc.set(FieldName::CascadeTx, cascade_txn);
        self.index.add(&doc, true)
    }

    // -----------------------------------------------------------------------
    // ACL indexing
    // -----------------------------------------------------------------------

    /// Index one `Acl` document per ACL reader set.
    ///
    /// Returns the elapsed time in nanoseconds, for tracker statistics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn index_acl(
        &self,
        acl_readers: &[mirrorsearch_core::AclReaders],
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<u64> {
        self.gate.check_writable(token)?;
        let start = Instant::now();
        for readers in acl_readers {
            let mut doc = IndexDocument::new(
                doc_keys::acl(&readers.tenant, readers.acl_id),
                DocType::Acl,
            );
            doc.set(FieldName::AclId, readers.acl_id);
            doc.set(FieldName::InAclTxId, readers.change_set_id);
            for reader in &readers.readers {
                doc.add(
                    FieldName::Reader,
                    mirrorsearch_core::types::tenant_qualified_authority(reader, &readers.tenant),
                );
            }
            for denied in &readers.denied {
                doc.add(
                    FieldName::Denied,
                    mirrorsearch_core::types::tenant_qualified_authority(denied, &readers.tenant),
                );
            }
            self.index.add(&doc, overwrite)?;
        }
        let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.stats.add_acl_time(elapsed);
        Ok(elapsed)
    }

    // -----------------------------------------------------------------------
    // Transaction indexing
    // -----------------------------------------------------------------------

    /// Index a transaction document and refresh the transaction state marker.
    ///
    /// When cascade tracking is enabled the document carries the
    /// cascade-pending flag set to 1; [`IndexEngine::update_transaction`]
    /// clears it once cascades for the transaction are confirmed complete.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn index_transaction(
        &self,
        txn: &Transaction,
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        let mut doc = IndexDocument::new(doc_keys::transaction(txn.id), DocType::Tx);
        doc.set(FieldName::TxId, txn.id);
        doc.set(FieldName::InTxId, txn.id);
        doc.set(FieldName::TxCommitTime, txn.commit_time_ms);
        // Stored copies feed the cascade scan and the transaction rewrite.
        doc.set(FieldName::StateTxId, txn.id);
        doc.set(FieldName::StateTxCommitTime, txn.commit_time_ms);
        if self.config.cascade_tracking_enabled {
            doc.set(FieldName::CascadeFlag, 1_i64);
        }
        self.index.add(&doc, overwrite)?;
        self.put_transaction_state(txn)?;
        self.stats.add_txn();
        Ok(())
    }

    /// Rewrite a transaction document with its cascade flag cleared.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn update_transaction(&self, txn: &Transaction, token: &WriterToken) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        let mut doc = IndexDocument::new(doc_keys::transaction(txn.id), DocType::Tx);
        doc.set(FieldName::TxId, txn.id);
        doc.set(FieldName::InTxId, txn.id);
        doc.set(FieldName::TxCommitTime, txn.commit_time_ms);
        if self.config.cascade_tracking_enabled {
            doc.set(FieldName::CascadeFlag, 0_i64);
        }
        self.index.add(&doc, true)
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Delete the document of a transaction.
    pub fn delete_by_transaction_id(
        &self,
        txn_id: u64,
        token: &WriterToken,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        self.txn_cache.remove(txn_id);
        self.index.delete(&DeleteSelector::TransactionId(txn_id))
    }

    /// Delete the document of an ACL change set.
    pub fn delete_by_acl_change_set_id(
        &self,
        change_set_id: u64,
        token: &WriterToken,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        self.change_set_cache.remove(change_set_id);
        self.index
            .delete(&DeleteSelector::AclChangeSetId(change_set_id))
    }

    /// Delete the document of an ACL.
    pub fn delete_by_acl_id(&self, acl_id: u64, token: &WriterToken) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        self.index.delete(&DeleteSelector::AclId(acl_id))
    }

    /// Delete every document carrying a node id.
    pub fn delete_by_node_id(&self, node_id: u64, token: &WriterToken) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        self.index.delete(&DeleteSelector::NodeId(node_id))
    }

    // -----------------------------------------------------------------------
    // Membership queries
    // -----------------------------------------------------------------------

    /// Whether a transaction is present in the index.
    ///
    /// `populate_cache` records a positive answer in the bounded membership
    /// cache so later calls skip the index.
    pub fn txn_in_index(&self, txn_id: u64, populate_cache: bool) -> EngineResult<bool> {
        if self.txn_cache.contains(txn_id) {
            return Ok(true);
        }
        let id = i64::try_from(txn_id).unwrap_or(i64::MAX);
        let found = self.index.count(&QueryFilter::FieldLong(FieldName::TxId, id))? > 0;
        if found && populate_cache {
            self.txn_cache.insert(txn_id);
        }
        Ok(found)
    }

    /// Whether an ACL change set is present in the index.
    pub fn acl_change_set_in_index(
        &self,
        change_set_id: u64,
        populate_cache: bool,
    ) -> EngineResult<bool> {
        if self.change_set_cache.contains(change_set_id) {
            return Ok(true);
        }
        let id = i64::try_from(change_set_id).unwrap_or(i64::MAX);
        let found = self
            .index
            .count(&QueryFilter::FieldLong(FieldName::AclTxId, id))?
            > 0;
        if found && populate_cache {
            self.change_set_cache.insert(change_set_id);
        }
        Ok(found)
    }

    /// Purge the transaction membership cache.
    pub fn clear_processed_transactions(&self) {
        self.txn_cache.clear();
    }

    /// Purge the ACL change-set membership cache.
    pub fn clear_processed_acl_change_sets(&self) {
        self.change_set_cache.clear();
    }

    /// Re-surface a transaction for content harvesting and cascading.
    pub fn dirty_transaction(&self, txn_id: u64) {
        self.harvested.remove(txn_id);
        if self.config.cascade_tracking_enabled {
            self.cascade_processed.remove(txn_id);
        }
    }

    // -----------------------------------------------------------------------
    // Error nodes and maintenance
    // -----------------------------------------------------------------------

    /// Node ids of every error placeholder currently in the index.
    pub fn get_error_doc_ids(&self) -> EngineResult<Vec<u64>> {
        let docs = self.index.search(&IndexQuery::filtered(QueryFilter::DocType(
            DocType::ErrorNode,
        )))?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.unsigned(FieldName::DbId))
            .collect())
    }

    /// Re-queue every node currently recorded as an error placeholder.
    ///
    /// Returns the node ids that were re-queued.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn retry_error_nodes(&self, token: &WriterToken) -> EngineResult<Vec<u64>> {
        let node_ids = self.get_error_doc_ids()?;
        info!(doc_count = node_ids.len(), "retrying error nodes");
        for &node_id in &node_ids {
            let node = Node {
                id: node_id,
                txn_id: Node::REINDEX_TXN,
                acl_id: 0,
                tenant: String::new(),
                status: NodeStatus::Updated,
            };
            self.index_node(&node, token, true)?;
        }
        Ok(node_ids)
    }

    /// Force a re-index of every node matching an index query.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if the writer was invalidated.
    pub fn reindex_nodes_by_query(
        &self,
        filter: &QueryFilter,
        token: &WriterToken,
    ) -> EngineResult<u64> {
        let docs = self.index.search(&IndexQuery::filtered(filter.clone()))?;
        let mut queued = 0;
        for doc in &docs {
            let Some(node_id) = doc.unsigned(FieldName::DbId) else {
                continue;
            };
            let node = Node {
                id: node_id,
                txn_id: Node::REINDEX_TXN,
                acl_id: doc.unsigned(FieldName::AclId).unwrap_or(0),
                tenant: doc.text(FieldName::Tenant).unwrap_or_default().to_owned(),
                status: NodeStatus::Updated,
            };
            self.index_node(&node, token, true)?;
            queued += 1;
        }
        Ok(queued)
    }

    // -----------------------------------------------------------------------
    // Counts and the index cap
    // -----------------------------------------------------------------------

    /// Number of `Node` documents in the index.
    pub fn node_count(&self) -> EngineResult<u64> {
        self.index.count(&QueryFilter::DocType(DocType::Node))
    }

    /// Highest node id in the index, or 0 when empty.
    pub fn max_node_id(&self) -> EngineResult<u64> {
        Ok(self
            .index
            .top_node_id(mirrorsearch_core::SortOrder::Descending)?
            .unwrap_or(0))
    }

    /// Lowest node id in the index, or 0 when empty.
    pub fn min_node_id(&self) -> EngineResult<u64> {
        Ok(self
            .index
            .top_node_id(mirrorsearch_core::SortOrder::Ascending)?
            .unwrap_or(0))
    }

    /// Record the shard's id cap as a state marker.
    ///
    /// The id is stored negated so it can never be confused with a node id.
    pub fn cap_index(&self, node_id: u64) -> EngineResult<()> {
        let mut doc = IndexDocument::new(doc_keys::CAP_STATE, DocType::State);
        doc.set(
            FieldName::DbId,
            -i64::try_from(node_id).unwrap_or(i64::MAX),
        );
        self.index.add(&doc, true)
    }

    /// Read the recorded id cap, or `None` when the shard has never been
    /// capped.
    pub fn index_cap(&self) -> EngineResult<Option<u64>> {
        let Some(doc) = self.index.get(doc_keys::CAP_STATE)? else {
            return Ok(None);
        };
        Ok(doc
            .long(FieldName::DbId)
            .map(|value| value.unsigned_abs()))
    }

    /// Delete every node document above the cap.
    pub fn maintain_cap(&self, node_id: u64) -> EngineResult<()> {
        self.index.delete(&DeleteSelector::NodeIdAbove(node_id))
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Snapshot tracker statistics, optionally resetting the counters.
    #[must_use]
    pub fn summary(&self, reset: bool) -> TrackerSummary {
        self.stats.summary(reset)
    }
}
