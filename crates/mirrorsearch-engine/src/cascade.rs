//! Cascading update propagation.
//!
//! When a node's path, name, or ancestor set changes, every indexed
//! descendant document must be updated to reflect the new path fields without
//! re-running full metadata extraction over the whole subtree. Two strategies
//! are supported:
//!
//! - *Path-comparison cascade*: a change is detected by comparing the stored
//!   parent-association checksum against the node's current one; descendants
//!   are then walked through the repository's child ids with an explicit
//!   visited set guarding against cycles.
//! - *Flag-driven cascade*: transactions carry a cascade-pending flag; an
//!   ancestor-field scan over the index finds candidate descendants directly.
//!
//! Cascades are not nested arbitrarily: the engine relies on the scheduled
//! cascade-pending scans ([`IndexEngine::get_cascades`]) rather than
//! synchronous recursive cascades.

use tracing::{debug, warn};

use mirrorsearch_core::types::doc_keys;
use mirrorsearch_core::{
    DeleteSelector, EngineResult, FieldName, IndexQuery, MetadataRequest, NodeMetaData,
    QueryFilter, SortOrder, Transaction,
};

use crate::document;
use crate::engine::IndexEngine;
use crate::gate::WriterToken;

impl IndexEngine {
    /// Find up to `limit` transactions whose cascades are still pending.
    ///
    /// Transactions already surfaced by a previous call are filtered through
    /// the cascade-processed cache and recorded again on return, so repeated
    /// scans do not re-surface them.
    pub fn get_cascades(&self, limit: usize) -> EngineResult<Vec<Transaction>> {
        let docs = self.index.search(
            &IndexQuery::filtered(QueryFilter::PendingCascades)
                .sorted_by(FieldName::TxId, SortOrder::Ascending),
        )?;

        let mut cascades = Vec::with_capacity(limit);
        for doc in docs {
            if cascades.len() >= limit {
                break;
            }
            let Some(txn_id) = doc.unsigned(FieldName::StateTxId) else {
                continue;
            };
            if self.cascade_processed.contains(txn_id) {
                continue;
            }
            self.cascade_processed.insert(txn_id);
            cascades.push(Transaction::new(
                txn_id,
                doc.unsigned(FieldName::StateTxCommitTime).unwrap_or(0),
            ));
        }
        Ok(cascades)
    }

    /// Resolve the parent nodes whose cascade tokens match the given
    /// transactions, with the path payload cascading needs.
    pub fn get_cascade_nodes(&self, txn_ids: &[u64]) -> EngineResult<Vec<NodeMetaData>> {
        let mut parent_ids = std::collections::BTreeSet::new();
        for &txn_id in txn_ids {
            let id = i64::try_from(txn_id).unwrap_or(i64::MAX);
            let docs = self.index.search(&IndexQuery::filtered(QueryFilter::FieldLong(
                FieldName::CascadeTx,
                id,
            )))?;
            parent_ids.extend(docs.iter().filter_map(|doc| doc.unsigned(FieldName::DbId)));
        }

        let mut metas = Vec::new();
        for parent_id in parent_ids {
            metas.extend(
                self.repository
                    .node_metadata(&MetadataRequest::paths_only(parent_id))?,
            );
        }
        Ok(metas)
    }

    /// Flag-driven cascade over a batch of parent nodes.
    ///
    /// A failed parent cascade is logged and does not fail the batch; the
    /// transaction stays pending and is retried on a later scan.
    ///
    /// # Errors
    ///
    /// Returns [`mirrorsearch_core::EngineError::RolledBack`] if the writer
    /// was invalidated.
    pub fn cascade_nodes(
        &self,
        metas: &[NodeMetaData],
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        for meta in metas {
            if let Err(error) = self.cascade_by_ancestor_scan(meta, overwrite) {
                if error.invalidates_cycle() {
                    return Err(error);
                }
                warn!(node_id = meta.id, %error, "cascade from parent node failed");
            }
        }
        Ok(())
    }

    /// Find descendants of `parent` through the index's ancestor field and
    /// patch each one that is strictly older than the triggering transaction.
    ///
    /// Descendants in the parent's own transaction or a newer one are left
    /// for their own explicit update.
    fn cascade_by_ancestor_scan(
        &self,
        parent: &NodeMetaData,
        overwrite: bool,
    ) -> EngineResult<()> {
        let docs = self.index.search(&IndexQuery::filtered(QueryFilter::Ancestor(
            parent.node_ref.clone(),
        )))?;
        let mut children: std::collections::BTreeMap<u64, String> =
            std::collections::BTreeMap::new();
        for doc in &docs {
            if let Some(node_id) = doc.unsigned(FieldName::DbId) {
                children.insert(
                    node_id,
                    doc.text(FieldName::Tenant).unwrap_or_default().to_owned(),
                );
            }
        }

        debug!(
            node_id = parent.id,
            cascade_count = children.len(),
            "cascading descendant updates"
        );

        for (child_id, tenant) in children {
            let Some(child) = self
                .repository
                .node_metadata(&MetadataRequest::paths_only(child_id))?
                .into_iter()
                .next()
            else {
                // The descendant no longer exists repository-side; its index
                // entry is stale.
                debug!(node_id = child_id, "descendant gone, deleting stale entry");
                let _guard = self.locks.acquire(child_id)?;
                self.document_cache.remove(&tenant, child_id)?;
                self.index.delete(&DeleteSelector::NodeId(child_id))?;
                continue;
            };
            if child.txn_id >= parent.txn_id {
                continue;
            }
            self.patch_descendant(&child, overwrite)?;
        }
        Ok(())
    }

    /// Patch one descendant's path fields under its node lock.
    ///
    /// Without a cached document the descendant is rebuilt from a full
    /// metadata refetch; a rebuild that yields nothing deletes the stale
    /// index entry (the node no longer exists).
    fn patch_descendant(&self, child: &NodeMetaData, overwrite: bool) -> EngineResult<()> {
        let _guard = self.locks.acquire(child.id)?;

        match self.document_cache.retrieve(&child.tenant, child.id)? {
            Some(mut doc) => {
                debug!(node_id = child.id, "cascade patching cached descendant");
                document::update_path_fields(&mut doc, child);
                self.document_cache.store(&child.tenant, child.id, &doc)?;
                self.index.add(&doc, overwrite)
            }
            None => {
                let rebuilt = self
                    .repository
                    .node_metadata(&MetadataRequest::full(child.id))?
                    .into_iter()
                    .next();
                match rebuilt {
                    Some(full) => {
                        debug!(node_id = child.id, "cascade rebuilding descendant");
                        let doc = document::build_node_document(&full, None, &self.config);
                        self.index.delete(&DeleteSelector::NodeId(child.id))?;
                        self.document_cache.store(&full.tenant, full.id, &doc)?;
                        self.index.add(&doc, overwrite)
                    }
                    None => {
                        debug!(node_id = child.id, "descendant gone, deleting stale entry");
                        self.index.delete(&DeleteSelector::NodeId(child.id))
                    }
                }
            }
        }
    }

    /// Path-comparison cascade: patch descendants only when the stored
    /// parent-association checksum no longer matches the node's current one.
    ///
    /// Returns whether a cascade ran. A node that was never indexed, or whose
    /// checksum is unchanged, cascades nothing.
    ///
    /// # Errors
    ///
    /// Returns [`mirrorsearch_core::EngineError::RolledBack`] if the writer
    /// was invalidated.
    pub fn cascade_by_path_comparison(
        &self,
        meta: &NodeMetaData,
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<bool> {
        self.gate.check_writable(token)?;

        let Some(indexed) = self.index.get(&doc_keys::node(&meta.tenant, meta.id))? else {
            return Ok(false);
        };
        if indexed.unsigned(FieldName::ParentAssocCrc) == Some(meta.parent_assoc_crc) {
            debug!(node_id = meta.id, "path unchanged, no cascade");
            return Ok(false);
        }

        let mut visited = Vec::new();
        self.update_descendants(meta, overwrite, &mut visited)?;
        Ok(true)
    }

    /// Walk descendants through repository child ids, patching each one.
    ///
    /// `visited` is the explicit traversal stack used for cycle detection: a
    /// node id already on the stack is logged and skipped, never fatal.
    fn update_descendants(
        &self,
        parent: &NodeMetaData,
        overwrite: bool,
        visited: &mut Vec<u64>,
    ) -> EngineResult<()> {
        if visited.contains(&parent.id) {
            warn!(
                node_id = parent.id,
                stack = ?visited,
                "descendant cycle detected, traversal stops here"
            );
            return Ok(());
        }
        visited.push(parent.id);
        let result = self.update_descendants_inner(parent, overwrite, visited);
        visited.pop();
        result
    }

    fn update_descendants_inner(
        &self,
        parent: &NodeMetaData,
        overwrite: bool,
        visited: &mut Vec<u64>,
    ) -> EngineResult<()> {
        for &child_id in &parent.child_ids {
            let Some(child) = self
                .repository
                .node_metadata(&MetadataRequest::paths_only(child_id))?
                .into_iter()
                .next()
            else {
                continue;
            };

            if !child.child_ids.is_empty() {
                self.update_descendants(&child, overwrite, visited)?;
            }

            // A child already on the stack is part of the detected cycle;
            // patching it again would loop forever through the cache.
            if visited.contains(&child.id) {
                continue;
            }

            let _guard = self.locks.acquire(child.id)?;
            if let Some(mut doc) = self.document_cache.retrieve(&child.tenant, child.id)? {
                document::update_path_fields(&mut doc, &child);
                self.document_cache.store(&child.tenant, child.id, &doc)?;
                self.index.add(&doc, overwrite)?;
            } else {
                debug!(node_id = child.id, "no cached descendant document to patch");
            }
        }
        Ok(())
    }
}
