//! Content fetch & caching pipeline.
//!
//! Node documents carry a content-freshness marker (`FtsStatus`): `New` and
//! `Dirty` mean the harvested text is missing or stale, `Clean` means it is
//! up to date. Discovery ([`IndexEngine::get_docs_with_unclean_content`])
//! surfaces the next bounded batch of transactions with unclean documents;
//! the explicit harvest ([`IndexEngine::update_content_to_index_and_cache`])
//! fetches text for a single node under its per-node lock and marks it
//! `Clean`.
//!
//! Harvested transaction ids are remembered in a bounded timestamped cache so
//! repeated scans do not re-surface them; the cache is purged of old entries
//! on a throttled schedule so genuinely-failed harvests are retried.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, warn};

use mirrorsearch_core::{
    DeleteSelector, EngineResult, FieldName, IndexQuery, MetadataRequest, NodeDocRef,
    QueryFilter, SortOrder,
};

use crate::document;
use crate::engine::{now_millis, IndexEngine};
use crate::gate::WriterToken;

impl IndexEngine {
    /// Locate the next batch of documents whose content needs harvesting.
    ///
    /// Finds the lowest transaction id among `Dirty`/`New` documents not
    /// already harvested, collects the bounded set of transaction ids
    /// following it, and returns the matching documents' tenant/node-id
    /// references. The surfaced transaction ids are recorded in the
    /// harvested cache with a timestamp.
    pub fn get_docs_with_unclean_content(&self) -> EngineResult<Vec<NodeDocRef>> {
        let now = now_millis();
        let purged = self.harvested.purge_expired(now);
        if purged > 0 {
            debug!(doc_count = purged, "purged stale harvested-transaction entries");
        }

        let docs = self.index.search(
            &IndexQuery::filtered(QueryFilter::UncleanContent)
                .sorted_by(FieldName::InTxId, SortOrder::Ascending),
        )?;

        // Distinct unharvested transactions, ascending from the floor.
        let mut pending_txns = BTreeSet::new();
        for doc in &docs {
            if let Some(txn_id) = doc.unsigned(FieldName::InTxId) {
                if !self.harvested.contains(txn_id) {
                    pending_txns.insert(txn_id);
                }
            }
        }
        if pending_txns.is_empty() {
            debug!("no documents with outdated text content found");
            return Ok(Vec::new());
        }

        let selected: BTreeSet<u64> = pending_txns
            .into_iter()
            .take(self.config.harvest_txn_batch)
            .collect();

        let mut doc_refs = Vec::new();
        for doc in &docs {
            let Some(txn_id) = doc.unsigned(FieldName::InTxId) else {
                continue;
            };
            if !selected.contains(&txn_id) {
                continue;
            }
            let Some(node_id) = doc.unsigned(FieldName::DbId) else {
                continue;
            };
            doc_refs.push(NodeDocRef {
                tenant: doc.text(FieldName::Tenant).unwrap_or_default().to_owned(),
                node_id,
                content_locale: doc.text(FieldName::ContentLocale).map(str::to_owned),
                applied_content_id: doc.unsigned(FieldName::ContentId),
            });
        }

        for txn_id in selected {
            self.harvested.record(txn_id, now);
        }

        debug!(doc_count = doc_refs.len(), "documents with content to be indexed");
        Ok(doc_refs)
    }

    /// Harvest the text content of one node, mark it `Clean`, update the
    /// document cache, and re-add the document to the index.
    ///
    /// On a cache miss the document is rebuilt from a full metadata refetch;
    /// if the node no longer exists in the repository, its stale index entry
    /// is deleted instead.
    ///
    /// # Errors
    ///
    /// Returns [`mirrorsearch_core::EngineError::RolledBack`] if the writer
    /// was invalidated, or the repository/index error if the harvest failed.
    /// Failed harvests are retried automatically once the harvested-cache
    /// entry for their transaction ages out.
    pub fn update_content_to_index_and_cache(
        &self,
        doc_ref: &NodeDocRef,
        token: &WriterToken,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        let start = Instant::now();
        let _guard = self.locks.acquire(doc_ref.node_id)?;

        let mut doc = match self
            .document_cache
            .retrieve(&doc_ref.tenant, doc_ref.node_id)?
        {
            Some(doc) => doc,
            None => {
                warn!(
                    node_id = doc_ref.node_id,
                    tenant = %doc_ref.tenant,
                    "no cached document for content harvest, rebuilding"
                );
                let rebuilt = self
                    .repository
                    .node_metadata(&MetadataRequest::full(doc_ref.node_id))?
                    .into_iter()
                    .next();
                match rebuilt {
                    Some(meta) => document::build_node_document(&meta, None, &self.config),
                    None => {
                        // Rebuild yielded nothing: the node is gone. Delete
                        // here so the stale entry cannot resurface.
                        self.index
                            .delete(&DeleteSelector::NodeId(doc_ref.node_id))?;
                        return Ok(());
                    }
                }
            }
        };

        if let Some(content_id) = doc.unsigned(FieldName::ContentId) {
            let content = self.repository.text_content(doc_ref.node_id, content_id)?;
            doc.set(FieldName::Content, content.text);
            doc.set(FieldName::TransformStatus, content.transform_status.to_string());
            match content.transform_exception {
                Some(exception) => doc.set(FieldName::TransformException, exception),
                None => doc.clear(FieldName::TransformException),
            }
            doc.set(
                FieldName::TransformDurationMs,
                content.transform_duration_ms,
            );
        }

        doc.mark_fts_status(mirrorsearch_core::FtsStatus::Clean);
        self.document_cache
            .store(&doc_ref.tenant, doc_ref.node_id, &doc)?;
        self.index.add(&doc, true)?;

        self.stats
            .add_content_time(u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX));
        debug!(node_id = doc_ref.node_id, "text content updated and marked clean");
        Ok(())
    }
}
