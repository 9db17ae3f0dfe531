//! Index-health reconciliation.
//!
//! Compares a repository-supplied bitset of known ids against the index's
//! faceted id counts over batched id ranges: ids present in the index but not
//! the repository, ids the repository knows but the index is missing, and ids
//! duplicated in the index. Separately, facet counts with a minimum of two
//! over each node-rooted document kind surface duplicate leaf/error/unindexed
//! documents.
//!
//! Reports are read-only and side-effect-free against the index; drift is
//! data for operator-driven or FIX-triggered remediation, never an error.

use std::collections::BTreeMap;

use tracing::debug;

use mirrorsearch_core::{
    DocType, EngineResult, FieldName, FtsStatus, FtsStatusCounts, IdBitSet, IdReconciliation,
    IndexHealthReport, IndexQuery, QueryFilter, SearchIndex,
};

use crate::engine::IndexEngine;

/// Callback seam for one batched id-range reconciliation walk.
///
/// One implementation exists per report kind (transactions, ACL change
/// sets); the walk itself is shared.
pub trait IdRangeReporter {
    /// An id the index has but the repository does not.
    fn id_in_index_not_db(&mut self, id: u64);
    /// An id the repository has but the index is missing.
    fn id_in_db_not_index(&mut self, id: u64);
    /// An id present more than once in the index.
    fn duplicate_id(&mut self, id: u64);
    /// Total distinct ids found in the index.
    fn unique_count(&mut self, count: u64);
}

/// Walk `[min_id, max_id]` in facet batches, reconciling index ids against
/// the repository bitset.
///
/// `min_id` of `None` means the repository reported no ids at all; nothing is
/// walked and nothing is reported.
pub fn reconcile_id_range(
    index: &dyn SearchIndex,
    field: FieldName,
    min_id: Option<u64>,
    max_id: u64,
    ids_in_db: &IdBitSet,
    batch: u64,
    reporter: &mut dyn IdRangeReporter,
) -> EngineResult<()> {
    let Some(min_id) = min_id else {
        return Ok(());
    };

    let mut ids_in_index = IdBitSet::new();
    let mut batch_start = min_id;
    let mut batch_end = (batch_start.saturating_add(batch)).min(max_id);

    while batch_start <= max_id {
        let mut iteration_start = batch_start;
        // Min count of 1 ensures every id returned is actually in the index.
        for (id_in_index, count) in index.facet_ids(field, batch_start, batch_end, 1)? {
            if id_in_index < batch_start || id_in_index > batch_end {
                break;
            }
            ids_in_index.set(id_in_index);

            // The id sequence in the index can look like 1, 2, 5, 7...; walk
            // the implied gap to find ids the index is missing.
            for id in iteration_start..=id_in_index {
                if id == id_in_index {
                    iteration_start = id_in_index + 1;
                    if !ids_in_db.get(id) {
                        reporter.id_in_index_not_db(id);
                    }
                } else if ids_in_db.get(id) {
                    reporter.id_in_db_not_index(id);
                }
            }

            if count > 1 {
                reporter.duplicate_id(id_in_index);
            }
        }

        batch_start = batch_end + 1;
        batch_end = (batch_start.saturating_add(batch)).min(max_id);
    }

    reporter.unique_count(ids_in_index.cardinality());
    Ok(())
}

/// Reporter writing into an [`IdReconciliation`].
struct ReconciliationSink<'a> {
    target: &'a mut IdReconciliation,
}

impl IdRangeReporter for ReconciliationSink<'_> {
    fn id_in_index_not_db(&mut self, id: u64) {
        self.target.in_index_not_db.insert(id);
    }

    fn id_in_db_not_index(&mut self, id: u64) {
        self.target.missing_from_index.insert(id);
    }

    fn duplicate_id(&mut self, id: u64) {
        self.target.duplicated_in_index.insert(id);
    }

    fn unique_count(&mut self, count: u64) {
        self.target.unique_ids_in_index = count;
    }
}

impl IndexEngine {
    /// Reconcile the index's transaction documents against the repository's
    /// known transaction ids.
    pub fn report_transactions_in_index(
        &self,
        min_txn_id: Option<u64>,
        txn_ids_in_db: &IdBitSet,
        max_txn_id: u64,
    ) -> EngineResult<IndexHealthReport> {
        self.build_health_report(FieldName::TxId, DocType::Tx, min_txn_id, txn_ids_in_db, max_txn_id)
    }

    /// Reconcile the index's ACL change-set documents against the
    /// repository's known change-set ids.
    pub fn report_acl_change_sets_in_index(
        &self,
        min_change_set_id: Option<u64>,
        change_set_ids_in_db: &IdBitSet,
        max_change_set_id: u64,
    ) -> EngineResult<IndexHealthReport> {
        self.build_health_report(
            FieldName::AclTxId,
            DocType::AclTx,
            min_change_set_id,
            change_set_ids_in_db,
            max_change_set_id,
        )
    }

    fn build_health_report(
        &self,
        id_field: FieldName,
        doc_type: DocType,
        min_id: Option<u64>,
        ids_in_db: &IdBitSet,
        max_id: u64,
    ) -> EngineResult<IndexHealthReport> {
        let mut report = IndexHealthReport {
            doc_type_counts: self.index.doc_type_counts()?,
            ..Default::default()
        };

        {
            let mut sink = ReconciliationSink {
                target: &mut report.reconciliation,
            };
            reconcile_id_range(
                self.index.as_ref(),
                id_field,
                min_id,
                max_id,
                ids_in_db,
                self.config.health_facet_batch,
                &mut sink,
            )?;
        }
        report.reconciliation.docs_in_index = report
            .doc_type_counts
            .get(&doc_type)
            .copied()
            .unwrap_or(0);
        report.reconciliation.ids_in_db = ids_in_db.cardinality();

        report.duplicated_nodes = self.duplicated_node_ids(DocType::Node)?;
        report.duplicated_error_nodes = self.duplicated_node_ids(DocType::ErrorNode)?;
        report.duplicated_unindexed_nodes = self.duplicated_node_ids(DocType::UnindexedNode)?;
        report.fts_status_counts = self.fts_status_counts()?;

        debug!(
            missing = report.reconciliation.missing_from_index.len(),
            orphaned = report.reconciliation.in_index_not_db.len(),
            duplicated = report.reconciliation.duplicated_in_index.len(),
            "health reconciliation complete"
        );
        Ok(report)
    }

    /// Node ids carried by more than one document of the given kind.
    fn duplicated_node_ids(
        &self,
        doc_type: DocType,
    ) -> EngineResult<std::collections::BTreeSet<u64>> {
        let docs = self
            .index
            .search(&IndexQuery::filtered(QueryFilter::DocType(doc_type)))?;
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for doc in &docs {
            if let Some(node_id) = doc.unsigned(FieldName::DbId) {
                *counts.entry(node_id).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(node_id, _)| node_id)
            .collect())
    }

    /// Content-freshness totals across node documents.
    pub fn fts_status_counts(&self) -> EngineResult<FtsStatusCounts> {
        let count = |status: FtsStatus| {
            self.index.count(&QueryFilter::FieldText(
                FieldName::FtsStatus,
                status.to_string(),
            ))
        };
        Ok(FtsStatusCounts {
            clean: count(FtsStatus::Clean)?,
            dirty: count(FtsStatus::Dirty)?,
            new: count(FtsStatus::New)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reporter capturing callbacks for assertion.
    #[derive(Default)]
    struct RecordingReporter {
        orphaned: Vec<u64>,
        missing: Vec<u64>,
        duplicated: Vec<u64>,
        unique: u64,
    }

    impl IdRangeReporter for RecordingReporter {
        fn id_in_index_not_db(&mut self, id: u64) {
            self.orphaned.push(id);
        }

        fn id_in_db_not_index(&mut self, id: u64) {
            self.missing.push(id);
        }

        fn duplicate_id(&mut self, id: u64) {
            self.duplicated.push(id);
        }

        fn unique_count(&mut self, count: u64) {
            self.unique = count;
        }
    }

    /// Minimal facet-only index for exercising the walk in isolation.
    struct FacetIndex {
        // (id, count) pairs, ascending.
        facets: Vec<(u64, u64)>,
    }

    impl SearchIndex for FacetIndex {
        fn add(
            &self,
            _doc: &mirrorsearch_core::IndexDocument,
            _overwrite: bool,
        ) -> EngineResult<()> {
            unimplemented!("facet-only test index")
        }

        fn delete(&self, _selector: &mirrorsearch_core::DeleteSelector) -> EngineResult<()> {
            unimplemented!("facet-only test index")
        }

        fn get(&self, _id: &str) -> EngineResult<Option<mirrorsearch_core::IndexDocument>> {
            unimplemented!("facet-only test index")
        }

        fn search(
            &self,
            _query: &IndexQuery,
        ) -> EngineResult<Vec<mirrorsearch_core::IndexDocument>> {
            unimplemented!("facet-only test index")
        }

        fn count(&self, _filter: &QueryFilter) -> EngineResult<u64> {
            unimplemented!("facet-only test index")
        }

        fn facet_ids(
            &self,
            _field: FieldName,
            start: u64,
            end: u64,
            min_count: u64,
        ) -> EngineResult<Vec<(u64, u64)>> {
            Ok(self
                .facets
                .iter()
                .filter(|(id, count)| *id >= start && *id <= end && *count >= min_count)
                .copied()
                .collect())
        }

        fn doc_type_counts(&self) -> EngineResult<BTreeMap<DocType, u64>> {
            unimplemented!("facet-only test index")
        }

        fn top_node_id(
            &self,
            _order: mirrorsearch_core::SortOrder,
        ) -> EngineResult<Option<u64>> {
            unimplemented!("facet-only test index")
        }

        fn commit(&self, _mode: mirrorsearch_core::CommitMode) -> EngineResult<()> {
            unimplemented!("facet-only test index")
        }

        fn rollback(&self) -> EngineResult<()> {
            unimplemented!("facet-only test index")
        }
    }

    #[test]
    fn reconciliation_flags_orphans_missing_and_duplicates() {
        // Repository knows {1, 2, 4}; index holds {1, 1, 2, 5}.
        let db: IdBitSet = [1, 2, 4].into_iter().collect();
        let index = FacetIndex {
            facets: vec![(1, 2), (2, 1), (5, 1)],
        };
        let mut reporter = RecordingReporter::default();

        reconcile_id_range(&index, FieldName::TxId, Some(1), 5, &db, 4096, &mut reporter)
            .unwrap();

        assert_eq!(reporter.orphaned, vec![5]);
        assert_eq!(reporter.missing, vec![4]);
        assert_eq!(reporter.duplicated, vec![1]);
        assert_eq!(reporter.unique, 3);
    }

    #[test]
    fn reconciliation_spans_batch_boundaries() {
        let db: IdBitSet = [1, 5000].into_iter().collect();
        let index = FacetIndex {
            facets: vec![(1, 1), (5000, 1)],
        };
        let mut reporter = RecordingReporter::default();

        // Batch of 10 forces many windows between the two ids.
        reconcile_id_range(&index, FieldName::TxId, Some(1), 5000, &db, 10, &mut reporter)
            .unwrap();

        assert!(reporter.orphaned.is_empty());
        assert!(reporter.missing.is_empty());
        assert_eq!(reporter.unique, 2);
    }

    #[test]
    fn no_minimum_id_reports_nothing() {
        let db = IdBitSet::new();
        let index = FacetIndex { facets: vec![] };
        let mut reporter = RecordingReporter::default();

        reconcile_id_range(&index, FieldName::TxId, None, 100, &db, 4096, &mut reporter)
            .unwrap();
        assert_eq!(reporter.unique, 0);
        assert!(reporter.missing.is_empty());
    }
}
