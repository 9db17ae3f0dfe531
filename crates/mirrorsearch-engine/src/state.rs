//! Transaction / ACL state tracking.
//!
//! Every indexed transaction and ACL change set refreshes a singleton state
//! marker document recording the maximum `(commit time, id)` pair confirmed
//! indexed. Marker writes are optimistic: stale writers are silently dropped,
//! no locking involved. Tracker state derives hole-retention-adjusted "last
//! good" watermarks from the markers so trackers can resume from a hole-free
//! lower bound.

use tracing::debug;

use mirrorsearch_core::types::doc_keys;
use mirrorsearch_core::{
    AclChangeSet, DocType, EngineResult, FieldName, IndexDocument, TrackerState, Transaction,
};

use crate::engine::{now_millis, IndexEngine};
use crate::gate::WriterToken;

/// Whether a state marker at `stored` may advance to `incoming`.
///
/// Ordered by commit time, tie-broken by id; the write proceeds only when the
/// incoming pair is strictly greater.
#[must_use]
pub(crate) fn marker_advances(stored: (u64, u64), incoming: (u64, u64)) -> bool {
    incoming > stored
}

/// Subtract the hole-retention window from a commit-time watermark.
#[must_use]
pub(crate) fn hole_free_watermark(commit_time_ms: u64, hole_retention_ms: u64) -> u64 {
    commit_time_ms.saturating_sub(hole_retention_ms)
}

impl IndexEngine {
    /// Index an ACL change-set document and refresh the ACL state marker.
    ///
    /// # Errors
    ///
    /// Returns [`mirrorsearch_core::EngineError::RolledBack`] if the writer
    /// was invalidated.
    pub fn index_acl_transaction(
        &self,
        change_set: &AclChangeSet,
        token: &WriterToken,
        overwrite: bool,
    ) -> EngineResult<()> {
        self.gate.check_writable(token)?;
        let mut doc =
            IndexDocument::new(doc_keys::acl_change_set(change_set.id), DocType::AclTx);
        doc.set(FieldName::AclTxId, change_set.id);
        doc.set(FieldName::InAclTxId, change_set.id);
        doc.set(FieldName::AclTxCommitTime, change_set.commit_time_ms);
        self.index.add(&doc, overwrite)?;
        self.put_acl_transaction_state(change_set)
    }

    /// Refresh the transaction state marker if this transaction advances it.
    pub(crate) fn put_transaction_state(&self, txn: &Transaction) -> EngineResult<()> {
        let stored = self.index.get(doc_keys::TX_STATE)?;
        let stored_pair = stored.as_ref().map_or((0, 0), |doc| {
            (
                doc.unsigned(FieldName::StateTxCommitTime).unwrap_or(0),
                doc.unsigned(FieldName::StateTxId).unwrap_or(0),
            )
        });
        if !marker_advances(stored_pair, (txn.commit_time_ms, txn.id)) {
            debug!(txn_id = txn.id, "transaction state marker not advanced");
            return Ok(());
        }

        let version = stored
            .as_ref()
            .and_then(|doc| doc.long(FieldName::Version))
            .unwrap_or(0);
        let mut doc = IndexDocument::new(doc_keys::TX_STATE, DocType::State);
        doc.set(FieldName::Version, version);
        doc.set(FieldName::StateTxId, txn.id);
        doc.set(FieldName::StateTxCommitTime, txn.commit_time_ms);
        self.index.add(&doc, true)
    }

    /// Refresh the ACL state marker if this change set advances it.
    pub(crate) fn put_acl_transaction_state(
        &self,
        change_set: &AclChangeSet,
    ) -> EngineResult<()> {
        let stored = self.index.get(doc_keys::ACL_TX_STATE)?;
        let stored_pair = stored.as_ref().map_or((0, 0), |doc| {
            (
                doc.unsigned(FieldName::StateAclTxCommitTime).unwrap_or(0),
                doc.unsigned(FieldName::StateAclTxId).unwrap_or(0),
            )
        });
        if !marker_advances(stored_pair, (change_set.commit_time_ms, change_set.id)) {
            debug!(
                change_set_id = change_set.id,
                "ACL state marker not advanced"
            );
            return Ok(());
        }

        let version = stored
            .as_ref()
            .and_then(|doc| doc.long(FieldName::Version))
            .unwrap_or(0);
        let mut doc = IndexDocument::new(doc_keys::ACL_TX_STATE, DocType::State);
        doc.set(FieldName::Version, version);
        doc.set(FieldName::StateAclTxId, change_set.id);
        doc.set(FieldName::StateAclTxCommitTime, change_set.commit_time_ms);
        self.index.add(&doc, true)
    }

    /// Read the newest transaction recorded by the state marker.
    pub fn max_transaction_in_index(&self) -> EngineResult<Transaction> {
        let Some(doc) = self.index.get(doc_keys::TX_STATE)? else {
            return Ok(Transaction::new(0, 0));
        };
        Ok(Transaction::new(
            doc.unsigned(FieldName::StateTxId).unwrap_or(0),
            doc.unsigned(FieldName::StateTxCommitTime).unwrap_or(0),
        ))
    }

    /// Read the newest ACL change set recorded by the state marker.
    pub fn max_acl_change_set_in_index(&self) -> EngineResult<AclChangeSet> {
        let Some(doc) = self.index.get(doc_keys::ACL_TX_STATE)? else {
            return Ok(AclChangeSet::new(0, 0));
        };
        Ok(AclChangeSet::new(
            doc.unsigned(FieldName::StateAclTxId).unwrap_or(0),
            doc.unsigned(FieldName::StateAclTxCommitTime).unwrap_or(0),
        ))
    }

    /// Compute the tracker's initial state from the persisted markers.
    ///
    /// Called once on startup; subsequent cycles advance the state with
    /// [`IndexEngine::continue_state`].
    pub fn tracker_initial_state(&self) -> EngineResult<TrackerState> {
        let mut state = TrackerState::default();

        let txn = self.max_transaction_in_index()?;
        state.last_indexed_tx_id = txn.id;
        state.last_indexed_tx_commit_time = txn.commit_time_ms;

        let change_set = self.max_acl_change_set_in_index()?;
        state.last_indexed_change_set_id = change_set.id;
        state.last_indexed_change_set_commit_time = change_set.commit_time_ms;

        let now = now_millis();
        state.last_start_time = now;
        state.time_to_stop_indexing = now.saturating_sub(self.config.lag_ms);
        state.last_good_tx_commit_time = hole_free_watermark(
            state.last_indexed_tx_commit_time,
            self.config.hole_retention_ms,
        );
        state.last_good_change_set_commit_time = hole_free_watermark(
            state.last_indexed_change_set_commit_time,
            self.config.hole_retention_ms,
        );

        debug!(?state, "tracker initial state created");
        Ok(state)
    }

    /// Advance tracker state at the start of a new cycle.
    ///
    /// The resume watermark takes the larger of the newest indexed commit
    /// time and the previous cycle start time, hole retention applied to
    /// both. With an idle repository the indexed commit time never moves, so
    /// anchoring to the last start time keeps the resume window from growing
    /// without bound while still respecting hole retention.
    pub fn continue_state(&self, state: &mut TrackerState) {
        let now = now_millis();
        let last_start = state.last_start_time;

        state.time_to_stop_indexing = now.saturating_sub(self.config.lag_ms);
        state.last_good_tx_commit_time = hole_free_watermark(
            state.last_indexed_tx_commit_time.max(last_start),
            self.config.hole_retention_ms,
        );
        state.last_good_change_set_commit_time = hole_free_watermark(
            state.last_indexed_change_set_commit_time.max(last_start),
            self.config.hole_retention_ms,
        );
        state.last_start_time = now;
    }
}
