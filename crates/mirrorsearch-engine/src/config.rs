//! Engine configuration.
//!
//! Defaults mirror production tracker deployments: two-minute lock timeout
//! with one-second polling, one-hour hole retention, 250k-entry freshness
//! caches, and a twenty-minute harvest retention window purged at most every
//! two minutes.

use serde::{Deserialize, Serialize};

use mirrorsearch_core::{EngineError, EngineResult};

/// Tunables of the indexing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window subtracted from the newest indexed commit time to compute the
    /// hole-free resume watermark.
    pub hole_retention_ms: u64,
    /// How far behind "now" a tracking cycle stops indexing.
    pub lag_ms: u64,
    /// Hard timeout for per-node lock acquisition.
    pub lock_timeout_ms: u64,
    /// Poll interval while spin-waiting on a node lock.
    pub lock_poll_ms: u64,
    /// Whether text content is fetched and indexed at all. When disabled,
    /// node documents are marked content-clean at build time.
    pub content_indexing_enabled: bool,
    /// Whether nodes opting out via the index-control property leave a
    /// minimal placeholder document behind.
    pub record_unindexed_nodes: bool,
    /// Whether cascade tracking (descendant path propagation) is enabled.
    pub cascade_tracking_enabled: bool,
    /// Whether bulk metadata fetches include path information. When false,
    /// path data is only fetched for single nodes.
    pub paths_in_node_batches: bool,
    /// Capacity of the transaction / change-set / cascade membership caches.
    pub membership_cache_capacity: usize,
    /// Capacity of the harvested-content cache.
    pub harvest_cache_capacity: usize,
    /// Minimum interval between harvest-cache purge passes.
    pub harvest_purge_interval_ms: u64,
    /// Age past which a harvested transaction is purged and retried.
    pub harvest_retention_ms: u64,
    /// How many distinct transactions one unclean-content scan surfaces.
    pub harvest_txn_batch: usize,
    /// Facet batch width for health reconciliation, tuned to the numeric
    /// field precision step (2^(6*2)).
    pub health_facet_batch: u64,
    /// Byte cap applied to failure traces on error placeholder documents.
    pub error_trace_cap_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hole_retention_ms: 3_600_000,
            lag_ms: 1_000,
            lock_timeout_ms: 120_000,
            lock_poll_ms: 1_000,
            content_indexing_enabled: true,
            record_unindexed_nodes: true,
            cascade_tracking_enabled: true,
            paths_in_node_batches: true,
            membership_cache_capacity: 250_000,
            harvest_cache_capacity: 250_000,
            harvest_purge_interval_ms: 120_000,
            harvest_retention_ms: 1_200_000,
            harvest_txn_batch: 500,
            health_facet_batch: 4096,
            error_trace_cap_bytes: 32_765,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for values the engine cannot
    /// run with (zero capacities, zero batch sizes, zero lock poll).
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |field: &str, value: String, reason: &str| {
            Err(EngineError::InvalidConfig {
                field: field.into(),
                value,
                reason: reason.into(),
            })
        };
        if self.membership_cache_capacity == 0 {
            return invalid(
                "membership_cache_capacity",
                "0".into(),
                "must be greater than zero",
            );
        }
        if self.harvest_cache_capacity == 0 {
            return invalid(
                "harvest_cache_capacity",
                "0".into(),
                "must be greater than zero",
            );
        }
        if self.harvest_txn_batch == 0 {
            return invalid("harvest_txn_batch", "0".into(), "must be greater than zero");
        }
        if self.health_facet_batch == 0 {
            return invalid("health_facet_batch", "0".into(), "must be greater than zero");
        }
        if self.lock_poll_ms == 0 {
            return invalid("lock_poll_ms", "0".into(), "must be greater than zero");
        }
        if self.lock_timeout_ms < self.lock_poll_ms {
            return invalid(
                "lock_timeout_ms",
                self.lock_timeout_ms.to_string(),
                "must be at least the lock poll interval",
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EngineConfig {
            membership_cache_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("membership_cache_capacity"));
    }

    #[test]
    fn timeout_below_poll_is_rejected() {
        let config = EngineConfig {
            lock_timeout_ms: 1,
            lock_poll_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serde_round_trip_with_partial_input() {
        // Unknown-field-free partial config falls back to defaults.
        let config: EngineConfig =
            serde_json::from_str(r#"{"hole_retention_ms": 60000}"#).expect("deserialize");
        assert_eq!(config.hole_retention_ms, 60_000);
        assert_eq!(config.lock_timeout_ms, 120_000);
    }
}
