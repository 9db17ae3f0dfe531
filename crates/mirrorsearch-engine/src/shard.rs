//! Shard capacity (id-range) management.
//!
//! A shard partitioned by id range owns a contiguous `[start, end)` window of
//! node ids. [`IndexEngine::range_check`] estimates whether and by how much
//! the range should grow by extrapolating fill density;
//! [`IndexEngine::expand_range`] performs the actual mutation: cap the index,
//! force a hard commit, then atomically update the router's end range and
//! expanded flag. A shard can be expanded once.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use mirrorsearch_core::{EngineError, EngineResult};

use crate::engine::IndexEngine;

#[derive(Debug)]
struct RouterState {
    start: u64,
    end: u64,
    expanded: bool,
    initialized: bool,
}

/// Id-range partitioning policy for one shard.
///
/// The router holds the range; the engine enforces and expands it.
#[derive(Debug)]
pub struct DbIdRangeRouter {
    state: RwLock<RouterState>,
}

impl DbIdRangeRouter {
    /// A router for the `[start, end)` id range.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            state: RwLock::new(RouterState {
                start,
                end,
                expanded: false,
                initialized: true,
            }),
        }
    }

    /// A router whose range has not been loaded yet; every range operation
    /// is refused until [`DbIdRangeRouter::initialize`] runs.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            state: RwLock::new(RouterState {
                start: 0,
                end: 0,
                expanded: false,
                initialized: false,
            }),
        }
    }

    /// Load the range and mark the router ready.
    pub fn initialize(&self, start: u64, end: u64, expanded: bool) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.start = start;
        state.end = end;
        state.expanded = expanded;
        state.initialized = true;
    }

    /// Inclusive start of the shard's id range.
    #[must_use]
    pub fn start_range(&self) -> u64 {
        self.read().0
    }

    /// Exclusive end of the shard's id range.
    #[must_use]
    pub fn end_range(&self) -> u64 {
        self.read().1
    }

    /// Whether the range has already been expanded.
    #[must_use]
    pub fn expanded(&self) -> bool {
        self.read().2
    }

    /// Whether the router has been initialized.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.read().3
    }

    fn read(&self) -> (u64, u64, bool, bool) {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (state.start, state.end, state.expanded, state.initialized)
    }

    fn apply_expansion(&self, new_end: u64) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.end = new_end;
        state.expanded = true;
    }
}

/// Structured result of a range check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeCheckReport {
    /// Inclusive start of the shard's range.
    pub start: u64,
    /// Exclusive end of the shard's range.
    pub end: u64,
    /// Number of node documents in the shard.
    pub node_count: u64,
    /// Lowest indexed node id.
    pub min_node_id: u64,
    /// Highest indexed node id.
    pub max_node_id: u64,
    /// Fill density over the used part of the range.
    pub density: f64,
    /// Recommended expansion: a positive amount of ids to add, `0` when
    /// expansion is premature, `-1` when it cannot be done (already expanded
    /// or beyond the safety threshold).
    pub recommended_expansion: i64,
    /// Whether the range has already been expanded.
    pub expanded: bool,
}

/// 75%-of-range safety threshold: beyond it, expansion is refused.
fn safety_threshold(start: u64, range: u64) -> u64 {
    start + range / 4 * 3 + (range % 4) * 3 / 4
}

impl IndexEngine {
    /// Estimate whether and by how much a shard's id range should grow.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RangeRouter`] if the router is not initialized.
    pub fn range_check(&self, router: &DbIdRangeRouter) -> EngineResult<RangeCheckReport> {
        if !router.initialized() {
            return Err(EngineError::RangeRouter {
                reason: "id-range router not initialized yet".into(),
            });
        }

        let start = router.start_range();
        let end = router.end_range();
        let range = end.saturating_sub(start);
        let midpoint = start + range / 2;
        let safe = safety_threshold(start, range);

        let max_node_id = self.max_node_id()?;
        let min_node_id = self.min_node_id()?;
        let node_count = self.node_count()?;

        let offset = max_node_id.saturating_sub(start);
        #[allow(clippy::cast_precision_loss)]
        let density = if offset > 0 {
            node_count as f64 / offset as f64
        } else {
            0.0
        };

        // -1 means expansion cannot be done: already expanded, or the index
        // has grown past the safety threshold.
        let mut recommended: i64 = -1;
        if !router.expanded() && max_node_id <= safe {
            if max_node_id >= midpoint {
                if density >= 1.0 || density == 0.0 {
                    // Fully dense or empty shard; nothing to extrapolate.
                    recommended = 0;
                } else {
                    #[allow(
                        clippy::cast_precision_loss,
                        clippy::cast_possible_truncation
                    )]
                    {
                        recommended = ((range as f64 / density) - range as f64) as i64;
                    }
                }
            } else {
                // Below the midpoint it is too early to guess.
                recommended = 0;
            }
        }

        Ok(RangeCheckReport {
            start,
            end,
            node_count,
            min_node_id,
            max_node_id,
            density: density.abs(),
            recommended_expansion: recommended,
            expanded: router.expanded(),
        })
    }

    /// Grow the shard's id range by `amount` ids.
    ///
    /// Caps the index at the new end, forces a hard commit, then atomically
    /// updates the router. Serialized against itself; a shard can only be
    /// expanded once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RangeRouter`] if the router is uninitialized,
    /// already expanded, or the highest indexed id is beyond the 75% safety
    /// threshold.
    pub fn expand_range(&self, router: &DbIdRangeRouter, amount: u64) -> EngineResult<u64> {
        let _serialize = self
            .expand_guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !router.initialized() {
            return Err(EngineError::RangeRouter {
                reason: "id-range router not initialized yet".into(),
            });
        }
        if router.expanded() {
            return Err(EngineError::RangeRouter {
                reason: "id range has already been expanded".into(),
            });
        }

        let start = router.start_range();
        let end = router.end_range();
        let range = end.saturating_sub(start);
        let safe = safety_threshold(start, range);
        let max_node_id = self.max_node_id()?;
        if max_node_id > safe {
            return Err(EngineError::RangeRouter {
                reason: format!(
                    "expansion refused: max indexed id {max_node_id} is more than 75% of range [{start}, {end})"
                ),
            });
        }

        let new_end = end.saturating_add(amount);
        self.cap_index(new_end)?;
        self.hard_commit()?;
        router.apply_expansion(new_end);
        info!(start, old_end = end, new_end, "shard id range expanded");
        Ok(new_end)
    }
}
