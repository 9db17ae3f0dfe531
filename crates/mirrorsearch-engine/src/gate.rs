//! Commit/rollback gating for tracker writers.
//!
//! The gate is a generation counter plus an active-writer set. A tracker
//! registers at the start of each cycle and receives a [`WriterToken`]
//! capturing the current generation; every ordinary write checks the token
//! before touching the index. A rollback advances the generation and clears
//! the writer set, so any writer that had not yet completed fails fast with a
//! dedicated rolled-back error on its next write attempt instead of pushing
//! stale mutations into the fresh index state.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use mirrorsearch_core::{EngineError, EngineResult};

/// Proof of registration handed to a tracker for one cycle.
///
/// The token is only valid until the next rollback; it is not `Clone` so a
/// cycle cannot accidentally outlive its registration.
#[derive(Debug, PartialEq, Eq)]
pub struct WriterToken {
    writer_id: u64,
    generation: u64,
}

impl WriterToken {
    /// The generation this token was issued under.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    active: HashSet<u64>,
}

/// Generation counter + active-writer set guarding index writes against
/// concurrent rollback.
#[derive(Debug, Default)]
pub struct WriteGate {
    state: RwLock<GateState>,
    next_writer_id: AtomicU64,
}

impl WriteGate {
    /// Create a gate with no registered writers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling tracker for the current generation.
    pub fn register(&self) -> WriterToken {
        let writer_id = self.next_writer_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.active.insert(writer_id);
        WriterToken {
            writer_id,
            generation: state.generation,
        }
    }

    /// Deregister a tracker at the end of its cycle.
    pub fn deregister(&self, token: &WriterToken) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.active.remove(&token.writer_id);
    }

    /// Check that the holder of `token` may still write.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RolledBack`] if a rollback advanced the
    /// generation since the token was issued, or the writer was deregistered.
    pub fn check_writable(&self, token: &WriterToken) -> EngineResult<()> {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.generation == token.generation && state.active.contains(&token.writer_id) {
            Ok(())
        } else {
            Err(EngineError::RolledBack)
        }
    }

    /// Invalidate every registered writer and advance the generation.
    ///
    /// Called by rollback while it holds the commit/rollback mutex.
    pub fn invalidate_writers(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.generation += 1;
        state.active.clear();
    }

    /// Current generation. Diagnostic only.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .generation
    }

    /// Number of registered writers. Diagnostic only.
    #[must_use]
    pub fn active_writers(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .active
            .len()
    }
}
