//! Per-node lock registry.
//!
//! The registry is a process-wide set of "busy" node identifiers owned by the
//! engine instance. Acquisition spin-waits with a configurable poll interval
//! and gives up after a hard timeout; release is guaranteed by an RAII guard.
//! This serializes concurrent handling of the same node across trackers and
//! batches without serializing unrelated nodes.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{EngineError, EngineResult};

/// Engine-owned registry of node ids with an in-flight mutation.
#[derive(Debug)]
pub struct NodeLockRegistry {
    busy: Mutex<HashSet<u64>>,
    timeout: Duration,
    poll: Duration,
}

impl NodeLockRegistry {
    /// Create a registry with the given acquisition timeout and poll interval.
    #[must_use]
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self {
            busy: Mutex::new(HashSet::new()),
            timeout,
            poll,
        }
    }

    /// Acquire the lock for a node, spin-waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::LockTimeout`] if the node stayed busy for the
    /// whole timeout window. The caller treats this as fatal for the node's
    /// current operation.
    pub fn acquire(&self, node_id: u64) -> EngineResult<NodeLockGuard<'_>> {
        let started = Instant::now();
        while !self.try_acquire(node_id) {
            if started.elapsed() >= self.timeout {
                return Err(EngineError::LockTimeout {
                    node_id,
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            std::thread::sleep(self.poll);
        }
        Ok(NodeLockGuard {
            registry: self,
            node_id,
        })
    }

    /// Try to mark a node busy without waiting.
    fn try_acquire(&self, node_id: u64) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(node_id)
    }

    fn release(&self, node_id: u64) {
        self.busy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&node_id);
    }

    /// Whether a node is currently locked. Diagnostic only.
    #[must_use]
    pub fn is_locked(&self, node_id: u64) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&node_id)
    }

    /// Number of nodes currently locked. Diagnostic only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.busy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no node is currently locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard releasing a node lock on drop, whatever the outcome of the
/// bracketed mutation.
#[derive(Debug)]
pub struct NodeLockGuard<'a> {
    registry: &'a NodeLockRegistry,
    node_id: u64,
}

impl NodeLockGuard<'_> {
    /// The node this guard locks.
    #[must_use]
    pub const fn node_id(&self) -> u64 {
        self.node_id
    }
}

impl Drop for NodeLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    fn fast_registry() -> NodeLockRegistry {
        NodeLockRegistry::new(Duration::from_millis(50), Duration::from_millis(1))
    }

    #[test]
    fn acquire_and_release_on_drop() {
        let registry = fast_registry();
        {
            let guard = registry.acquire(1).unwrap();
            assert_eq!(guard.node_id(), 1);
            assert!(registry.is_locked(1));
        }
        assert!(!registry.is_locked(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn unrelated_nodes_do_not_block() {
        let registry = fast_registry();
        let _a = registry.acquire(1).unwrap();
        let _b = registry.acquire(2).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn second_acquire_times_out() {
        let registry = fast_registry();
        let _guard = registry.acquire(1).unwrap();
        let err = registry.acquire(1).unwrap_err();
        assert!(matches!(err, EngineError::LockTimeout { node_id: 1, .. }));
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let registry = Arc::new(NodeLockRegistry::new(
            Duration::from_secs(5),
            Duration::from_millis(1),
        ));
        let guard = registry.acquire(1).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let registry = Arc::clone(&registry);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _guard = registry.acquire(1).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn critical_sections_never_interleave() {
        let registry = Arc::new(NodeLockRegistry::new(
            Duration::from_secs(5),
            Duration::from_millis(1),
        ));
        let concurrent = Arc::new(AtomicU64::new(0));
        let max_seen = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let concurrent = Arc::clone(&concurrent);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = registry.acquire(42).unwrap();
                        let inside = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(inside, Ordering::SeqCst);
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
