//! The mirrorsearch indexing/consistency engine.
//!
//! One [`IndexEngine`] per index core turns repository node/ACL/transaction
//! events into index mutations while preserving:
//!
//! - at-most-one in-flight mutation per logical node (per-node lock registry),
//! - consistent propagation of path/ancestor changes to descendants
//!   ([`cascade`]),
//! - a well-defined content-freshness state machine per node ([`content`]),
//! - idempotent re-indexing (document replace is delete-then-add),
//! - detectable drift between repository and index ([`health`]),
//! - safe shard id-range growth ([`shard`]).
//!
//! Trackers drive the engine: each registers for a cycle
//! ([`IndexEngine::register_tracker`]), pushes events, commits, and
//! deregisters. A rollback invalidates every in-flight writer; stale writers
//! fail fast with a dedicated rolled-back error.

pub mod cascade;
pub mod config;
pub mod content;
pub mod document;
pub mod engine;
pub mod gate;
pub mod health;
pub mod shard;
pub mod state;
pub mod store;
pub mod testing;

pub use config::EngineConfig;
pub use engine::IndexEngine;
pub use gate::{WriteGate, WriterToken};
pub use health::{reconcile_id_range, IdRangeReporter};
pub use shard::{DbIdRangeRouter, RangeCheckReport};
pub use store::{DiskDocumentCache, MemoryDocumentCache};
