//! Tracing conventions for mirrorsearch.
//!
//! The library never installs a subscriber; consumers bring their own. This
//! module fixes the target prefix, span names, and structured field names so
//! that trackers, dashboards, and tests can match on them.

use tracing::Level;

/// Target prefix used by all mirrorsearch tracing spans and events.
///
/// Consumers can use this to filter mirrorsearch logs:
/// ```text
/// RUST_LOG=mirrorsearch=debug
/// ```
pub const TARGET_PREFIX: &str = "mirrorsearch";

/// Standard tracing span names used across the engine.
pub mod span_names {
    /// Single-node indexing.
    pub const INDEX_NODE: &str = "mirrorsearch::index_node";
    /// Batch node indexing.
    pub const INDEX_NODES: &str = "mirrorsearch::index_nodes";
    /// Transaction document + state marker write.
    pub const INDEX_TRANSACTION: &str = "mirrorsearch::index_transaction";
    /// ACL change-set document + state marker write.
    pub const INDEX_ACL_TRANSACTION: &str = "mirrorsearch::index_acl_transaction";
    /// Descendant cascade processing.
    pub const CASCADE: &str = "mirrorsearch::cascade";
    /// Content harvest of one node.
    pub const CONTENT_HARVEST: &str = "mirrorsearch::content_harvest";
    /// Unclean-content discovery scan.
    pub const CONTENT_SCAN: &str = "mirrorsearch::content_scan";
    /// Health reconciliation pass.
    pub const HEALTH_CHECK: &str = "mirrorsearch::health_check";
    /// Shard range expansion.
    pub const RANGE_EXPAND: &str = "mirrorsearch::range_expand";
}

/// Standard structured field names used in tracing events.
pub mod field_names {
    pub const NODE_ID: &str = "node_id";
    pub const TXN_ID: &str = "txn_id";
    pub const ACL_ID: &str = "acl_id";
    pub const CHANGE_SET_ID: &str = "change_set_id";
    pub const TENANT: &str = "tenant";
    pub const DOC_COUNT: &str = "doc_count";
    pub const CASCADE_COUNT: &str = "cascade_count";
    pub const DURATION_US: &str = "duration_us";
    pub const STATUS: &str = "status";
}

/// Parse a log level string (case-insensitive).
///
/// Recognized values: `trace`, `debug`, `info`, `warn`, `error`.
/// Returns `None` for unrecognized strings.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Returns the recommended `tracing::Level` for the given environment.
///
/// Checks `MIRRORSEARCH_LOG_LEVEL` first, then falls back to the provided
/// default.
#[must_use]
pub fn level_from_env(default: Level) -> Level {
    std::env::var("MIRRORSEARCH_LOG_LEVEL")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_prefix_is_mirrorsearch() {
        assert_eq!(TARGET_PREFIX, "mirrorsearch");
    }

    #[test]
    fn span_names_share_the_prefix() {
        assert!(span_names::INDEX_NODE.starts_with("mirrorsearch::"));
        assert!(span_names::CASCADE.starts_with("mirrorsearch::"));
        assert!(span_names::HEALTH_CHECK.starts_with("mirrorsearch::"));
    }

    #[test]
    fn parse_level_recognizes_valid_levels() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("Error"), Some(Level::ERROR));
    }

    #[test]
    fn parse_level_returns_none_for_invalid() {
        assert_eq!(parse_level("loud"), None);
        assert_eq!(parse_level(""), None);
    }
}
