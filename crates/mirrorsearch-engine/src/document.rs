//! Index document construction.
//!
//! Pure functions building the field-bag documents the engine writes: full
//! node documents (metadata + path fields + content-freshness transition),
//! unindexed placeholders, error placeholders, and the in-place path patching
//! used by cascades.
//!
//! The content-freshness transition lives here and nowhere else: `FtsStatus`
//! is only ever written by document construction and by the content harvest.

use mirrorsearch_core::types::doc_keys;
use mirrorsearch_core::{
    DocType, FieldName, FtsStatus, IndexDocument, Node, NodeMetaData, PropertyValue,
};

use crate::config::EngineConfig;

/// Skeleton document carrying the identity fields every node-rooted document
/// shares.
#[must_use]
pub fn basic_document(meta: &NodeMetaData, doc_type: DocType) -> IndexDocument {
    let mut doc = IndexDocument::new(doc_keys::node(&meta.tenant, meta.id), doc_type);
    doc.set(FieldName::DbId, meta.id);
    doc.set(FieldName::AclId, meta.acl_id);
    doc.set(FieldName::InTxId, meta.txn_id);
    doc.set(FieldName::Tenant, meta.tenant.clone());
    doc
}

/// Minimal placeholder for a node whose index-control property opts out of
/// indexing.
#[must_use]
pub fn build_unindexed_document(meta: &NodeMetaData) -> IndexDocument {
    basic_document(meta, DocType::UnindexedNode)
}

/// Error placeholder recording a node-level indexing failure.
///
/// The failure trace is truncated to the configured cap so a pathological
/// error cannot bloat the index.
#[must_use]
pub fn build_error_document(node: &Node, message: &str, trace: &str, cap_bytes: usize) -> IndexDocument {
    let mut doc = IndexDocument::new(doc_keys::error_node(node.id), DocType::ErrorNode);
    doc.set(FieldName::DbId, node.id);
    doc.set(FieldName::InTxId, node.txn_id);
    doc.set(FieldName::ErrorMessage, message);
    doc.set(FieldName::ErrorTrace, truncate_to_boundary(trace, cap_bytes));
    doc
}

fn truncate_to_boundary(text: &str, cap_bytes: usize) -> &str {
    if text.len() <= cap_bytes {
        return text;
    }
    let mut end = cap_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Fully built node document: identity, metadata, path fields, and the
/// content-freshness transition against the cached document.
#[must_use]
pub fn build_node_document(
    meta: &NodeMetaData,
    cached: Option<&IndexDocument>,
    config: &EngineConfig,
) -> IndexDocument {
    let mut doc = basic_document(meta, DocType::Node);
    populate_metadata(&mut doc, meta);
    update_path_fields(&mut doc, meta);
    populate_content(&mut doc, meta, cached, config);
    doc
}

/// Write type, name, owner, aspects, plain properties, and the
/// parent-association checksum.
pub fn populate_metadata(doc: &mut IndexDocument, meta: &NodeMetaData) {
    doc.set(FieldName::NodeType, meta.node_type.clone());
    doc.set(FieldName::Name, meta.name.clone());
    doc.set(FieldName::ParentAssocCrc, meta.parent_assoc_crc);
    if let Some(owner) = &meta.owner {
        doc.set(FieldName::Owner, owner.clone());
    }
    for aspect in &meta.aspects {
        doc.add(FieldName::Aspect, aspect.clone());
    }
    for (key, value) in &meta.properties {
        match value {
            PropertyValue::Text(text) => doc.add(FieldName::Property, format!("{key}={text}")),
            PropertyValue::Number(number) => {
                doc.add(FieldName::Property, format!("{key}={number}"));
            }
            // Flags drive indexing decisions, content is handled separately.
            PropertyValue::Flag(_) | PropertyValue::Content(_) => {}
        }
    }
    if let Some(cascade_txn) = meta.cascade_txn {
        doc.set(FieldName::CascadeTx, cascade_txn);
    }
}

/// Replace the path-derived fields with the node's current paths, name, and
/// ancestors. Used both at build time and when cascades patch descendants.
pub fn update_path_fields(doc: &mut IndexDocument, meta: &NodeMetaData) {
    doc.clear(FieldName::Path);
    doc.clear(FieldName::Ancestor);
    doc.clear(FieldName::AncestorPath);
    doc.set(FieldName::Name, meta.name.clone());
    doc.set(FieldName::ParentAssocCrc, meta.parent_assoc_crc);
    for path in &meta.paths {
        doc.add(FieldName::Path, path.clone());
    }
    for ancestor in &meta.ancestors {
        doc.add(FieldName::Ancestor, ancestor.clone());
    }
    for ancestor_path in &meta.ancestor_paths {
        doc.add(FieldName::AncestorPath, ancestor_path.clone());
    }
}

/// Content metadata and the freshness transition.
///
/// - Content indexing disabled: the document is marked `Clean` (nothing will
///   ever be harvested).
/// - No content property: nothing to harvest, also `Clean`.
/// - No cached document: `New`.
/// - Cached document built against a different content revision: `Dirty`.
/// - Matching revision: the cached status is carried over unchanged; the
///   cached text and transform metadata are reused.
pub fn populate_content(
    doc: &mut IndexDocument,
    meta: &NodeMetaData,
    cached: Option<&IndexDocument>,
    config: &EngineConfig,
) {
    let Some(content) = meta.content_property() else {
        doc.mark_fts_status(FtsStatus::Clean);
        return;
    };

    doc.set(FieldName::ContentId, content.content_id);
    doc.set(FieldName::ContentSize, content.size);
    doc.set(FieldName::ContentMimetype, content.mimetype.clone());
    doc.set(FieldName::ContentEncoding, content.encoding.clone());
    doc.set(FieldName::ContentLocale, content.locale.clone());

    if !config.content_indexing_enabled {
        doc.mark_fts_status(FtsStatus::Clean);
        return;
    }

    let Some(cached) = cached else {
        doc.mark_fts_status(FtsStatus::New);
        return;
    };

    // Reuse whatever the cache already harvested, current or not.
    if let Some(text) = cached.text(FieldName::Content) {
        doc.set(FieldName::Content, text);
    }
    for field in [
        FieldName::TransformStatus,
        FieldName::TransformException,
        FieldName::TransformDurationMs,
    ] {
        if let Some(value) = cached.fields.get(&field) {
            doc.fields.insert(field, value.clone());
        }
    }

    match cached.unsigned(FieldName::ContentId) {
        Some(cached_content_id) if cached_content_id == content.content_id => {
            // Could already be Dirty or New from an earlier failed harvest;
            // carry it rather than regress or advance it here.
            match cached.fts_status() {
                Some(status) => doc.mark_fts_status(status),
                None => doc.mark_fts_status(FtsStatus::Clean),
            }
        }
        _ => doc.mark_fts_status(FtsStatus::Dirty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsearch_core::types::{ContentProperty, PROP_CONTENT};
    use mirrorsearch_core::NodeStatus;

    fn sample_node() -> Node {
        Node {
            id: 10,
            txn_id: 5,
            acl_id: 2,
            tenant: "t".into(),
            status: NodeStatus::Updated,
        }
    }

    fn sample_meta() -> NodeMetaData {
        let mut meta = NodeMetaData::for_deleted_node(&sample_node());
        meta.node_ref = "node-ref-10".into();
        meta.node_type = "document".into();
        meta.name = "report.txt".into();
        meta.paths = vec!["/company/reports/report.txt".into()];
        meta.ancestors = vec!["node-ref-9".into(), "node-ref-1".into()];
        meta.ancestor_paths = vec!["/company/reports".into()];
        meta.parent_assoc_crc = 77;
        meta.properties.insert(
            PROP_CONTENT.into(),
            PropertyValue::Content(ContentProperty {
                content_id: 100,
                size: 42,
                mimetype: "text/plain".into(),
                encoding: "utf-8".into(),
                locale: "en".into(),
            }),
        );
        meta
    }

    #[test]
    fn basic_document_carries_identity() {
        let doc = basic_document(&sample_meta(), DocType::Node);
        assert_eq!(doc.id, "t!10");
        assert_eq!(doc.unsigned(FieldName::DbId), Some(10));
        assert_eq!(doc.unsigned(FieldName::AclId), Some(2));
        assert_eq!(doc.unsigned(FieldName::InTxId), Some(5));
    }

    #[test]
    fn new_node_without_cache_is_marked_new() {
        let doc = build_node_document(&sample_meta(), None, &EngineConfig::default());
        assert_eq!(doc.fts_status(), Some(FtsStatus::New));
        assert_eq!(doc.unsigned(FieldName::ContentId), Some(100));
    }

    #[test]
    fn changed_content_id_marks_dirty() {
        let config = EngineConfig::default();
        let mut cached = build_node_document(&sample_meta(), None, &config);
        cached.set(FieldName::ContentId, 99_u64); // Built against older revision.
        cached.set(FieldName::Content, "old text");
        cached.mark_fts_status(FtsStatus::Clean);

        let doc = build_node_document(&sample_meta(), Some(&cached), &config);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Dirty));
        // Stale text is carried until the next harvest replaces it.
        assert_eq!(doc.text(FieldName::Content), Some("old text"));
    }

    #[test]
    fn matching_content_id_carries_status_over() {
        let config = EngineConfig::default();
        let mut cached = build_node_document(&sample_meta(), None, &config);
        cached.mark_fts_status(FtsStatus::Dirty);

        let doc = build_node_document(&sample_meta(), Some(&cached), &config);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Dirty));

        cached.mark_fts_status(FtsStatus::Clean);
        let doc = build_node_document(&sample_meta(), Some(&cached), &config);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Clean));
    }

    #[test]
    fn disabled_content_indexing_marks_clean() {
        let config = EngineConfig {
            content_indexing_enabled: false,
            ..Default::default()
        };
        let doc = build_node_document(&sample_meta(), None, &config);
        assert_eq!(doc.fts_status(), Some(FtsStatus::Clean));
    }

    #[test]
    fn node_without_content_property_is_clean() {
        let mut meta = sample_meta();
        meta.properties.remove(PROP_CONTENT);
        let doc = build_node_document(&meta, None, &EngineConfig::default());
        assert_eq!(doc.fts_status(), Some(FtsStatus::Clean));
        assert!(doc.unsigned(FieldName::ContentId).is_none());
    }

    #[test]
    fn path_fields_are_replaced_not_merged() {
        let config = EngineConfig::default();
        let mut doc = build_node_document(&sample_meta(), None, &config);

        let mut moved = sample_meta();
        moved.paths = vec!["/company/archive/report.txt".into()];
        moved.ancestors = vec!["node-ref-8".into()];
        moved.ancestor_paths = vec!["/company/archive".into()];
        moved.parent_assoc_crc = 78;

        update_path_fields(&mut doc, &moved);
        assert_eq!(doc.texts(FieldName::Path), vec!["/company/archive/report.txt"]);
        assert_eq!(doc.texts(FieldName::Ancestor), vec!["node-ref-8"]);
        assert_eq!(doc.unsigned(FieldName::ParentAssocCrc), Some(78));
    }

    #[test]
    fn error_document_truncates_trace() {
        let node = sample_node();
        let trace = "x".repeat(100);
        let doc = build_error_document(&node, "boom", &trace, 10);
        assert_eq!(doc.id, "ERROR-10");
        assert_eq!(doc.text(FieldName::ErrorMessage), Some("boom"));
        assert_eq!(doc.text(FieldName::ErrorTrace).unwrap().len(), 10);
    }

    #[test]
    fn trace_truncation_respects_char_boundaries() {
        assert_eq!(truncate_to_boundary("héllo", 2), "h");
        assert_eq!(truncate_to_boundary("héllo", 3), "hé");
        assert_eq!(truncate_to_boundary("abc", 10), "abc");
    }

    #[test]
    fn idempotent_rebuild_produces_identical_fields() {
        let config = EngineConfig::default();
        let first = build_node_document(&sample_meta(), None, &config);
        let second = build_node_document(&sample_meta(), None, &config);
        assert_eq!(first, second);
    }
}
