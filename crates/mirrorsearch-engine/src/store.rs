//! Document cache implementations.
//!
//! [`MemoryDocumentCache`] keeps everything in a map; it backs tests and
//! small cores. [`DiskDocumentCache`] persists one JSON file per node under a
//! tenant directory, surviving restarts the way a production content store
//! does.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mirrorsearch_core::{DocumentCache, EngineError, EngineResult, IndexDocument};

/// In-memory document cache.
#[derive(Debug, Default)]
pub struct MemoryDocumentCache {
    docs: Mutex<HashMap<(String, u64), IndexDocument>>,
}

impl MemoryDocumentCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentCache for MemoryDocumentCache {
    fn retrieve(&self, tenant: &str, node_id: u64) -> EngineResult<Option<IndexDocument>> {
        Ok(self
            .docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(tenant.to_owned(), node_id))
            .cloned())
    }

    fn store(&self, tenant: &str, node_id: u64, doc: &IndexDocument) -> EngineResult<()> {
        self.docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((tenant.to_owned(), node_id), doc.clone());
        Ok(())
    }

    fn remove(&self, tenant: &str, node_id: u64) -> EngineResult<()> {
        self.docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&(tenant.to_owned(), node_id));
        Ok(())
    }
}

/// On-disk document cache: one JSON file per node under
/// `<root>/<tenant>/<node_id>.json`.
#[derive(Debug)]
pub struct DiskDocumentCache {
    root: PathBuf,
}

impl DiskDocumentCache {
    /// A cache rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn doc_path(&self, tenant: &str, node_id: u64) -> PathBuf {
        let tenant_dir = if tenant.is_empty() { "_default" } else { tenant };
        self.root.join(tenant_dir).join(format!("{node_id}.json"))
    }

    fn cache_error(
        tenant: &str,
        node_id: u64,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> EngineError {
        EngineError::DocumentCache {
            tenant: tenant.to_owned(),
            node_id,
            source: Box::new(source),
        }
    }
}

impl DocumentCache for DiskDocumentCache {
    fn retrieve(&self, tenant: &str, node_id: u64) -> EngineResult<Option<IndexDocument>> {
        let path = self.doc_path(tenant, node_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Self::cache_error(tenant, node_id, error)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| Self::cache_error(tenant, node_id, error))
    }

    fn store(&self, tenant: &str, node_id: u64, doc: &IndexDocument) -> EngineResult<()> {
        let path = self.doc_path(tenant, node_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| Self::cache_error(tenant, node_id, error))?;
        }
        let bytes =
            serde_json::to_vec(doc).map_err(|error| Self::cache_error(tenant, node_id, error))?;
        write_atomically(&path, &bytes).map_err(|error| Self::cache_error(tenant, node_id, error))
    }

    fn remove(&self, tenant: &str, node_id: u64) -> EngineResult<()> {
        match fs::remove_file(self.doc_path(tenant, node_id)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Self::cache_error(tenant, node_id, error)),
        }
    }
}

/// Write via a sibling temp file and rename, so a crashed write never leaves
/// a truncated document behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsearch_core::{DocType, FieldName};

    fn sample_doc() -> IndexDocument {
        let mut doc = IndexDocument::new("t!1", DocType::Node);
        doc.set(FieldName::DbId, 1_u64);
        doc.set(FieldName::Content, "hello");
        doc
    }

    #[test]
    fn memory_cache_round_trip() {
        let cache = MemoryDocumentCache::new();
        assert!(cache.retrieve("t", 1).unwrap().is_none());

        cache.store("t", 1, &sample_doc()).unwrap();
        assert_eq!(cache.retrieve("t", 1).unwrap(), Some(sample_doc()));

        // Tenants are isolated.
        assert!(cache.retrieve("other", 1).unwrap().is_none());

        cache.remove("t", 1).unwrap();
        assert!(cache.retrieve("t", 1).unwrap().is_none());
    }

    #[test]
    fn disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskDocumentCache::new(dir.path());

        assert!(cache.retrieve("t", 1).unwrap().is_none());
        cache.store("t", 1, &sample_doc()).unwrap();
        assert_eq!(cache.retrieve("t", 1).unwrap(), Some(sample_doc()));

        cache.remove("t", 1).unwrap();
        assert!(cache.retrieve("t", 1).unwrap().is_none());
        // Removing again is not an error.
        cache.remove("t", 1).unwrap();
    }

    #[test]
    fn disk_cache_defaults_empty_tenant_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskDocumentCache::new(dir.path());
        cache.store("", 7, &sample_doc()).unwrap();
        assert!(dir.path().join("_default").join("7.json").exists());
        assert!(cache.retrieve("", 7).unwrap().is_some());
    }

    #[test]
    fn disk_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DiskDocumentCache::new(dir.path());
            cache.store("t", 9, &sample_doc()).unwrap();
        }
        let reopened = DiskDocumentCache::new(dir.path());
        assert_eq!(reopened.retrieve("t", 9).unwrap(), Some(sample_doc()));
    }
}
