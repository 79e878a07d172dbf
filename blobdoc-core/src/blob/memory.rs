use super::{BlobApi, BlobRecord, DeleteOutcome, DirEntry, EntryKind};
use crate::{DocError, Result, VersionToken};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process-local blob store with content-hash versions. Backs tests and
/// the `memory` backend of the CLI.
#[derive(Debug, Default)]
pub struct InMemoryBlobApi {
    blobs: RwLock<BTreeMap<String, BlobRecord>>,
    fetches: AtomicUsize,
}

impl InMemoryBlobApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_blob` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn paths(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }

    /// Writes a blob without any version check, as an external writer
    /// would.
    pub async fn insert_raw(&self, path: &str, content: impl Into<Bytes>) -> VersionToken {
        let content = content.into();
        let version = VersionToken::new(compute_hash(&content));
        self.blobs.write().await.insert(
            normalize(path).to_string(),
            BlobRecord {
                content,
                version: version.clone(),
            },
        );
        version
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// SHA-256 hex digest, used as the version token.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl BlobApi for InMemoryBlobApi {
    async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.blobs.read().await.get(normalize(path)).cloned())
    }

    async fn put_blob(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(DocError::InvalidRequest("blob path cannot be empty".to_string()));
        }

        let mut blobs = self.blobs.write().await;
        let current = blobs.get(path).map(|record| &record.version);
        if current != expected {
            return Err(DocError::VersionMismatch {
                path: path.to_string(),
            });
        }

        let version = VersionToken::new(compute_hash(&content));
        tracing::debug!("put {} -> {} ({})", path, version, message);
        blobs.insert(
            path.to_string(),
            BlobRecord {
                content,
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome> {
        let path = normalize(path);
        let mut blobs = self.blobs.write().await;
        let Some(current) = blobs.get(path) else {
            return Ok(DeleteOutcome::NotFound);
        };
        if &current.version != expected {
            return Err(DocError::VersionMismatch {
                path: path.to_string(),
            });
        }

        blobs.remove(path);
        tracing::debug!("deleted {} ({})", path, message);
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = normalize(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let blobs = self.blobs.read().await;
        let mut entries: HashMap<String, DirEntry> = HashMap::new();
        for key in blobs.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind) = match rest.split_once('/') {
                Some((name, _)) => (name, EntryKind::Dir),
                None => (rest, EntryKind::File),
            };
            entries.entry(name.to_string()).or_insert_with(|| DirEntry {
                name: name.to_string(),
                path: format!("{}{}", prefix, name),
                kind,
            });
        }

        let mut entries: Vec<DirEntry> = entries.into_values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
