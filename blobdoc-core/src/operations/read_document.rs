use crate::blob::DynBlobApi;
use crate::storage::{
    ChunkCodec, DocumentCache, TOTAL_CHUNKS_FIELD, parse_chunk_path, physical_path,
};
use crate::{DocError, Result, VersionToken};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadDocumentOperation {
    blob_api: DynBlobApi,
    cache: Arc<DocumentCache>,
    codec: Arc<ChunkCodec>,
}

#[derive(Debug, Clone)]
pub struct ReadDocumentOperationRequest {
    pub path: String,
}

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Blob,
    Chunks { count: usize },
    Absent,
}

#[derive(Debug, Clone)]
pub struct ReadDocumentOperationResult {
    /// Logical path the document was resolved under.
    pub path: String,
    pub content: Value,
    pub version: VersionToken,
    pub source: ReadSource,
}

fn parse_json(path: &str, content: &Bytes) -> Result<Value> {
    serde_json::from_slice(content).map_err(|error| DocError::malformed(path, error))
}

impl ReadDocumentOperation {
    pub fn new(blob_api: DynBlobApi, cache: Arc<DocumentCache>, codec: Arc<ChunkCodec>) -> Self {
        Self {
            blob_api,
            cache,
            codec,
        }
    }

    pub async fn run(
        &self,
        request: ReadDocumentOperationRequest,
    ) -> Result<ReadDocumentOperationResult> {
        let ReadDocumentOperationRequest { path } = request;

        if let Some(hit) = self.cached(&path).await {
            return Ok(hit);
        }

        let path = match parse_chunk_path(&path) {
            Some(descriptor) => {
                tracing::debug!(
                    "read of chunk {} redirected to {}",
                    descriptor.physical_path,
                    descriptor.base_path
                );
                if let Some(hit) = self.cached(&descriptor.base_path).await {
                    return Ok(hit);
                }
                descriptor.base_path
            }
            None => path,
        };

        let generation = self.cache.generation();
        let result = match self.blob_api.get_blob(&path).await? {
            Some(record) => ReadDocumentOperationResult {
                content: parse_json(&path, &record.content)?,
                version: record.version,
                source: ReadSource::Blob,
                path,
            },
            None => self.read_chunks(path).await?,
        };

        let stored = self
            .cache
            .set_if_current(
                &result.path,
                result.content.clone(),
                result.version.clone(),
                generation,
            )
            .await;
        if !stored {
            tracing::debug!("{} changed during the read; not caching it", result.path);
        }
        Ok(result)
    }

    async fn cached(&self, path: &str) -> Option<ReadDocumentOperationResult> {
        let hit = self.cache.get(path).await?;
        tracing::debug!("cache hit for {}", path);
        Some(ReadDocumentOperationResult {
            path: path.to_string(),
            content: hit.content,
            version: hit.version,
            source: ReadSource::Cache,
        })
    }

    /// Probes `path`'s chunk family in index order and merges what exists.
    async fn read_chunks(&self, path: String) -> Result<ReadDocumentOperationResult> {
        let mut chunks = Vec::new();
        let mut version = VersionToken::empty();

        for index in 0.. {
            let chunk_path = physical_path(&path, index);
            let Some(record) = self.blob_api.get_blob(&chunk_path).await? else {
                break;
            };
            if index == 0 {
                version = record.version.clone();
            }
            chunks.push((index, parse_json(&chunk_path, &record.content)?));
        }

        if chunks.is_empty() {
            tracing::debug!("{} does not exist", path);
            return Ok(ReadDocumentOperationResult {
                path,
                content: Value::Object(Map::new()),
                version: VersionToken::empty(),
                source: ReadSource::Absent,
            });
        }

        let declared = chunks[0]
            .1
            .get(TOTAL_CHUNKS_FIELD)
            .and_then(Value::as_u64)
            .and_then(|total| usize::try_from(total).ok());
        match declared {
            Some(total) if chunks.len() > total => {
                tracing::warn!(
                    "{} has {} chunks but declares {}; ignoring the stale tail",
                    path,
                    chunks.len(),
                    total
                );
                chunks.truncate(total.max(1));
            }
            Some(total) if chunks.len() < total => {
                tracing::warn!(
                    "{} declares {} chunks but only {} exist; merging what is present",
                    path,
                    total,
                    chunks.len()
                );
            }
            _ => {}
        }

        let count = chunks.len();
        Ok(ReadDocumentOperationResult {
            content: self.codec.merge(chunks),
            version,
            source: ReadSource::Chunks { count },
            path,
        })
    }
}
