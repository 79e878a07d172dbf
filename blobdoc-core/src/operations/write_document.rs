use super::mutation::{cleanup_blob, cleanup_chunks_from, put_resolving};
use crate::blob::DynBlobApi;
use crate::error::ChunkFailure;
use crate::storage::{ChunkCodec, ChunkPayload, DocumentCache, parse_chunk_path};
use crate::{DocError, Result, RetryPolicy, VersionToken};
use bytes::Bytes;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct WriteDocumentOperation {
    blob_api: DynBlobApi,
    cache: Arc<DocumentCache>,
    codec: Arc<ChunkCodec>,
    retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct WriteDocumentOperationRequest {
    pub path: String,
    pub content: Value,
    pub message: String,
}

/// Physical representation a write left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    Unsplit,
    Split { chunks: usize },
}

#[derive(Debug, Clone)]
pub struct WriteDocumentOperationResult {
    pub path: String,
    pub layout: DocumentLayout,
    /// Version of the single blob, or of chunk 0 for a split document.
    pub version: VersionToken,
    /// Stale blobs removed after the write.
    pub cleaned_up: usize,
}

impl WriteDocumentOperation {
    pub fn new(
        blob_api: DynBlobApi,
        cache: Arc<DocumentCache>,
        codec: Arc<ChunkCodec>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            blob_api,
            cache,
            codec,
            retry,
        }
    }

    pub async fn run(
        &self,
        request: WriteDocumentOperationRequest,
    ) -> Result<WriteDocumentOperationResult> {
        let WriteDocumentOperationRequest {
            path,
            content,
            message,
        } = request;

        if let Some(descriptor) = parse_chunk_path(&path) {
            return Err(DocError::InvalidRequest(format!(
                "{} is chunk {} of {}; write the whole document instead",
                path, descriptor.chunk_index, descriptor.base_path
            )));
        }

        let outcome = self.write(&path, &content, &message).await;
        // A failed write may still have touched some blobs.
        self.cache.invalidate(Some(&path)).await;
        outcome
    }

    async fn write(
        &self,
        path: &str,
        content: &Value,
        message: &str,
    ) -> Result<WriteDocumentOperationResult> {
        let chunks = if self.codec.should_split(content)? {
            let chunks = self.codec.split(content, path)?;
            if chunks.is_none() {
                tracing::warn!(
                    "{} exceeds {} bytes but has no splittable collection; writing it whole",
                    path,
                    self.codec.max_blob_bytes()
                );
            }
            chunks
        } else {
            None
        };

        match chunks {
            Some(chunks) if chunks.len() > 1 => self.write_split(path, chunks, message).await,
            _ => self.write_single(path, content, message).await,
        }
    }

    async fn write_single(
        &self,
        path: &str,
        content: &Value,
        message: &str,
    ) -> Result<WriteDocumentOperationResult> {
        let cleaned_up = cleanup_chunks_from(&self.blob_api, &self.retry, path, 0, message).await;
        if cleaned_up > 0 {
            tracing::info!("{} shrank: removed {} chunks", path, cleaned_up);
        }

        let body = Bytes::from(self.codec.serialize(content)?);
        let version = put_resolving(&self.blob_api, &self.retry, path, body, message).await?;

        Ok(WriteDocumentOperationResult {
            path: path.to_string(),
            layout: DocumentLayout::Unsplit,
            version,
            cleaned_up,
        })
    }

    async fn write_split(
        &self,
        path: &str,
        chunks: Vec<ChunkPayload>,
        message: &str,
    ) -> Result<WriteDocumentOperationResult> {
        let total = chunks.len();
        let mut encoded = Vec::with_capacity(total);
        for chunk in &chunks {
            encoded.push(Bytes::from(self.codec.serialize(&chunk.body)?));
        }

        let writes = chunks.iter().zip(encoded).map(|(chunk, body)| {
            let chunk_message = format!("{} (part {}/{})", message, chunk.chunk_index + 1, total);
            async move {
                let written = put_resolving(
                    &self.blob_api,
                    &self.retry,
                    &chunk.physical_path,
                    body,
                    &chunk_message,
                )
                .await;
                (chunk, written)
            }
        });

        let mut version = VersionToken::empty();
        let mut failed = Vec::new();
        for (chunk, written) in join_all(writes).await {
            match written {
                Ok(chunk_version) if chunk.chunk_index == 0 => version = chunk_version,
                Ok(_) => {}
                Err(error) => failed.push(ChunkFailure {
                    physical_path: chunk.physical_path.clone(),
                    chunk_index: chunk.chunk_index,
                    reason: error.to_string(),
                }),
            }
        }

        if !failed.is_empty() {
            tracing::warn!(
                "split write of {} failed for {} of {} chunks",
                path,
                failed.len(),
                total
            );
            return Err(DocError::PartialSplitFailure {
                path: path.to_string(),
                total,
                failed,
            });
        }

        let mut cleaned_up = cleanup_blob(&self.blob_api, &self.retry, path, message).await;
        cleaned_up +=
            cleanup_chunks_from(&self.blob_api, &self.retry, path, total, message).await;

        tracing::info!(
            "wrote {} as {} chunks ({} stale blobs removed)",
            path,
            total,
            cleaned_up
        );
        Ok(WriteDocumentOperationResult {
            path: path.to_string(),
            layout: DocumentLayout::Split { chunks: total },
            version,
            cleaned_up,
        })
    }
}
