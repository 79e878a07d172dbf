use crate::blob::{DirEntry, DynBlobApi};
use crate::operations::{
    DeleteDocumentOperation, DeleteDocumentOperationOutcome, DeleteDocumentOperationRequest,
    ListDirectoryOperation, ListDirectoryOperationRequest, ReadDocumentOperation,
    ReadDocumentOperationRequest, WriteDocumentOperation, WriteDocumentOperationRequest,
    WriteDocumentOperationResult,
};
use crate::storage::{ChunkCodec, DocumentCache};
use crate::{Result, RetryPolicy, StoreConfig, VersionToken};
use serde_json::Value;
use std::sync::Arc;

/// A caller-visible document, independent of how many blobs back it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalDocument {
    pub path: String,
    pub content: Value,
    /// Empty when the document does not exist yet.
    pub version: VersionToken,
}

impl LogicalDocument {
    pub fn exists(&self) -> bool {
        !self.version.is_empty()
    }
}

/// Handle to the document layer. Construct one per process and share it;
/// clones share the same cache.
#[derive(Clone)]
pub struct DocumentStore {
    cache: Arc<DocumentCache>,
    codec: Arc<ChunkCodec>,
    read_op: ReadDocumentOperation,
    write_op: WriteDocumentOperation,
    delete_op: DeleteDocumentOperation,
    list_op: ListDirectoryOperation,
}

impl DocumentStore {
    pub fn new(blob_api: DynBlobApi, config: &StoreConfig) -> Self {
        Self::with_parts(
            blob_api,
            ChunkCodec::from_config(config),
            DocumentCache::new(config.cache_ttl()),
            RetryPolicy::from_config(&config.conflict_retry),
        )
    }

    pub fn with_parts(
        blob_api: DynBlobApi,
        codec: ChunkCodec,
        cache: DocumentCache,
        retry: RetryPolicy,
    ) -> Self {
        let cache = Arc::new(cache);
        let codec = Arc::new(codec);

        Self {
            read_op: ReadDocumentOperation::new(blob_api.clone(), cache.clone(), codec.clone()),
            write_op: WriteDocumentOperation::new(
                blob_api.clone(),
                cache.clone(),
                codec.clone(),
                retry.clone(),
            ),
            delete_op: DeleteDocumentOperation::new(blob_api.clone(), cache.clone(), retry),
            list_op: ListDirectoryOperation::new(blob_api),
            cache,
            codec,
        }
    }

    pub fn codec(&self) -> &ChunkCodec {
        &self.codec
    }

    pub async fn read(&self, path: &str) -> Result<LogicalDocument> {
        let result = self
            .read_op
            .run(ReadDocumentOperationRequest {
                path: path.to_string(),
            })
            .await?;

        Ok(LogicalDocument {
            path: result.path,
            content: result.content,
            version: result.version,
        })
    }

    pub async fn read_document(&self, path: &str) -> Result<(Value, VersionToken)> {
        let document = self.read(path).await?;
        Ok((document.content, document.version))
    }

    pub async fn write(
        &self,
        path: &str,
        content: Value,
        change_description: &str,
    ) -> Result<WriteDocumentOperationResult> {
        self.write_op
            .run(WriteDocumentOperationRequest {
                path: path.to_string(),
                content,
                message: change_description.to_string(),
            })
            .await
    }

    pub async fn write_document(
        &self,
        path: &str,
        content: Value,
        change_description: &str,
    ) -> Result<()> {
        self.write(path, content, change_description).await?;
        Ok(())
    }

    pub async fn delete(
        &self,
        path: &str,
        change_description: &str,
    ) -> Result<DeleteDocumentOperationOutcome> {
        self.delete_op
            .run(DeleteDocumentOperationRequest {
                path: path.to_string(),
                message: change_description.to_string(),
            })
            .await
    }

    pub async fn delete_document(&self, path: &str, change_description: &str) -> Result<()> {
        self.delete(path, change_description).await?;
        Ok(())
    }

    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let result = self
            .list_op
            .run(ListDirectoryOperationRequest {
                path: path.to_string(),
            })
            .await?;
        Ok(result.entries)
    }

    /// Drops the cached copy of `path`, or every cached document.
    pub async fn invalidate(&self, path: Option<&str>) {
        self.cache.invalidate(path).await;
    }
}
