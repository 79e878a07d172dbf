use super::mutation::{delete_chunks_from, delete_resolving};
use crate::blob::{DeleteOutcome, DynBlobApi};
use crate::storage::{DocumentCache, parse_chunk_path};
use crate::{DocError, Result, RetryPolicy};
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteDocumentOperation {
    blob_api: DynBlobApi,
    cache: Arc<DocumentCache>,
    retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct DeleteDocumentOperationRequest {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDocumentOperationOutcome {
    /// Number of physical blobs removed (the blob or every chunk).
    Deleted { blobs: usize },
    NotFound,
}

impl DeleteDocumentOperation {
    pub fn new(blob_api: DynBlobApi, cache: Arc<DocumentCache>, retry: RetryPolicy) -> Self {
        Self {
            blob_api,
            cache,
            retry,
        }
    }

    pub async fn run(
        &self,
        request: DeleteDocumentOperationRequest,
    ) -> Result<DeleteDocumentOperationOutcome> {
        let DeleteDocumentOperationRequest { path, message } = request;

        if let Some(descriptor) = parse_chunk_path(&path) {
            return Err(DocError::InvalidRequest(format!(
                "{} is chunk {} of {}; delete the whole document instead",
                path, descriptor.chunk_index, descriptor.base_path
            )));
        }

        let outcome = self.delete(&path, &message).await;
        self.cache.invalidate(Some(&path)).await;
        outcome
    }

    async fn delete(&self, path: &str, message: &str) -> Result<DeleteDocumentOperationOutcome> {
        let mut blobs = match delete_resolving(&self.blob_api, &self.retry, path, message).await? {
            DeleteOutcome::Deleted => 1,
            DeleteOutcome::NotFound => 0,
        };
        blobs += delete_chunks_from(&self.blob_api, &self.retry, path, 0, message).await?;

        if blobs == 0 {
            tracing::debug!("delete of {} was a no-op", path);
            return Ok(DeleteDocumentOperationOutcome::NotFound);
        }

        tracing::info!("deleted {} ({} blobs)", path, blobs);
        Ok(DeleteDocumentOperationOutcome::Deleted { blobs })
    }
}
