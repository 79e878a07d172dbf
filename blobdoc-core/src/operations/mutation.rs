//! Single-blob mutations shared by the write and delete operations. Each
//! one re-resolves the blob's version on every attempt.

use crate::blob::{DeleteOutcome, DynBlobApi};
use crate::storage::physical_path;
use crate::{Result, RetryPolicy, VersionToken};
use bytes::Bytes;

/// Creates or replaces `path`, resolving its current version right before
/// each attempt.
pub(crate) async fn put_resolving(
    blob_api: &DynBlobApi,
    retry: &RetryPolicy,
    path: &str,
    content: Bytes,
    message: &str,
) -> Result<VersionToken> {
    retry
        .run_on_conflict(path, |attempt| {
            let content = content.clone();
            async move {
                let current = blob_api.current_version(path).await?;
                if attempt > 1 {
                    tracing::debug!("re-resolved {} to {:?} (attempt {})", path, current, attempt);
                }
                blob_api
                    .put_blob(path, content, message, current.as_ref())
                    .await
            }
        })
        .await
}

/// Deletes `path` at its current version; an absent blob is not an error.
pub(crate) async fn delete_resolving(
    blob_api: &DynBlobApi,
    retry: &RetryPolicy,
    path: &str,
    message: &str,
) -> Result<DeleteOutcome> {
    retry
        .run_on_conflict(path, |_| async move {
            match blob_api.current_version(path).await? {
                Some(version) => blob_api.delete_blob(path, message, &version).await,
                None => Ok(DeleteOutcome::NotFound),
            }
        })
        .await
}

/// Deletes chunks `start`, `start + 1`, ... of `base_path` until one is
/// missing. Returns how many were removed.
pub(crate) async fn delete_chunks_from(
    blob_api: &DynBlobApi,
    retry: &RetryPolicy,
    base_path: &str,
    start: usize,
    message: &str,
) -> Result<usize> {
    let mut removed = 0;
    for index in start.. {
        let chunk_path = physical_path(base_path, index);
        match delete_resolving(blob_api, retry, &chunk_path, message).await? {
            DeleteOutcome::Deleted => removed += 1,
            DeleteOutcome::NotFound => break,
        }
    }
    Ok(removed)
}

/// Cleanup variant of [`delete_chunks_from`]: failures are logged and
/// swallowed.
pub(crate) async fn cleanup_chunks_from(
    blob_api: &DynBlobApi,
    retry: &RetryPolicy,
    base_path: &str,
    start: usize,
    message: &str,
) -> usize {
    match delete_chunks_from(blob_api, retry, base_path, start, message).await {
        Ok(removed) => removed,
        Err(error) => {
            tracing::warn!(
                "cleanup of chunks {}.. for {} failed: {}",
                start,
                base_path,
                error
            );
            0
        }
    }
}

/// Cleanup variant of [`delete_resolving`].
pub(crate) async fn cleanup_blob(
    blob_api: &DynBlobApi,
    retry: &RetryPolicy,
    path: &str,
    message: &str,
) -> usize {
    match delete_resolving(blob_api, retry, path, message).await {
        Ok(DeleteOutcome::Deleted) => 1,
        Ok(DeleteOutcome::NotFound) => 0,
        Err(error) => {
            tracing::warn!("cleanup of {} failed: {}", path, error);
            0
        }
    }
}
