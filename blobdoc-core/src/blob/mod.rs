//! Blob API boundary
//!
//! The remote, versioned blob store the document layer is built on, plus
//! the transports that implement it.

pub mod contents_api;
pub mod factory;
pub mod memory;

pub use contents_api::ContentsApiClient;
pub use factory::BlobApiBuilder;
pub use memory::InMemoryBlobApi;

use crate::{Result, VersionToken};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One physical blob as fetched from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRecord {
    pub content: Bytes,
    pub version: VersionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// Contract of the backing store. Every mutation is checked against the
/// blob's current version; a stale `expected` version is rejected with
/// [`crate::DocError::VersionMismatch`].
#[async_trait]
pub trait BlobApi: Send + Sync {
    async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>>;

    /// Creates or replaces a blob. Creation takes no `expected` version;
    /// replacing an existing blob requires its current one.
    async fn put_blob(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken>;

    async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome>;

    /// Entries directly under `path`; empty when the directory is absent.
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Current version of `path`, if it exists.
    async fn current_version(&self, path: &str) -> Result<Option<VersionToken>> {
        Ok(self.get_blob(path).await?.map(|record| record.version))
    }
}

pub type DynBlobApi = Arc<dyn BlobApi>;
