//! Blobdoc Core - JSON documents on top of a versioned blob API
//!
//! A document layer over a remote, git-like content store:
//! - documents above the per-blob size ceiling are split into indexed chunks
//! - chunks are merged back transparently on read
//! - short-lived read cache keyed by logical path
//! - optimistic concurrency with bounded conflict retry

pub mod blob;
pub mod config;
pub mod error;
pub mod operations;
pub mod retry;
pub mod storage;
pub mod store;
pub mod version;

pub use blob::{
    BlobApi, BlobApiBuilder, BlobRecord, ContentsApiClient, DeleteOutcome, DirEntry, EntryKind,
    InMemoryBlobApi,
};
pub use config::{ConflictRetryConfig, StoreConfig, ThrottleConfig};
pub use error::{DocError, Result};
pub use retry::{RetryPolicy, ThrottleBackoff};
pub use storage::{
    CHUNK_INDEX_FIELD, ChunkCodec, ChunkDescriptor, ChunkPayload, CollectionFields,
    DEFAULT_MAX_BLOB_BYTES, DocumentCache, TOTAL_CHUNKS_FIELD, parse_chunk_path, physical_path,
};
pub use store::{DocumentStore, LogicalDocument};
pub use version::VersionToken;
