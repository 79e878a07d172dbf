//! Storage modules for Blobdoc
//!
//! Chunk layout of oversized documents and the read cache.

pub mod cache;
pub mod codec;

pub use cache::{CachedDocument, DocumentCache};
pub use codec::{
    CHUNK_INDEX_FIELD, ChunkCodec, ChunkDescriptor, ChunkPayload, CollectionFields,
    DEFAULT_COLLECTION_FIELDS, DEFAULT_MAX_BLOB_BYTES, TOTAL_CHUNKS_FIELD, parse_chunk_path,
    physical_path, strip_chunk_markers,
};
