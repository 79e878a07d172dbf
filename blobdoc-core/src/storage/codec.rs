use crate::config::StoreConfig;
use crate::Result;
use serde_json::{Map, Value};

/// Per-blob ceiling of the backing store, in serialized bytes.
pub const DEFAULT_MAX_BLOB_BYTES: usize = 800 * 1000;

pub const DEFAULT_COLLECTION_FIELDS: &[&str] = &["items", "users", "admins"];

pub const CHUNK_INDEX_FIELD: &str = "chunkIndex";
pub const TOTAL_CHUNKS_FIELD: &str = "totalChunks";

const DOCUMENT_SUFFIX: &str = ".json";

/// Element size assumed when the collection is empty.
const EMPTY_ELEMENT_ESTIMATE: usize = 1000;

// 1.2x headroom for serialization overhead, kept as an exact ratio.
const MARGIN_NUMERATOR: usize = 6;
const MARGIN_DENOMINATOR: usize = 5;

/// Names of the top-level array fields that may be sliced across chunks.
/// Supporting another collection means adding a name here or in config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFields {
    names: Vec<String>,
}

impl CollectionFields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The single recognized field of `object` holding an array. Objects
    /// with zero or several such fields have no splittable collection.
    pub fn find_in(&self, object: &Map<String, Value>) -> Option<String> {
        let mut found = self
            .names
            .iter()
            .filter(|name| object.get(name.as_str()).is_some_and(Value::is_array));
        let field = found.next()?;
        if found.next().is_some() {
            return None;
        }
        Some(field.clone())
    }
}

impl Default for CollectionFields {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION_FIELDS.iter().copied())
    }
}

/// Where one chunk of a split document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Logical path of the whole document.
    pub base_path: String,
    pub stem: String,
    pub chunk_index: usize,
    pub physical_path: String,
}

/// One physical blob produced by [`ChunkCodec::split`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub physical_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub body: Value,
}

fn path_prefix(base: &str) -> &str {
    base.strip_suffix(DOCUMENT_SUFFIX).unwrap_or(base)
}

/// `dir/stem.json` -> `dir/stem.{index}.json`
pub fn physical_path(base: &str, index: usize) -> String {
    format!("{}.{}{}", path_prefix(base), index, DOCUMENT_SUFFIX)
}

/// Inverse of [`physical_path`]: recognizes `dir/stem.{index}.json`.
pub fn parse_chunk_path(path: &str) -> Option<ChunkDescriptor> {
    let without_suffix = path.strip_suffix(DOCUMENT_SUFFIX)?;
    let (prefix, index) = without_suffix.rsplit_once('.')?;
    if index.is_empty() || !index.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let stem = prefix.rsplit('/').next().unwrap_or(prefix);
    if stem.is_empty() {
        return None;
    }

    let chunk_index = index.parse().ok()?;
    Some(ChunkDescriptor {
        base_path: format!("{}{}", prefix, DOCUMENT_SUFFIX),
        stem: stem.to_string(),
        chunk_index,
        physical_path: path.to_string(),
    })
}

/// Removes the storage markers a chunk carries.
pub fn strip_chunk_markers(mut value: Value) -> Value {
    if let Value::Object(object) = &mut value {
        object.remove(CHUNK_INDEX_FIELD);
        object.remove(TOTAL_CHUNKS_FIELD);
    }
    value
}

/// Splits oversized documents into chunk payloads and merges them back.
#[derive(Debug, Clone)]
pub struct ChunkCodec {
    max_blob_bytes: usize,
    collection_fields: CollectionFields,
}

impl ChunkCodec {
    pub fn new(max_blob_bytes: usize, collection_fields: CollectionFields) -> Self {
        Self {
            max_blob_bytes,
            collection_fields,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config.max_blob_bytes,
            CollectionFields::new(config.collection_fields.iter().cloned()),
        )
    }

    pub fn max_blob_bytes(&self) -> usize {
        self.max_blob_bytes
    }

    pub fn collection_fields(&self) -> &CollectionFields {
        &self.collection_fields
    }

    /// Persisted form of a document: UTF-8 JSON with 2-space indentation.
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(value)?)
    }

    pub fn should_split(&self, value: &Value) -> Result<bool> {
        Ok(self.serialize(value)?.len() > self.max_blob_bytes)
    }

    /// How many collection elements fit in one chunk given the size of a
    /// representative element.
    pub fn items_per_chunk(&self, element_bytes: usize) -> usize {
        let budget = self.max_blob_bytes * MARGIN_DENOMINATOR;
        let weighted = element_bytes.max(1) * MARGIN_NUMERATOR;
        (budget / weighted).max(1)
    }

    /// Splits `value` into chunk payloads addressed from `base_path`.
    /// Returns `None` when the document has no recognized collection field;
    /// such documents are stored whole regardless of size.
    pub fn split(&self, value: &Value, base_path: &str) -> Result<Option<Vec<ChunkPayload>>> {
        let Value::Object(object) = value else {
            return Ok(None);
        };
        let Some(field) = self.collection_fields.find_in(object) else {
            return Ok(None);
        };
        let elements = match object.get(&field) {
            Some(Value::Array(elements)) => elements,
            _ => return Ok(None),
        };

        let element_bytes = match elements.first() {
            Some(first) => serde_json::to_vec(first)?.len(),
            None => EMPTY_ELEMENT_ESTIMATE,
        };
        let per_chunk = self.items_per_chunk(element_bytes);
        let total_chunks = elements.len().div_ceil(per_chunk).max(1);

        let mut shared = object.clone();
        shared.remove(&field);
        shared.remove(CHUNK_INDEX_FIELD);
        shared.remove(TOTAL_CHUNKS_FIELD);

        let slices: Vec<&[Value]> = if elements.is_empty() {
            vec![&elements[..]]
        } else {
            elements.chunks(per_chunk).collect()
        };

        let chunks = slices
            .into_iter()
            .enumerate()
            .map(|(chunk_index, slice)| {
                let mut body = shared.clone();
                body.insert(field.clone(), Value::Array(slice.to_vec()));
                body.insert(CHUNK_INDEX_FIELD.to_string(), Value::from(chunk_index));
                body.insert(TOTAL_CHUNKS_FIELD.to_string(), Value::from(total_chunks));
                ChunkPayload {
                    physical_path: physical_path(base_path, chunk_index),
                    chunk_index,
                    total_chunks,
                    body: Value::Object(body),
                }
            })
            .collect();

        tracing::debug!(
            "split {} into {} chunks of up to {} {} (element ~{} bytes)",
            base_path,
            total_chunks,
            per_chunk,
            field,
            element_bytes
        );
        Ok(Some(chunks))
    }

    /// Reassembles a document from `(chunk_index, body)` pairs.
    pub fn merge(&self, mut chunks: Vec<(usize, Value)>) -> Value {
        chunks.sort_by_key(|(index, _)| *index);
        let mut chunks = chunks.into_iter().map(|(_, body)| strip_chunk_markers(body));

        let Some(first) = chunks.next() else {
            return Value::Object(Map::new());
        };
        let Value::Object(mut merged) = first else {
            return first;
        };
        let Some(field) = self.collection_fields.find_in(&merged) else {
            return Value::Object(merged);
        };

        let mut elements = match merged.remove(&field) {
            Some(Value::Array(elements)) => elements,
            _ => Vec::new(),
        };
        for chunk in chunks {
            match chunk {
                Value::Object(mut object) => match object.remove(&field) {
                    Some(Value::Array(slice)) => elements.extend(slice),
                    _ => tracing::warn!("chunk without a '{}' array skipped during merge", field),
                },
                _ => tracing::warn!("non-object chunk skipped during merge"),
            }
        }

        merged.insert(field, Value::Array(elements));
        Value::Object(merged)
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOB_BYTES, CollectionFields::default())
    }
}
