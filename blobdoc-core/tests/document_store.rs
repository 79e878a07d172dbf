use async_trait::async_trait;
use blobdoc_core::operations::{DeleteDocumentOperationOutcome, DocumentLayout};
use blobdoc_core::{
    BlobApi, BlobRecord, ChunkCodec, CollectionFields, DeleteOutcome, DirEntry, DocError,
    DocumentCache, DocumentStore, EntryKind, InMemoryBlobApi, Result, RetryPolicy, StoreConfig,
    VersionToken, physical_path,
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Wraps the in-memory store and injects conflicts or failures on puts.
#[derive(Default)]
struct FaultyBlobApi {
    inner: InMemoryBlobApi,
    conflicts: Mutex<HashMap<String, u32>>,
    failing: Mutex<HashSet<String>>,
    races: Mutex<HashMap<String, Bytes>>,
    puts: AtomicUsize,
}

impl FaultyBlobApi {
    fn conflict_on(&self, path: &str, times: u32) {
        self.conflicts.lock().unwrap().insert(path.to_string(), times);
    }

    fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Lets an outside writer replace `path` right before the next put to
    /// it lands, so that put carries a stale version.
    fn race_on(&self, path: &str, content: &'static str) {
        self.races
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::from(content));
    }

    fn heal(&self) {
        self.conflicts.lock().unwrap().clear();
        self.failing.lock().unwrap().clear();
    }

    fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobApi for FaultyBlobApi {
    async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>> {
        self.inner.get_blob(path).await
    }

    async fn put_blob(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(path) {
            return Err(DocError::transport("connection reset"));
        }
        {
            let mut conflicts = self.conflicts.lock().unwrap();
            if let Some(remaining) = conflicts.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DocError::VersionMismatch {
                        path: path.to_string(),
                    });
                }
            }
        }
        let race = self.races.lock().unwrap().remove(path);
        if let Some(external) = race {
            self.inner.insert_raw(path, external).await;
        }
        self.inner.put_blob(path, content, message, expected).await
    }

    async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome> {
        self.inner.delete_blob(path, message, expected).await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }
}

/// Holds the first `get_blob` after `arm` until the test releases it.
#[derive(Default)]
struct GatedBlobApi {
    inner: InMemoryBlobApi,
    armed: AtomicUsize,
    loaded: Notify,
    release: Notify,
}

impl GatedBlobApi {
    fn arm(&self) {
        self.armed.store(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobApi for GatedBlobApi {
    async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>> {
        let record = self.inner.get_blob(path).await;
        if self.armed.swap(0, Ordering::SeqCst) == 1 {
            self.loaded.notify_one();
            self.release.notified().await;
        }
        record
    }

    async fn put_blob(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        self.inner.put_blob(path, content, message, expected).await
    }

    async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome> {
        self.inner.delete_blob(path, message, expected).await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }
}

fn small_store(api: Arc<FaultyBlobApi>) -> DocumentStore {
    DocumentStore::with_parts(
        api,
        ChunkCodec::new(2_000, CollectionFields::default()),
        DocumentCache::new(Duration::from_secs(300)),
        RetryPolicy::default(),
    )
}

/// `count` users of roughly 100 bytes each.
fn roster(count: usize) -> Value {
    let users: Vec<Value> = (0..count)
        .map(|id| json!({"id": id, "name": format!("user-{:04}", id), "bio": "b".repeat(60)}))
        .collect();
    json!({"schema": 3, "owner": "ops", "users": users})
}

async fn blob_paths(api: &FaultyBlobApi) -> Vec<String> {
    api.inner.paths().await
}

#[tokio::test]
async fn test_small_document_round_trip() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    let document = json!({"users": [{"id": 1}], "title": "small"});

    let written = store
        .write("data/roster.json", document.clone(), "create roster")
        .await
        .unwrap();
    assert_eq!(written.layout, DocumentLayout::Unsplit);

    let read = store.read("data/roster.json").await.unwrap();
    assert_eq!(read.content, document);
    assert_eq!(read.version, written.version);
    assert!(read.exists());
    assert_eq!(blob_paths(&api).await, vec!["data/roster.json"]);

    let stored = api.inner.get_blob("data/roster.json").await.unwrap().unwrap();
    assert_eq!(stored.content, Bytes::from(serde_json::to_vec_pretty(&document).unwrap()));
}

#[tokio::test]
async fn test_update_existing_document() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());

    store.write_document("a.json", json!({"n": 1}), "v1").await.unwrap();
    store.write_document("a.json", json!({"n": 2}), "v2").await.unwrap();

    let (content, version) = store.read_document("a.json").await.unwrap();
    assert_eq!(content, json!({"n": 2}));
    assert!(!version.is_empty());
}

#[tokio::test]
async fn test_large_document_is_split_and_merged() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    let document = roster(100);

    let written = store.write("data/roster.json", document.clone(), "bulk import").await.unwrap();
    let DocumentLayout::Split { chunks } = written.layout else {
        panic!("expected a split layout, got {:?}", written.layout);
    };
    assert!(chunks > 1);

    let paths = blob_paths(&api).await;
    assert_eq!(paths.len(), chunks);
    assert!(!paths.contains(&"data/roster.json".to_string()));
    for index in 0..chunks {
        assert!(paths.contains(&physical_path("data/roster.json", index)));
    }

    let read = store.read("data/roster.json").await.unwrap();
    assert_eq!(read.content, document);
    assert!(read.content.get("chunkIndex").is_none());
    assert!(read.content.get("totalChunks").is_none());

    let chunk_zero = api
        .inner
        .get_blob("data/roster.0.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.version, chunk_zero.version);
    assert_eq!(written.version, chunk_zero.version);
}

#[tokio::test]
async fn test_five_thousand_items_with_default_ceiling() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = DocumentStore::new(api.clone(), &StoreConfig::default());

    let items: Vec<Value> = (0..5000)
        .map(|id| {
            let skeleton = serde_json::to_vec(&json!({"id": id, "pad": ""})).unwrap().len();
            json!({"id": id, "pad": "x".repeat(1000 - skeleton)})
        })
        .collect();
    let document = json!({"kind": "catalog", "items": items});

    let written = store.write("catalog.json", document.clone(), "import").await.unwrap();
    assert_eq!(written.layout, DocumentLayout::Split { chunks: 8 });

    let read = store.read("catalog.json").await.unwrap();
    let merged = read.content["items"].as_array().unwrap();
    assert_eq!(merged.len(), 5000);
    assert!(merged
        .iter()
        .enumerate()
        .all(|(position, item)| item["id"] == json!(position)));
    assert_eq!(read.content, document);
}

#[tokio::test]
async fn test_growing_document_removes_unsplit_blob() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());

    store.write_document("roster.json", roster(2), "seed").await.unwrap();
    assert_eq!(blob_paths(&api).await, vec!["roster.json"]);

    let written = store.write("roster.json", roster(100), "grow").await.unwrap();
    assert_eq!(written.cleaned_up, 1);
    assert!(!api.inner.contains("roster.json").await);
    assert_eq!(store.read("roster.json").await.unwrap().content, roster(100));
}

#[tokio::test]
async fn test_shrinking_document_leaves_single_blob() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());

    store.write_document("roster.json", roster(100), "grow").await.unwrap();
    assert!(blob_paths(&api).await.len() > 1);

    let written = store.write("roster.json", roster(3), "shrink").await.unwrap();
    assert_eq!(written.layout, DocumentLayout::Unsplit);
    assert_eq!(blob_paths(&api).await, vec!["roster.json"]);
    assert_eq!(store.read("roster.json").await.unwrap().content, roster(3));
}

#[tokio::test]
async fn test_fewer_chunks_remove_stale_tail() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());

    let before = store.write("roster.json", roster(100), "grow").await.unwrap();
    let after = store.write("roster.json", roster(40), "trim").await.unwrap();

    let (DocumentLayout::Split { chunks: old }, DocumentLayout::Split { chunks: new }) =
        (before.layout, after.layout)
    else {
        panic!("both writes should split");
    };
    assert!(new < old);
    assert_eq!(after.cleaned_up, old - new);
    assert_eq!(blob_paths(&api).await.len(), new);
    assert_eq!(store.read("roster.json").await.unwrap().content, roster(40));
}

#[tokio::test]
async fn test_oversized_document_without_collection_is_written_whole() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    let document = json!({"notes": "n".repeat(5_000)});

    let written = store.write("notes.json", document.clone(), "big").await.unwrap();
    assert_eq!(written.layout, DocumentLayout::Unsplit);
    assert_eq!(blob_paths(&api).await, vec!["notes.json"]);
    assert_eq!(store.read("notes.json").await.unwrap().content, document);
}

#[tokio::test]
async fn test_missing_document_reads_as_empty() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api);

    let read = store.read("nowhere.json").await.unwrap();
    assert_eq!(read.content, json!({}));
    assert!(read.version.is_empty());
    assert!(!read.exists());
}

#[tokio::test]
async fn test_malformed_blob_is_surfaced() {
    let api = Arc::new(FaultyBlobApi::default());
    api.inner.insert_raw("broken.json", "{not json").await;
    let store = small_store(api);

    let result = store.read("broken.json").await;
    assert!(matches!(result, Err(DocError::Malformed { path, .. }) if path == "broken.json"));
}

#[tokio::test]
async fn test_reading_a_chunk_path_reads_the_whole_document() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api);
    store.write_document("roster.json", roster(100), "grow").await.unwrap();

    let read = store.read("roster.2.json").await.unwrap();
    assert_eq!(read.path, "roster.json");
    assert_eq!(read.content, roster(100));
}

#[tokio::test]
async fn test_writing_a_chunk_path_is_rejected() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());

    let result = store.write("roster.1.json", json!({}), "oops").await;
    assert!(matches!(result, Err(DocError::InvalidRequest(_))));
    assert!(blob_paths(&api).await.is_empty());
}

#[tokio::test]
async fn test_stale_chunks_past_declared_total_are_ignored() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    api.inner
        .insert_raw("list.0.json", r#"{"tag": "a", "items": [1, 2], "chunkIndex": 0, "totalChunks": 2}"#)
        .await;
    api.inner
        .insert_raw("list.1.json", r#"{"tag": "a", "items": [3], "chunkIndex": 1, "totalChunks": 2}"#)
        .await;
    api.inner
        .insert_raw("list.2.json", r#"{"tag": "old", "items": [99], "chunkIndex": 2, "totalChunks": 3}"#)
        .await;

    let read = store.read("list.json").await.unwrap();
    assert_eq!(read.content, json!({"tag": "a", "items": [1, 2, 3]}));
}

#[tokio::test]
async fn test_absurd_declared_total_merges_present_chunks() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    api.inner
        .insert_raw(
            "list.0.json",
            format!(r#"{{"items": [1], "chunkIndex": 0, "totalChunks": {}}}"#, u64::MAX),
        )
        .await;
    api.inner
        .insert_raw("list.1.json", r#"{"items": [2], "chunkIndex": 1, "totalChunks": 2}"#)
        .await;

    let read = store.read("list.json").await.unwrap();
    assert_eq!(read.content, json!({"items": [1, 2]}));
}

#[tokio::test]
async fn test_delete_missing_document_is_noop() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api);

    let outcome = store.delete("ghost.json", "cleanup").await.unwrap();
    assert_eq!(outcome, DeleteDocumentOperationOutcome::NotFound);
    store.delete_document("ghost.json", "again").await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_every_chunk() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    let written = store.write("roster.json", roster(100), "grow").await.unwrap();
    let DocumentLayout::Split { chunks } = written.layout else {
        panic!("expected split layout");
    };

    let outcome = store.delete("roster.json", "drop").await.unwrap();
    assert_eq!(outcome, DeleteDocumentOperationOutcome::Deleted { blobs: chunks });
    assert!(blob_paths(&api).await.is_empty());
    assert!(!store.read("roster.json").await.unwrap().exists());
}

#[tokio::test(start_paused = true)]
async fn test_single_conflict_is_retried() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    api.conflict_on("a.json", 1);

    store.write_document("a.json", json!({"n": 1}), "create").await.unwrap();
    assert_eq!(api.put_count(), 2);
    assert_eq!(store.read("a.json").await.unwrap().content, json!({"n": 1}));
}

#[tokio::test(start_paused = true)]
async fn test_conflict_retry_resolves_the_new_version() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    store.write_document("a.json", json!({"n": 1}), "create").await.unwrap();

    api.race_on("a.json", r#"{"n": "external"}"#);
    let written = store.write("a.json", json!({"n": 2}), "update").await.unwrap();
    assert_eq!(api.put_count(), 3);

    let stored = api.inner.get_blob("a.json").await.unwrap().unwrap();
    assert_eq!(stored.version, written.version);
    assert_eq!(
        serde_json::from_slice::<Value>(&stored.content).unwrap(),
        json!({"n": 2})
    );
}

#[tokio::test(start_paused = true)]
async fn test_conflict_on_one_chunk_still_completes_split_write() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    store.write_document("roster.json", roster(100), "seed").await.unwrap();
    let puts = api.put_count();

    api.conflict_on("roster.2.json", 1);
    api.race_on("roster.4.json", r#"{"users": []}"#);
    let written = store.write("roster.json", roster(101), "grow").await.unwrap();
    let DocumentLayout::Split { chunks } = written.layout else {
        panic!("expected split layout");
    };
    assert_eq!(api.put_count(), puts + chunks + 2);
    assert_eq!(store.read("roster.json").await.unwrap().content, roster(101));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_conflict_exhausts_budget() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    api.conflict_on("a.json", u32::MAX);

    let result = store.write("a.json", json!({"n": 1}), "create").await;
    assert!(matches!(
        result,
        Err(DocError::Conflict { ref path, attempts: 3 }) if path == "a.json"
    ));
    assert_eq!(api.put_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_partial_split_failure_is_aggregated_and_retry_safe() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    api.fail_on("roster.1.json");

    let result = store.write("roster.json", roster(100), "grow").await;
    let Err(DocError::PartialSplitFailure { path, total, failed }) = result else {
        panic!("expected a partial split failure");
    };
    assert_eq!(path, "roster.json");
    assert!(total > 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].chunk_index, 1);
    assert_eq!(failed[0].physical_path, "roster.1.json");

    api.heal();
    store.write_document("roster.json", roster(100), "grow").await.unwrap();
    assert_eq!(store.read("roster.json").await.unwrap().content, roster(100));
}

#[tokio::test(start_paused = true)]
async fn test_cache_serves_reads_within_ttl() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    store.write_document("a.json", json!({"n": 1}), "create").await.unwrap();

    let fetches = api.inner.fetch_count();
    store.read("a.json").await.unwrap();
    assert_eq!(api.inner.fetch_count(), fetches + 1);

    // External writer: not visible until the entry expires.
    let version = api.inner.get_blob("a.json").await.unwrap().unwrap().version;
    api.inner
        .put_blob("a.json", Bytes::from(r#"{"n": 2}"#), "external", Some(&version))
        .await
        .unwrap();
    let fetches = api.inner.fetch_count();

    tokio::time::advance(Duration::from_secs(299)).await;
    let cached = store.read("a.json").await.unwrap();
    assert_eq!(cached.content, json!({"n": 1}));
    assert_eq!(api.inner.fetch_count(), fetches);

    tokio::time::advance(Duration::from_secs(2)).await;
    let fresh = store.read("a.json").await.unwrap();
    assert_eq!(fresh.content, json!({"n": 2}));
    assert_eq!(api.inner.fetch_count(), fetches + 1);
}

#[tokio::test]
async fn test_write_and_invalidate_drop_cached_copy() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api.clone());
    store.write_document("a.json", json!({"n": 1}), "create").await.unwrap();
    store.read("a.json").await.unwrap();

    store.write_document("a.json", json!({"n": 2}), "update").await.unwrap();
    assert_eq!(store.read("a.json").await.unwrap().content, json!({"n": 2}));

    let fetches = api.inner.fetch_count();
    store.invalidate(None).await;
    store.read("a.json").await.unwrap();
    assert_eq!(api.inner.fetch_count(), fetches + 1);
}

#[tokio::test]
async fn test_list_directory_passthrough() {
    let api = Arc::new(FaultyBlobApi::default());
    let store = small_store(api);
    store.write_document("data/a.json", json!({}), "a").await.unwrap();
    store.write_document("data/nested/b.json", json!({}), "b").await.unwrap();

    let entries = store.list_directory("data").await.unwrap();
    assert_eq!(
        entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.kind))
            .collect::<Vec<_>>(),
        vec![("a.json", EntryKind::File), ("nested", EntryKind::Dir)]
    );
    assert!(store.list_directory("absent").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_racing_a_write_does_not_cache_old_content() {
    let api = Arc::new(GatedBlobApi::default());
    let store = DocumentStore::new(api.clone(), &StoreConfig::default());
    store.write_document("a.json", json!({"n": 1}), "create").await.unwrap();
    store.invalidate(None).await;

    api.arm();
    let reader = tokio::spawn({
        let store = store.clone();
        async move { store.read("a.json").await }
    });
    api.loaded.notified().await;

    store.write_document("a.json", json!({"n": 2}), "update").await.unwrap();
    api.release.notify_one();

    let raced = reader.await.unwrap().unwrap();
    assert_eq!(raced.content, json!({"n": 1}));
    assert_eq!(store.read("a.json").await.unwrap().content, json!({"n": 2}));
}
