//! End-to-end scenarios against the public `VersionTracker` API, backed by
//! an on-disk SQLite database per test.

use std::sync::Arc;

use ragversion::config::{BatchConfig, ChunkingConfig, EngineConfig, StorageConfig, TrackingConfig, WatcherConfig};
use ragversion::events::EventBus;
use ragversion::models::{ChangeType, DetectedChange, Metadata};
use ragversion::storage::sqlite::SqliteStorage;
use ragversion::storage::{DocumentFilter, ListOrder, PreparedChunk, Storage, VersionWrite};
use ragversion::{default_chunkers, BatchTracker, VersionTracker};

async fn new_tracker(db_path: &std::path::Path, chunking: ChunkingConfig) -> VersionTracker {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(db_path).await.unwrap());
    let config = EngineConfig {
        storage: StorageConfig::Embedded { path: db_path.to_path_buf() },
        tracking: TrackingConfig { store_content: true, max_file_size_mb: 50, ..TrackingConfig::default() },
        chunking,
        watcher: WatcherConfig::default(),
        batch: BatchConfig::default(),
    };
    VersionTracker::new(storage, config, ragversion::parser::ParserRegistry::new(), default_chunkers(), Arc::new(EventBus::new()))
        .unwrap()
}

/// S1: tracking a brand-new file creates version 1; tracking it again
/// unchanged is a no-op that reports `Unchanged`.
#[tokio::test]
async fn create_then_track_unchanged_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "hello world").await.unwrap();

    let tracker = new_tracker(&db, ChunkingConfig::default()).await;

    let first = tracker.track(&file, None).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.change_type, DetectedChange::Created);
    assert_eq!(first.version_number, 1);

    let second = tracker.track(&file, None).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.change_type, DetectedChange::Unchanged);
    assert_eq!(second.version_number, 1);
}

/// S2: overwriting tracked content with chunking enabled produces version 2
/// and a chunk diff distinguishing retained from new chunks.
#[tokio::test]
async fn overwrite_with_chunking_enabled_produces_chunk_diff() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "alpha\n\nbeta\n\ngamma\n").await.unwrap();

    let chunking = ChunkingConfig { enabled: true, chunk_size: 20, chunk_overlap: 0, ..ChunkingConfig::default() };
    let tracker = new_tracker(&db, chunking).await;

    tracker.track_with_chunks(&file, None).await.unwrap();

    tokio::fs::write(&file, "alpha\n\nbeta\n\ndelta\n").await.unwrap();
    let second = tracker.track_with_chunks(&file, None).await.unwrap();

    assert!(second.changed);
    assert_eq!(second.change_type, DetectedChange::Modified);
    let diff = second.chunk_diff.expect("chunking enabled implies a chunk diff");
    assert!(!diff.unchanged.is_empty(), "alpha/beta chunks should be retained");
    assert!(!diff.added.is_empty(), "delta chunk should be new");
}

/// S4: untracking soft-deletes the document; restoring a prior version
/// clears the deleted flag and produces a new Restored version.
#[tokio::test]
async fn untrack_then_restore_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "v1 content").await.unwrap();

    let tracker = new_tracker(&db, ChunkingConfig::default()).await;
    let created = tracker.track(&file, None).await.unwrap();

    tracker.untrack(created.document_id, false).await.unwrap();

    let restored = tracker.restore(created.document_id, created.version_number).await.unwrap();
    assert_eq!(restored.change_type, DetectedChange::Restored);
    assert_eq!(restored.content_hash, created.content_hash);
}

/// S5: a batch run over a directory with one oversized file reports that
/// file as a failure without aborting the rest of the run.
#[tokio::test]
async fn batch_tracks_directory_and_reports_oversized_failure() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    tokio::fs::write(dir.path().join("small.txt"), "fits fine").await.unwrap();
    tokio::fs::write(dir.path().join("big.txt"), vec![b'x'; 2 * 1024 * 1024]).await.unwrap();

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(&db).await.unwrap());
    let config = EngineConfig {
        storage: StorageConfig::Embedded { path: db.clone() },
        tracking: TrackingConfig { max_file_size_mb: 1, ..TrackingConfig::default() },
        chunking: ChunkingConfig::default(),
        watcher: WatcherConfig::default(),
        batch: BatchConfig::default(),
    };
    let tracker = Arc::new(
        VersionTracker::new(storage, config, ragversion::parser::ParserRegistry::new(), default_chunkers(), Arc::new(EventBus::new()))
            .unwrap(),
    );
    let batch = BatchTracker::new(tracker);

    let result = batch.track_directory(dir.path(), &[], &[], false, 2).await.unwrap();

    assert_eq!(result.total_files, 2);
    assert_eq!(result.successful.len(), 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].error_kind, "FileTooLarge");
}

/// S3 (document-level companion): re-tracking after only whitespace/line
/// ending changes that normalize away is reported as Unchanged, not Modified.
#[tokio::test]
async fn content_normalizing_edit_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "line one\r\nline two\r\n").await.unwrap();

    let tracker = new_tracker(&db, ChunkingConfig::default()).await;
    tracker.track(&file, None).await.unwrap();

    tokio::fs::write(&file, "line one\nline two\n").await.unwrap();
    let second = tracker.track(&file, None).await.unwrap();

    assert_eq!(second.change_type, DetectedChange::Unchanged);
}

/// Spec §5/§8 property #10: concurrent `track` calls against the same path
/// must serialize through the per-path lock, producing exactly one document
/// and exactly one version rather than a race of duplicate creates.
#[tokio::test]
async fn concurrent_tracks_on_the_same_path_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "shared content").await.unwrap();

    let tracker = Arc::new(new_tracker(&db, ChunkingConfig::default()).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let tracker = tracker.clone();
        let file = file.clone();
        handles.push(tokio::spawn(async move { tracker.track(&file, None).await.unwrap() }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let document_ids: std::collections::HashSet<_> = results.iter().map(|r| r.document_id).collect();
    assert_eq!(document_ids.len(), 1, "one file must map to exactly one document under concurrent access");

    let created_count = results.iter().filter(|r| r.change_type == DetectedChange::Created).count();
    assert_eq!(created_count, 1, "exactly one of the racing calls should observe the Created transition");

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(&db).await.unwrap());
    let document_id = results[0].document_id;
    assert_eq!(storage.count_versions(document_id).await.unwrap(), 1, "racing tracks of unchanged content must not multiply versions");
}

/// Spec §4.4 atomicity: a commit that fails partway (here, a duplicate
/// `chunk_index` within one version violating the `(version_id,
/// chunk_index)` uniqueness constraint) must leave no partial document,
/// version, or chunk rows behind.
#[tokio::test]
async fn failed_commit_rolls_back_the_whole_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let storage = SqliteStorage::connect(&db).await.unwrap();

    let write = VersionWrite {
        existing_document_id: None,
        file_path: dir.path().join("doc.txt").to_string_lossy().to_string(),
        file_name: "doc.txt".to_string(),
        file_type: "txt".to_string(),
        metadata: Metadata::default(),
        content_hash: "content-hash".to_string(),
        file_hash: "file-hash".to_string(),
        file_size: 11,
        change_type: ChangeType::Created,
        chunks: vec![
            PreparedChunk { chunk_index: 0, content_hash: "a".to_string(), token_count: 1, content: None, metadata: Metadata::default() },
            // Duplicate chunk_index within the same version: violates the
            // unique (version_id, chunk_index) index and must abort the
            // whole transaction, not just this row.
            PreparedChunk { chunk_index: 0, content_hash: "b".to_string(), token_count: 1, content: None, metadata: Metadata::default() },
        ],
        content_snapshot: None,
        clear_deleted: false,
    };

    assert!(storage.commit_version(write).await.is_err());

    let remaining = storage.list_documents(DocumentFilter::default(), ListOrder::default(), 100, 0).await.unwrap();
    assert!(remaining.is_empty(), "a failed commit must not leave a partially-written document behind");
}

#[tokio::test]
async fn change_type_round_trips_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let storage = SqliteStorage::connect(&db).await.unwrap();

    let file = dir.path().join("doc.txt");
    tokio::fs::write(&file, "content").await.unwrap();
    let tracker = new_tracker(&db, ChunkingConfig::default()).await;
    let result = tracker.track(&file, None).await.unwrap();

    let version = storage.get_latest_version(result.document_id).await.unwrap().expect("version exists");
    assert_eq!(version.change_type, ChangeType::Created);
}
