//! Framework-agnostic document version tracking engine.
//!
//! Wires together content hashing, parsing, chunking, change detection,
//! storage, and event dispatch behind a single [`VersionTracker`]. Pick a
//! [`storage::Storage`] backend, build an [`EngineConfig`], and track paths.

pub mod batch;
pub mod change_detector;
pub mod chunk_diff;
pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod models;
pub mod notifier;
pub mod parser;
pub mod storage;
pub mod tracker;
pub mod watcher;

pub use batch::BatchTracker;
pub use config::{
    BatchConfig, ChunkingConfig, ChunkingSplitter, EngineConfig, HashAlgorithm, StorageConfig, TrackingConfig,
    WatcherConfig,
};
pub use error::{RagError, RagResult, StorageErrorKind};
pub use events::{EventBus, EventClass, Sink};
pub use models::{
    BatchResult, ChangeEvent, ChangeType, Chunk, ChunkDiff, ChunkSummary, DetectedChange, Document, FailedTrack,
    Metadata, ReorderedChunk, TextDiff, TrackResult, Version,
};
pub use notifier::{LoggingNotifier, Notifier, NotifierConfig, NotifierSink};
pub use storage::Storage;
pub use tracker::VersionTracker;
pub use watcher::Watcher;

use std::sync::Arc;

use chunker::{CharacterChunker, ChunkerRegistry, RecursiveChunker};
use parser::ParserRegistry;
use storage::postgres::PostgresStorage;
use storage::sqlite::SqliteStorage;

/// Builds the default chunker set (spec §4.7.6): recursive and fixed-width
/// character splitting, registered under the names [`ChunkingSplitter::as_name`]
/// expects to resolve.
pub fn default_chunkers() -> ChunkerRegistry {
    let mut registry = ChunkerRegistry::new();
    registry.register(Arc::new(RecursiveChunker));
    registry.register(Arc::new(CharacterChunker));
    registry
}

/// Builds a [`VersionTracker`] from an [`EngineConfig`], opening whichever
/// storage backend `config.storage` names and wiring in the default parser
/// and chunker registries plus a fresh [`EventBus`].
pub async fn open(config: EngineConfig) -> RagResult<VersionTracker> {
    let storage: Arc<dyn Storage> = match &config.storage {
        StorageConfig::Embedded { path } => Arc::new(SqliteStorage::connect(path).await?),
        StorageConfig::Remote { url } => Arc::new(PostgresStorage::connect(url).await?),
    };

    let parsers = ParserRegistry::new();
    let chunkers = default_chunkers();
    let event_bus = Arc::new(EventBus::new());

    VersionTracker::new(storage, config, parsers, chunkers, event_bus)
}
