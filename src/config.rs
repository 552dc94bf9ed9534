//! Explicit configuration records matching the enumerated options of spec §6.
//!
//! Loading these from a file, env vars, or a CLI is an external concern
//! (config loading is a non-goal of this crate) — callers construct these
//! records directly. Unknown options simply can't be expressed: every field
//! here is one spec names, nothing more.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RagError, RagResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
    Md5,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingSplitter {
    Recursive,
    Character,
}

impl Default for ChunkingSplitter {
    fn default() -> Self {
        ChunkingSplitter::Recursive
    }
}

impl ChunkingSplitter {
    /// Name under which the matching `Chunker` is registered in
    /// `ChunkerRegistry::with_defaults`.
    pub fn as_name(&self) -> &'static str {
        match self {
            ChunkingSplitter::Recursive => "recursive",
            ChunkingSplitter::Character => "character",
        }
    }
}

/// Where documents, versions, and chunks are durably stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local embedded database, identified by filesystem path.
    Embedded { path: PathBuf },
    /// Remote database, identified by connection URL.
    Remote { url: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Embedded { path: PathBuf::from("ragversion.db") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub store_content: bool,
    pub max_file_size_mb: u64,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig { store_content: true, max_file_size_mb: 50, hash_algorithm: HashAlgorithm::default() }
    }
}

impl TrackingConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub enabled: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub splitter: ChunkingSplitter,
    pub store_chunk_content: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            enabled: false,
            chunk_size: 500,
            chunk_overlap: 50,
            splitter: ChunkingSplitter::default(),
            store_chunk_content: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig { debounce_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { max_workers: 4 }
    }
}

/// Aggregate engine configuration. Validated once at construction time;
/// invalid combinations surface as [`RagError::Config`] rather than
/// panicking deep inside a track call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub tracking: TrackingConfig,
    pub chunking: ChunkingConfig,
    pub watcher: WatcherConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> RagResult<()> {
        if self.tracking.max_file_size_mb == 0 {
            return Err(RagError::Config("tracking.max_file_size_mb must be > 0".into()));
        }
        if self.chunking.enabled {
            if self.chunking.chunk_size == 0 {
                return Err(RagError::Config("chunking.chunk_size must be > 0".into()));
            }
            if self.chunking.chunk_overlap >= self.chunking.chunk_size {
                return Err(RagError::Config(
                    "chunking.chunk_overlap must be smaller than chunking.chunk_size".into(),
                ));
            }
        }
        if self.batch.max_workers == 0 {
            return Err(RagError::Config("batch.max_workers must be > 0".into()));
        }
        if let StorageConfig::Remote { url } = &self.storage {
            if url.is_empty() {
                return Err(RagError::Config("storage.url must not be empty".into()));
            }
        }
        Ok(())
    }
}
