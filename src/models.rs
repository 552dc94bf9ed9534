//! Core data model (spec §3): Document, Version, Chunk, and the transient
//! ChangeEvent/ChunkDiff values produced while tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type Metadata = HashMap<String, serde_json::Value>;

/// Version/event-level change classification (GLOSSARY).
///
/// `Deleted` never appears on a [`Version`] — untracking never produces a
/// version, it only flips [`Document::is_deleted`] and emits a `Deleted`
/// [`ChangeEvent`] referencing the document's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Restored,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Restored => "restored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ChangeType::Created),
            "modified" => Some(ChangeType::Modified),
            "deleted" => Some(ChangeType::Deleted),
            "restored" => Some(ChangeType::Restored),
            _ => None,
        }
    }
}

/// The decision output of the document-level change detector (spec §4.5).
/// A strict subset of occasions that result in a new [`Version`]: everything
/// except `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedChange {
    Created,
    Modified,
    Unchanged,
    Restored,
}

impl DetectedChange {
    /// Maps this decision to the [`ChangeType`] recorded on the new version.
    /// `None` for `Unchanged`, which never produces a version.
    pub fn to_change_type(self) -> Option<ChangeType> {
        match self {
            DetectedChange::Created => Some(ChangeType::Created),
            DetectedChange::Modified => Some(ChangeType::Modified),
            DetectedChange::Restored => Some(ChangeType::Restored),
            DetectedChange::Unchanged => None,
        }
    }
}

/// One per distinct tracked path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub content_hash: String,
    pub current_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub metadata: Metadata,
}

/// Immutable record of one accepted state of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i64,
    pub content_hash: String,
    pub file_hash: String,
    pub file_size: i64,
    pub change_type: ChangeType,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// One per chunk of one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub chunk_index: i32,
    pub content_hash: String,
    pub token_count: i32,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Lightweight chunk identity used by the chunk change detector: either
/// produced fresh by a [`crate::chunker::Chunker`] or reconstructed from
/// persisted [`Chunk`] rows (spec §4.7.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub content_hash: String,
    pub chunk_index: i32,
}

impl From<&Chunk> for ChunkSummary {
    fn from(c: &Chunk) -> Self {
        ChunkSummary { content_hash: c.content_hash.clone(), chunk_index: c.chunk_index }
    }
}

/// A chunk whose hash survived between versions but at a different index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderedChunk {
    pub content_hash: String,
    pub from_index: i32,
    pub to_index: i32,
}

/// Partition of two ordered chunk sequences (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDiff {
    pub document_id: Uuid,
    pub from_version: i64,
    pub to_version: i64,
    pub added: Vec<ChunkSummary>,
    pub removed: Vec<ChunkSummary>,
    pub unchanged: Vec<ChunkSummary>,
    pub reordered: Vec<ReorderedChunk>,
}

impl ChunkDiff {
    /// Fraction of the new chunk set that didn't need re-embedding.
    pub fn savings_percentage(&self) -> f64 {
        let new_total = self.added.len() + self.unchanged.len() + self.reordered.len();
        let retained = self.unchanged.len() + self.reordered.len();
        retained as f64 / new_total.max(1) as f64
    }
}

/// Transient value emitted to the event bus after a version commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub change_type: ChangeType,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub content_hash: String,
    pub previous_hash: Option<String>,
    pub version_number: i64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Result of a single `track`/`track_with_chunks` call (spec §4.7.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResult {
    pub changed: bool,
    pub change_type: DetectedChange,
    pub document_id: Uuid,
    pub version_id: Option<Uuid>,
    pub version_number: i64,
    pub content_hash: String,
    pub previous_hash: Option<String>,
    pub chunk_diff: Option<ChunkDiff>,
}

/// A textual diff between two versions' stored content (spec §4.7.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub similarity: f64,
    pub unified_diff: String,
}

/// One path's failure inside a `track_directory` run (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTrack {
    pub path: String,
    pub error_kind: String,
    pub message: String,
}

/// Result of a `BatchTracker::track_directory` call (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub successful: Vec<TrackResult>,
    pub failed: Vec<FailedTrack>,
    pub total_files: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
