//! Version Tracker (spec §4.7): the per-path orchestrator tying the hasher,
//! parser registry, chunker registry, change detectors, storage, and event
//! bus together into the `track` operation.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::change_detector::detect_document_change;
use crate::chunk_diff::diff_chunks;
use crate::chunker::ChunkerRegistry;
use crate::config::EngineConfig;
use crate::error::{RagError, RagResult, StorageErrorKind};
use crate::events::EventBus;
use crate::hash::Hasher;
use crate::models::{ChangeEvent, ChangeType, ChunkDiff, ChunkSummary, DetectedChange, Metadata, TextDiff, TrackResult};
use crate::parser::ParserRegistry;
use crate::storage::{PreparedChunk, Storage, VersionWrite};

/// Scoped orchestrator. Holds a storage handle for its lifetime; dropping
/// it (or calling [`VersionTracker::close`]) releases that handle — an
/// `Arc<dyn Storage>` needs no explicit teardown beyond the last reference
/// going away, so `close` is a documented no-op kept for symmetry with the
/// other scoped resources in this crate ([`crate::watcher::Watcher`]).
pub struct VersionTracker {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
    parsers: ParserRegistry,
    chunkers: ChunkerRegistry,
    event_bus: Arc<EventBus>,
    hasher: Hasher,
    path_locks: DashMap<PathBuf, Arc<AsyncMutex<()>>>,
}

impl VersionTracker {
    pub fn new(
        storage: Arc<dyn Storage>,
        config: EngineConfig,
        parsers: ParserRegistry,
        chunkers: ChunkerRegistry,
        event_bus: Arc<EventBus>,
    ) -> RagResult<Self> {
        config.validate()?;
        let hasher = Hasher::new(config.tracking.hash_algorithm);
        Ok(VersionTracker { storage, config, parsers, chunkers, event_bus, hasher, path_locks: DashMap::new() })
    }

    pub fn close(self) {
        // Intentional no-op; see struct docs.
    }

    fn path_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        self.path_locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    #[tracing::instrument(skip(self, metadata), fields(path = %path.as_ref().display()))]
    pub async fn track(&self, path: impl AsRef<Path>, metadata: Option<Metadata>) -> RagResult<TrackResult> {
        self.track_internal(path.as_ref(), metadata, self.config.chunking.enabled).await
    }

    #[tracing::instrument(skip(self, metadata), fields(path = %path.as_ref().display()))]
    pub async fn track_with_chunks(&self, path: impl AsRef<Path>, metadata: Option<Metadata>) -> RagResult<TrackResult> {
        self.track_internal(path.as_ref(), metadata, true).await
    }

    /// Resolves `path` to an absolute, canonical form (spec §4.7.1 step a)
    /// before anything else touches it: the same file reached through two
    /// relative routes (or a relative vs. an absolute reference) must map
    /// to one `Document` and acquire one per-path lock. Falls back to
    /// joining against the current directory when the path doesn't exist
    /// yet (e.g. a watcher-driven delete event) and can't be canonicalized.
    async fn resolve_path(&self, path: &Path) -> RagResult<PathBuf> {
        match tokio::fs::canonicalize(path).await {
            Ok(resolved) => Ok(resolved),
            Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
            Err(_) => Ok(std::env::current_dir()?.join(path)),
        }
    }

    async fn track_internal(&self, path: &Path, metadata: Option<Metadata>, with_chunks: bool) -> RagResult<TrackResult> {
        let path = self.resolve_path(path).await?;
        let path = path.as_path();
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let file_path = path.to_string_lossy().to_string();
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        let meta = tokio::fs::metadata(path).await?;
        let max_bytes = self.config.tracking.max_file_size_bytes();
        if meta.len() > max_bytes {
            return Err(RagError::FileTooLarge { path: path.to_path_buf(), size: meta.len(), max: max_bytes });
        }

        let (file_hash, file_size) = self.hasher.hash_file(path).await?;
        let prior = self.storage.get_document_by_path(&file_path).await?;

        if let Some(doc) = &prior {
            if !doc.is_deleted {
                if let Some(latest) = self.storage.get_latest_version(doc.id).await? {
                    if latest.file_hash == file_hash && doc.file_size == file_size as i64 {
                        return Ok(TrackResult {
                            changed: false,
                            change_type: DetectedChange::Unchanged,
                            document_id: doc.id,
                            version_id: None,
                            version_number: doc.current_version,
                            content_hash: doc.content_hash.clone(),
                            previous_hash: Some(doc.content_hash.clone()),
                            chunk_diff: None,
                        });
                    }
                }
            }
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let bytes = tokio::fs::read(path).await?;
        let parsed = self.parsers.parse_file(path, &bytes).await?;
        let content_hash = self.hasher.hash_text(&parsed.text);

        let detected = detect_document_change(prior.as_ref(), &content_hash);

        if detected == DetectedChange::Unchanged {
            let doc = prior.expect("Unchanged implies a prior document");
            let mut merged = doc.metadata.clone();
            if let Some(m) = metadata {
                merged.extend(m);
            }
            self.storage.touch_document_metadata(doc.id, merged, chrono::Utc::now()).await?;
            return Ok(TrackResult {
                changed: false,
                change_type: DetectedChange::Unchanged,
                document_id: doc.id,
                version_id: None,
                version_number: doc.current_version,
                content_hash: doc.content_hash.clone(),
                previous_hash: Some(doc.content_hash),
                chunk_diff: None,
            });
        }

        let change_type = detected.to_change_type().expect("non-Unchanged always maps to a ChangeType");

        let mut prepared_chunks = Vec::new();
        let mut chunk_diff_result: Option<ChunkDiff> = None;

        if with_chunks && self.config.chunking.enabled {
            let chunker = self
                .chunkers
                .resolve(self.config.chunking.splitter.as_name())
                .ok_or_else(|| RagError::Config(format!("no chunker registered for {:?}", self.config.chunking.splitter)))?;
            let pieces = chunker.chunk(&parsed.text, &self.config.chunking);

            let prior_summaries: Vec<ChunkSummary> = match &prior {
                Some(doc) => match self.storage.get_latest_version(doc.id).await? {
                    Some(v) => self.storage.get_chunks_by_version(v.id).await?.iter().map(ChunkSummary::from).collect(),
                    None => Vec::new(),
                },
                None => Vec::new(),
            };

            let hashes: Vec<String> = pieces.iter().map(|p| self.hasher.hash_text(&p.text)).collect();
            let new_summaries: Vec<ChunkSummary> = pieces
                .iter()
                .zip(&hashes)
                .map(|(p, h)| ChunkSummary { content_hash: h.clone(), chunk_index: p.chunk_index })
                .collect();

            let from_version = prior.as_ref().map(|d| d.current_version).unwrap_or(0);
            let diff = diff_chunks(prior.as_ref().map(|d| d.id).unwrap_or_default(), from_version, from_version + 1, &prior_summaries, &new_summaries);
            chunk_diff_result = Some(diff);

            for (piece, content_hash) in pieces.into_iter().zip(hashes) {
                prepared_chunks.push(PreparedChunk {
                    chunk_index: piece.chunk_index,
                    content_hash,
                    token_count: piece.token_count,
                    content: if self.config.chunking.store_chunk_content { Some(piece.text) } else { None },
                    metadata: Metadata::new(),
                });
            }
        }

        let write = VersionWrite {
            existing_document_id: prior.as_ref().map(|d| d.id),
            file_path: file_path.clone(),
            file_name,
            file_type: ext,
            metadata: metadata.unwrap_or_default(),
            content_hash: content_hash.clone(),
            file_hash,
            file_size: file_size as i64,
            change_type,
            chunks: prepared_chunks,
            content_snapshot: if self.config.tracking.store_content { Some(parsed.text.clone()) } else { None },
            clear_deleted: matches!(detected, DetectedChange::Restored),
        };

        let result = self.commit_with_retry(write).await?;

        let event = ChangeEvent {
            document_id: result.document.id,
            version_id: result.version.id,
            change_type,
            file_path: result.document.file_path.clone(),
            file_name: result.document.file_name.clone(),
            file_size: result.document.file_size,
            content_hash: result.document.content_hash.clone(),
            previous_hash: prior.map(|d| d.content_hash),
            version_number: result.version.version_number,
            timestamp: result.version.created_at,
            metadata: result.version.metadata.clone(),
        };
        self.event_bus.publish(event.clone()).await;

        Ok(TrackResult {
            changed: true,
            change_type: detected,
            document_id: result.document.id,
            version_id: Some(result.version.id),
            version_number: result.version.version_number,
            content_hash: result.version.content_hash,
            previous_hash: event.previous_hash,
            chunk_diff: chunk_diff_result,
        })
    }

    /// Retries once on a storage-level unique-constraint conflict (spec
    /// §5's version-number race backstop).
    async fn commit_with_retry(&self, write: VersionWrite) -> RagResult<crate::storage::VersionCommitResult> {
        match self.storage.commit_version(write.clone()).await {
            Ok(result) => Ok(result),
            Err(RagError::Storage { kind: StorageErrorKind::Constraint, .. }) => {
                self.storage.commit_version(write).await
            }
            Err(other) => Err(other),
        }
    }

    pub async fn untrack(&self, document_id: uuid::Uuid, hard: bool) -> RagResult<()> {
        let doc = self
            .storage
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {document_id}")))?;

        let event = ChangeEvent {
            document_id: doc.id,
            version_id: uuid::Uuid::nil(),
            change_type: ChangeType::Deleted,
            file_path: doc.file_path.clone(),
            file_name: doc.file_name.clone(),
            file_size: doc.file_size,
            content_hash: doc.content_hash.clone(),
            previous_hash: None,
            version_number: doc.current_version,
            timestamp: chrono::Utc::now(),
            metadata: doc.metadata.clone(),
        };

        if hard {
            self.storage.hard_delete_document(document_id).await?;
        } else {
            self.storage.soft_delete_document(document_id).await?;
        }

        self.event_bus.publish(event).await;
        Ok(())
    }

    pub async fn restore(&self, document_id: uuid::Uuid, version_number: i64) -> RagResult<TrackResult> {
        let doc = self
            .storage
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {document_id}")))?;
        let target = self
            .storage
            .get_version(document_id, version_number)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("version {version_number} of document {document_id}")))?;

        let target_chunks = self.storage.get_chunks_by_version(target.id).await?;
        let mut prepared_chunks = Vec::with_capacity(target_chunks.len());
        for chunk in &target_chunks {
            let content = self.storage.get_chunk_content(chunk.id).await?;
            prepared_chunks.push(PreparedChunk {
                chunk_index: chunk.chunk_index,
                content_hash: chunk.content_hash.clone(),
                token_count: chunk.token_count,
                content,
                metadata: chunk.metadata.clone(),
            });
        }

        let snapshot = self.storage.get_content_snapshot(document_id, version_number).await?;

        let write = VersionWrite {
            existing_document_id: Some(document_id),
            file_path: doc.file_path.clone(),
            file_name: doc.file_name.clone(),
            file_type: doc.file_type.clone(),
            metadata: doc.metadata.clone(),
            content_hash: target.content_hash.clone(),
            file_hash: target.file_hash.clone(),
            file_size: target.file_size,
            change_type: ChangeType::Restored,
            chunks: prepared_chunks,
            content_snapshot: snapshot,
            clear_deleted: true,
        };

        let result = self.commit_with_retry(write).await?;

        let event = ChangeEvent {
            document_id: result.document.id,
            version_id: result.version.id,
            change_type: ChangeType::Restored,
            file_path: result.document.file_path.clone(),
            file_name: result.document.file_name.clone(),
            file_size: result.document.file_size,
            content_hash: result.document.content_hash.clone(),
            previous_hash: Some(doc.content_hash),
            version_number: result.version.version_number,
            timestamp: result.version.created_at,
            metadata: result.version.metadata.clone(),
        };
        self.event_bus.publish(event.clone()).await;

        Ok(TrackResult {
            changed: true,
            change_type: DetectedChange::Restored,
            document_id: result.document.id,
            version_id: Some(result.version.id),
            version_number: result.version.version_number,
            content_hash: result.version.content_hash,
            previous_hash: event.previous_hash,
            chunk_diff: None,
        })
    }

    pub async fn get_diff(&self, document_id: uuid::Uuid, from: i64, to: i64) -> RagResult<TextDiff> {
        let from_text = self.storage.get_content_snapshot(document_id, from).await?;
        let to_text = self.storage.get_content_snapshot(document_id, to).await?;

        match (from_text, to_text) {
            (Some(a), Some(b)) => Ok(compute_text_diff(from, to, &a, &b)),
            _ => Err(RagError::NotFound(format!(
                "content snapshot missing for document {document_id} versions {from}/{to}"
            ))),
        }
    }

    pub async fn get_chunk_diff(&self, document_id: uuid::Uuid, from: i64, to: i64) -> RagResult<ChunkDiff> {
        let from_version = self
            .storage
            .get_version(document_id, from)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("version {from} of document {document_id}")))?;
        let to_version = self
            .storage
            .get_version(document_id, to)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("version {to} of document {document_id}")))?;

        let old: Vec<ChunkSummary> =
            self.storage.get_chunks_by_version(from_version.id).await?.iter().map(ChunkSummary::from).collect();
        let new: Vec<ChunkSummary> =
            self.storage.get_chunks_by_version(to_version.id).await?.iter().map(ChunkSummary::from).collect();

        Ok(diff_chunks(document_id, from, to, &old, &new))
    }
}

/// Line-based diff with a unified-diff style rendering and a Dice-coefficient
/// similarity over the two lines sets' longest common subsequence. Kept
/// dependency-free rather than reaching for a diff crate: spec §4.7.5 asks
/// only for "textual line diff... and similarity", not a specific format.
fn compute_text_diff(from_version: i64, to_version: i64, from_text: &str, to_text: &str) -> TextDiff {
    let from_lines: Vec<&str> = from_text.lines().collect();
    let to_lines: Vec<&str> = to_text.lines().collect();

    let lcs_len = longest_common_subsequence_len(&from_lines, &to_lines);
    let denom = from_lines.len() + to_lines.len();
    let similarity = if denom == 0 { 1.0 } else { (2 * lcs_len) as f64 / denom as f64 };

    let unified_diff = render_unified_diff(&from_lines, &to_lines);

    TextDiff { from_version, to_version, similarity, unified_diff }
}

fn longest_common_subsequence_len(a: &[&str], b: &[&str]) -> usize {
    let mut dp = vec![0usize; b.len() + 1];
    for &x in a {
        let mut prev_diag = 0;
        for (j, &y) in b.iter().enumerate() {
            let tmp = dp[j + 1];
            dp[j + 1] = if x == y { prev_diag + 1 } else { dp[j + 1].max(dp[j]) };
            prev_diag = tmp;
        }
    }
    dp[b.len()]
}

/// Minimal unified-diff rendering: a naive line-by-line `-`/`+`/` ` walk
/// driven by the same LCS table, sufficient for human/debugging display.
fn render_unified_diff(a: &[&str], b: &[&str]) -> String {
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            dp[i + 1][j + 1] = if x == y { dp[i][j] + 1 } else { dp[i][j + 1].max(dp[i + 1][j]) };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (a.len(), b.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && a[i - 1] == b[j - 1] {
            out.push(format!(" {}", a[i - 1]));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i][j - 1] >= dp[i - 1][j]) {
            out.push(format!("+{}", b[j - 1]));
            j -= 1;
        } else {
            out.push(format!("-{}", a[i - 1]));
            i -= 1;
        }
    }
    out.reverse();
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_similarity_one() {
        let diff = compute_text_diff(1, 2, "a\nb\nc", "a\nb\nc");
        assert_eq!(diff.similarity, 1.0);
        assert!(diff.unified_diff.lines().all(|l| l.starts_with(' ')));
    }

    #[test]
    fn disjoint_text_has_low_similarity() {
        let diff = compute_text_diff(1, 2, "a\nb\nc", "x\ny\nz");
        assert_eq!(diff.similarity, 0.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let diff = compute_text_diff(1, 2, "a\nb\nc\nd", "a\nb\nx\nd");
        assert!(diff.similarity > 0.0 && diff.similarity < 1.0);
    }
}
