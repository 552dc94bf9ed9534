//! Batch Tracker (spec §4.8): bounded-concurrency fan-out of
//! [`VersionTracker::track`] over a directory walk.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{RagError, RagResult};
use crate::models::{BatchResult, FailedTrack};
use crate::tracker::VersionTracker;

pub struct BatchTracker {
    tracker: Arc<VersionTracker>,
}

fn build_globset(patterns: &[String]) -> RagResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| RagError::Config(format!("invalid glob {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RagError::Config(format!("failed to compile glob set: {e}")))
}

fn walk_candidates(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = walkdir::WalkDir::new(root).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

impl BatchTracker {
    pub fn new(tracker: Arc<VersionTracker>) -> Self {
        BatchTracker { tracker }
    }

    /// Walk `root`, apply `patterns` (include globs, matched against the
    /// path relative to `root`; empty means "match everything") and
    /// `ignore` (exclude globs), then dispatch the surviving paths onto a
    /// pool of at most `max_workers` concurrent `track` calls.
    #[tracing::instrument(skip(self, patterns, ignore), fields(root = %root.as_ref().display()))]
    pub async fn track_directory(
        &self,
        root: impl AsRef<Path>,
        patterns: &[String],
        ignore: &[String],
        recursive: bool,
        max_workers: usize,
    ) -> RagResult<BatchResult> {
        let root = root.as_ref();
        let started_at = chrono::Utc::now();

        let include = build_globset(patterns)?;
        let exclude = build_globset(ignore)?;

        let candidates = walk_candidates(root, recursive);
        let mut selected = Vec::new();
        for path in candidates {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if !patterns.is_empty() && !include.is_match(relative) {
                continue;
            }
            if !ignore.is_empty() && exclude.is_match(relative) {
                continue;
            }
            selected.push(path);
        }

        let total_files = selected.len();
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut joins = JoinSet::new();

        for path in selected {
            let tracker = self.tracker.clone();
            let permit = semaphore.clone();
            joins.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let result = tracker.track(&path, None).await;
                (path, result)
            });
        }

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((_path, Ok(track_result))) => successful.push(track_result),
                Ok((path, Err(err))) => {
                    failed.push(FailedTrack { path: path.to_string_lossy().to_string(), error_kind: err.kind_name().to_string(), message: err.to_string() });
                }
                Err(join_err) => {
                    failed.push(FailedTrack {
                        path: String::new(),
                        error_kind: "Cancelled".to_string(),
                        message: join_err.to_string(),
                    });
                }
            }
        }

        let completed_at = chrono::Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        Ok(BatchResult { successful, failed, total_files, duration_ms, started_at, completed_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globset_matches_extension_pattern() {
        let set = build_globset(&["**/*.md".to_string()]).unwrap();
        assert!(set.is_match(Path::new("notes/a.md")));
        assert!(!set.is_match(Path::new("notes/a.txt")));
    }

    #[test]
    fn empty_pattern_list_builds_empty_set() {
        let set = build_globset(&[]).unwrap();
        assert!(!set.is_match(Path::new("anything.txt")));
    }

    #[test]
    fn non_recursive_walk_skips_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("deep.txt"), b"hi").unwrap();

        let shallow = walk_candidates(dir.path(), false);
        assert_eq!(shallow.len(), 1);

        let deep = walk_candidates(dir.path(), true);
        assert_eq!(deep.len(), 2);
    }
}
