//! Watcher (spec §4.9): turns filesystem events into debounced,
//! pattern-filtered `track` calls against a [`VersionTracker`].

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{RagError, RagResult};
use crate::tracker::VersionTracker;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn default_ignore_globset() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["**/.*", "**/*~", "**/*.swp", "**/*.swx", "**/*.tmp"] {
        builder.add(Glob::new(pattern).expect("static glob pattern is valid"));
    }
    builder.build().expect("static glob set always compiles")
}

/// Filesystem watcher feeding a [`VersionTracker`]. A scoped OS-level
/// resource: `stop` (or dropping the returned handle) unsubscribes and
/// drains within [`SHUTDOWN_GRACE`].
pub struct Watcher {
    tracker: Arc<VersionTracker>,
    debounce: Duration,
    include: GlobSet,
    exclude: GlobSet,
    default_ignore: GlobSet,
    storage_path: Option<PathBuf>,
}

impl Watcher {
    pub fn new(
        tracker: Arc<VersionTracker>,
        debounce_ms: u64,
        patterns: &[String],
        ignore: &[String],
        storage_path: Option<PathBuf>,
    ) -> RagResult<Self> {
        let include = build_globset(patterns)?;
        let exclude = build_globset(ignore)?;
        Ok(Watcher {
            tracker,
            debounce: Duration::from_millis(debounce_ms),
            include,
            exclude,
            default_ignore: default_ignore_globset(),
            storage_path,
        })
    }

    fn should_track(&self, root: &Path, path: &Path) -> bool {
        if let Some(storage_path) = &self.storage_path {
            if path == storage_path.as_path() {
                return false;
            }
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if self.default_ignore.is_match(relative) {
            return false;
        }
        if !self.include.is_match(relative) && self.include.len() > 0 {
            return false;
        }
        if self.exclude.len() > 0 && self.exclude.is_match(relative) {
            return false;
        }
        true
    }

    /// Watch `root` until `cancel` fires. Each quiescent burst of events on
    /// a single path (spec §4.9 per-path debounce) produces exactly one
    /// `track` call. Per-event errors are logged; the watcher never stops
    /// because a single track failed (spec §7).
    pub async fn run(&self, root: impl AsRef<Path>, mut cancel: tokio::sync::watch::Receiver<bool>) -> RagResult<()> {
        let root = root.as_ref().to_path_buf();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| RagError::Config(format!("failed to initialize filesystem watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| RagError::Config(format!("failed to watch {}: {e}", root.display())))?;

        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            tokio::select! {
                biased;

                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }

                event = rx.recv() => {
                    match event {
                        Some(Ok(ev)) => self.on_event(&root, ev, &mut pending),
                        Some(Err(err)) => tracing::warn!(error = %err, "watcher backend error"),
                        None => break,
                    }
                }

                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    self.flush_due(&mut pending).await;
                }
            }
        }

        self.drain_with_deadline(&mut rx, &mut pending).await;
        Ok(())
    }

    fn on_event(&self, root: &Path, event: Event, pending: &mut HashMap<PathBuf, Instant>) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any) {
            return;
        }
        for path in event.paths {
            if self.should_track(root, &path) {
                pending.insert(path, Instant::now());
            }
        }
    }

    async fn flush_due(&self, pending: &mut HashMap<PathBuf, Instant>) {
        let now = Instant::now();
        let due: Vec<PathBuf> =
            pending.iter().filter(|(_, &seen)| now.duration_since(seen) >= self.debounce).map(|(p, _)| p.clone()).collect();

        for path in due {
            pending.remove(&path);
            if let Err(err) = self.tracker.track(&path, None).await {
                tracing::warn!(path = %path.display(), error = %err, "watcher-triggered track failed");
            }
        }
    }

    /// On shutdown, keep draining newly-quiescent entries up to
    /// [`SHUTDOWN_GRACE`] rather than dropping in-flight debounce windows.
    async fn drain_with_deadline(&self, rx: &mut UnboundedReceiver<notify::Result<Event>>, pending: &mut HashMap<PathBuf, Instant>) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline && !pending.is_empty() {
            tokio::select! {
                event = rx.recv() => {
                    if let Some(Ok(_ev)) = event {
                        // Events during drain no longer extend per-path timers;
                        // we are shutting down, not debouncing indefinitely.
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            self.flush_due(pending).await;
        }
    }
}

fn build_globset(patterns: &[String]) -> RagResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| RagError::Config(format!("invalid glob {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RagError::Config(format!("failed to compile glob set: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::ModifyKind;

    #[test]
    fn default_ignore_matches_hidden_and_swap_files() {
        let set = default_ignore_globset();
        assert!(set.is_match(Path::new(".git/HEAD")));
        assert!(set.is_match(Path::new("notes.md~")));
        assert!(set.is_match(Path::new("notes.md.swp")));
        assert!(!set.is_match(Path::new("notes.md")));
    }

    async fn test_tracker() -> Arc<VersionTracker> {
        let storage: Arc<dyn crate::storage::Storage> =
            Arc::new(crate::storage::sqlite::SqliteStorage::connect_in_memory().await.unwrap());
        let tracker = VersionTracker::new(
            storage,
            crate::config::EngineConfig::default(),
            crate::parser::ParserRegistry::new(),
            crate::default_chunkers(),
            Arc::new(crate::events::EventBus::new()),
        )
        .unwrap();
        Arc::new(tracker)
    }

    /// Spec §4.9/§8 property #8, scenario S6: N rapid signals on one path
    /// within the debounce window must coalesce into exactly one `track`
    /// call, not one per signal.
    #[tokio::test]
    async fn rapid_signals_to_one_path_produce_a_single_track() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        tokio::fs::write(&file, "v0").await.unwrap();

        let tracker = test_tracker().await;
        tracker.track(&file, None).await.unwrap();

        let watcher = Watcher::new(tracker.clone(), 50, &[], &[], None).unwrap();
        let mut pending = HashMap::new();

        for i in 1..=5 {
            tokio::fs::write(&file, format!("v{i}")).await.unwrap();
            let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(file.clone());
            watcher.on_event(dir.path(), event, &mut pending);
            // Still inside the debounce window: must not fire yet.
            watcher.flush_due(&mut pending).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pending.len(), 1, "the path must still be coalescing, not yet flushed");

        tokio::time::sleep(Duration::from_millis(60)).await;
        watcher.flush_due(&mut pending).await;
        assert!(pending.is_empty(), "a quiescent path must be flushed exactly once");

        // Had every signal produced its own track call, this would be 6
        // (1 create + 5 modifies); debounced, it's 2 (1 create + 1 modify
        // for the final content).
        let result = tracker.track(&file, None).await.unwrap();
        assert_eq!(result.version_number, 2);
    }
}
