//! Notifier capability (spec §6): a pluggable transport (chat/email/webhook)
//! that the [`crate::events::EventBus`] can fan events out to via
//! [`NotifierSink`]. This crate ships one concrete, working implementation —
//! [`LoggingNotifier`] — as both a usable default and a reference for real
//! transports plugged in by callers.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use crate::error::{RagError, RagResult};
use crate::events::Sink;
use crate::models::{ChangeEvent, ChangeType};

/// Input: the triggering event. Output: whether delivery succeeded.
/// Exceptions are the caller's (the bus's) concern, not the notifier's —
/// a `Notifier` reports failure via `Err`, it never needs to swallow its own.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &ChangeEvent) -> RagResult<bool>;
}

/// Gates which change types are worth notifying about, and how long a
/// single notify call may run before it's treated as a timeout failure.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub enabled: bool,
    /// `None` means every change type is eligible.
    pub mention_policy: Option<HashSet<ChangeType>>,
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig { enabled: true, mention_policy: None, timeout: Duration::from_secs(10) }
    }
}

impl NotifierConfig {
    fn allows(&self, change_type: ChangeType) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.mention_policy {
            None => true,
            Some(set) => set.contains(&change_type),
        }
    }
}

/// Logs the event at `info` level. The crate's one working `Notifier`;
/// real transports (webhook, email, chat) implement the same trait.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &ChangeEvent) -> RagResult<bool> {
        tracing::info!(
            document_id = %event.document_id,
            version_number = event.version_number,
            change_type = event.change_type.as_str(),
            path = %event.file_path,
            "change notification"
        );
        Ok(true)
    }
}

/// Adapts a [`Notifier`] + [`NotifierConfig`] into an [`Sink`] so it can be
/// registered on the [`crate::events::EventBus`].
pub struct NotifierSink {
    notifier: Box<dyn Notifier>,
    config: NotifierConfig,
}

impl NotifierSink {
    pub fn new(notifier: Box<dyn Notifier>, config: NotifierConfig) -> Self {
        NotifierSink { notifier, config }
    }
}

#[async_trait]
impl Sink for NotifierSink {
    async fn handle(&self, event: &ChangeEvent) -> RagResult<()> {
        if !self.config.allows(event.change_type) {
            return Ok(());
        }

        let delivered = tokio::time::timeout(self.config.timeout, self.notifier.notify(event))
            .await
            .map_err(|_| RagError::storage(crate::error::StorageErrorKind::Timeout, "notifier call timed out"))??;

        if !delivered {
            tracing::warn!(document_id = %event.document_id, "notifier reported delivery failure");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "notifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(change_type: ChangeType) -> ChangeEvent {
        ChangeEvent {
            document_id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            change_type,
            file_path: "/a.txt".into(),
            file_name: "a.txt".into(),
            file_size: 10,
            content_hash: "abc".into(),
            previous_hash: None,
            version_number: 1,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let notifier = LoggingNotifier;
        assert!(notifier.notify(&event(ChangeType::Created)).await.unwrap());
    }

    #[tokio::test]
    async fn sink_skips_disallowed_change_type() {
        let mut policy = HashSet::new();
        policy.insert(ChangeType::Deleted);
        let config = NotifierConfig { enabled: true, mention_policy: Some(policy), timeout: Duration::from_secs(1) };
        let sink = NotifierSink::new(Box::new(LoggingNotifier), config);

        // Created is not in the policy: handled without error and without
        // (observably) calling the notifier.
        sink.handle(&event(ChangeType::Created)).await.unwrap();
    }

    #[tokio::test]
    async fn sink_runs_allowed_change_type() {
        let sink = NotifierSink::new(Box::new(LoggingNotifier), NotifierConfig::default());
        sink.handle(&event(ChangeType::Modified)).await.unwrap();
    }
}
