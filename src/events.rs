//! Event Bus (spec §4.10): fan-out of [`ChangeEvent`]s to independent sinks,
//! keyed by event class. Dispatch is fire-and-forget and best-effort — one
//! sink's failure is logged and never propagates to the tracker or to any
//! other sink.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::RagResult;
use crate::models::{ChangeEvent, ChangeType};

/// A subscribable event class. There is deliberately no `Unchanged` variant:
/// `UNCHANGED` never produces a `ChangeEvent` (spec §4.5), so subscribing to
/// it would be subscribing to something that can never fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Any,
    Added,
    Modified,
    Deleted,
    Restored,
}

impl EventClass {
    fn of(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::Created => EventClass::Added,
            ChangeType::Modified => EventClass::Modified,
            ChangeType::Deleted => EventClass::Deleted,
            ChangeType::Restored => EventClass::Restored,
        }
    }
}

/// A single subscriber. Implementations must not panic; a returned `Err` is
/// logged by the bus and otherwise ignored.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn handle(&self, event: &ChangeEvent) -> RagResult<()>;

    fn name(&self) -> &str {
        "sink"
    }
}

/// Sink registry. The sink list is read-mostly; `subscribe` takes a brief
/// write lock, `publish` takes a read lock per dispatch.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<HashMap<EventClass, Vec<Arc<dyn Sink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { sinks: RwLock::new(HashMap::new()) }
    }

    pub async fn subscribe(&self, class: EventClass, sink: Arc<dyn Sink>) {
        self.sinks.write().await.entry(class).or_default().push(sink);
    }

    pub async fn subscribe_any(&self, sink: Arc<dyn Sink>) {
        self.subscribe(EventClass::Any, sink).await;
    }

    pub async fn subscribe_added(&self, sink: Arc<dyn Sink>) {
        self.subscribe(EventClass::Added, sink).await;
    }

    pub async fn subscribe_modified(&self, sink: Arc<dyn Sink>) {
        self.subscribe(EventClass::Modified, sink).await;
    }

    pub async fn subscribe_deleted(&self, sink: Arc<dyn Sink>) {
        self.subscribe(EventClass::Deleted, sink).await;
    }

    pub async fn subscribe_restored(&self, sink: Arc<dyn Sink>) {
        self.subscribe(EventClass::Restored, sink).await;
    }

    // No `subscribe_unchanged`: UNCHANGED never reaches the bus, so there is
    // nothing to subscribe to.

    /// Dispatch `event` to every sink registered for its class plus every
    /// sink registered for `Any`. Invoked after the triggering Version's
    /// storage commit; failures here never unwind the commit.
    pub async fn publish(&self, event: ChangeEvent) {
        let class = EventClass::of(event.change_type);
        let sinks = self.sinks.read().await;

        let mut targets: Vec<&Arc<dyn Sink>> = Vec::new();
        if let Some(any) = sinks.get(&EventClass::Any) {
            targets.extend(any.iter());
        }
        if let Some(specific) = sinks.get(&class) {
            targets.extend(specific.iter());
        }

        for sink in targets {
            if let Err(err) = sink.handle(&event).await {
                tracing::warn!(sink = sink.name(), document_id = %event.document_id, error = %err, "event sink failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingSink {
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn handle(&self, _event: &ChangeEvent) -> RagResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::error::RagError::Cancelled);
            }
            Ok(())
        }
    }

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
            metadata: StdHashMap::new(),
        }
    }

    #[tokio::test]
    async fn any_sink_receives_every_class() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_any(Arc::new(CountingSink { count: count.clone(), fail: false })).await;

        bus.publish(event(ChangeType::Created)).await;
        bus.publish(event(ChangeType::Deleted)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn class_specific_sink_ignores_other_classes() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_modified(Arc::new(CountingSink { count: count.clone(), fail: false })).await;

        bus.publish(event(ChangeType::Created)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish(event(ChangeType::Modified)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_dispatch_to_others() {
        let bus = EventBus::new();
        let failing_count = Arc::new(AtomicUsize::new(0));
        let healthy_count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_any(Arc::new(CountingSink { count: failing_count.clone(), fail: true })).await;
        bus.subscribe_any(Arc::new(CountingSink { count: healthy_count.clone(), fail: false })).await;

        bus.publish(event(ChangeType::Created)).await;

        assert_eq!(failing_count.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_count.load(Ordering::SeqCst), 1);
    }
}
