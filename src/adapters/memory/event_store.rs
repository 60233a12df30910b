//! In-memory ring-buffer event store.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AutomationEvent, EventQuery};
use crate::domain::ports::EventStore;

/// Bounded append-only log. Appends push onto a `VecDeque`; once the
/// configured capacity is reached the oldest entry is evicted. Append
/// order is the retained order, which preserves per-task relative
/// ordering under the single writer lock.
#[derive(Debug)]
pub struct MemoryEventStore {
    events: RwLock<VecDeque<AutomationEvent>>,
    capacity: usize,
}

impl MemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the entire retained log, oldest first.
    pub async fn snapshot(&self) -> Vec<AutomationEvent> {
        self.events.read().await.iter().cloned().collect()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &AutomationEvent) -> DomainResult<()> {
        let mut events = self.events.write().await;
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> DomainResult<Vec<AutomationEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<AutomationEvent> = events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            // Keep the most recent entries when limiting.
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        Ok(matched)
    }

    async fn count(&self) -> DomainResult<u64> {
        Ok(self.events.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventKind, TaskStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_append_and_query() {
        let store = MemoryEventStore::new(100);
        let task_id = Uuid::new_v4();

        store
            .append(&AutomationEvent::task_created(task_id, TaskStatus::Todo, false))
            .await
            .unwrap();
        store
            .append(&AutomationEvent::status_changed(
                task_id,
                TaskStatus::Todo,
                TaskStatus::InProgress,
                true,
            ))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let status_events = store
            .query(EventQuery::new().kind(EventKind::StatusChanged))
            .await
            .unwrap();
        assert_eq!(status_events.len(), 1);
        assert!(status_events[0].automated);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let store = MemoryEventStore::new(3);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for id in &ids {
            store
                .append(&AutomationEvent::task_created(*id, TaskStatus::Todo, false))
                .await
                .unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 3);
        let retained = store.snapshot().await;
        let retained_ids: Vec<Uuid> = retained.iter().map(|e| e.task_id).collect();
        assert_eq!(retained_ids, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let store = MemoryEventStore::new(100);
        let task_id = Uuid::new_v4();
        for _ in 0..5 {
            store
                .append(&AutomationEvent::task_updated(task_id, false))
                .await
                .unwrap();
        }

        let limited = store.query(EventQuery::new().limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_per_task_order_preserved() {
        let store = MemoryEventStore::new(100);
        let task_id = Uuid::new_v4();
        store
            .append(&AutomationEvent::task_created(task_id, TaskStatus::Todo, false))
            .await
            .unwrap();
        store
            .append(&AutomationEvent::status_changed(
                task_id,
                TaskStatus::Todo,
                TaskStatus::Done,
                false,
            ))
            .await
            .unwrap();

        let events = store.query(EventQuery::new().task(task_id)).await.unwrap();
        assert_eq!(events[0].kind, EventKind::TaskCreated);
        assert_eq!(events[1].kind, EventKind::StatusChanged);
    }
}
