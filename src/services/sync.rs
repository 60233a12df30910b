//! Outbound synchronization to external trackers.
//!
//! Pushes run fire-and-forget on spawned tasks with a bounded
//! per-attempt timeout and exponential backoff, so a slow provider can
//! never stall the in-process mutation path or hold a task lock. Task
//! state is never rolled back on sync failure; the failure is logged
//! as an `automation_failed` event and retried until the backoff
//! budget is exhausted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{provider_key, AutomationEvent, SyncConfig, TaskDraft};
use crate::domain::ports::{EventStore, RemoteTracker, TaskRepository};

pub struct SyncService {
    trackers: HashMap<String, Arc<dyn RemoteTracker>>,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn EventStore>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn EventStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            trackers: HashMap::new(),
            tasks,
            events,
            config,
        }
    }

    /// Register a tracker under its provider name.
    pub fn with_tracker(mut self, tracker: Arc<dyn RemoteTracker>) -> Self {
        self.trackers.insert(tracker.provider().to_string(), tracker);
        self
    }

    pub fn binding_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trackers.keys().cloned().collect();
        names.sort();
        names
    }

    fn tracker(&self, binding: &str) -> DomainResult<Arc<dyn RemoteTracker>> {
        self.trackers
            .get(binding)
            .cloned()
            .ok_or_else(|| DomainError::ExternalSystem {
                binding: binding.to_string(),
                reason: "no such binding configured".to_string(),
            })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.initial_backoff_ms),
            max_elapsed_time: Some(Duration::from_millis(self.config.max_elapsed_ms)),
            ..ExponentialBackoff::default()
        }
    }

    /// Queue a push of the task's current state to a binding. Returns
    /// an error only when the binding is unknown; delivery itself is
    /// asynchronous.
    pub fn spawn_push(&self, binding: &str, task_id: Uuid) -> DomainResult<()> {
        let tracker = self.tracker(binding)?;
        let tasks = Arc::clone(&self.tasks);
        let events = Arc::clone(&self.events);
        let backoff = self.backoff();
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let binding = binding.to_string();

        tokio::spawn(async move {
            let result = backoff::future::retry(backoff, || {
                let tracker = Arc::clone(&tracker);
                let tasks = Arc::clone(&tasks);
                let events = Arc::clone(&events);
                async move {
                    push_once(&*tracker, &*tasks, &*events, task_id, timeout)
                        .await
                        .map_err(|err| match err {
                            DomainError::TaskNotFound(_) => backoff::Error::permanent(err),
                            other => backoff::Error::transient(other),
                        })
                }
            })
            .await;

            if let Err(err) = result {
                tracing::error!(binding = %binding, task_id = %task_id, %err, "Outbound sync gave up");
                let event =
                    AutomationEvent::automation_failed(task_id, None, format!("sync to {binding}: {err}"));
                if let Err(append_err) = events.append(&event).await {
                    tracing::warn!(%append_err, "Failed to record sync failure");
                }
            }
        });

        Ok(())
    }

    /// Queue a remote deletion (or close, depending on the provider).
    pub fn spawn_delete(&self, binding: &str, external_id: String) -> DomainResult<()> {
        let tracker = self.tracker(binding)?;
        let backoff = self.backoff();
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let binding = binding.to_string();

        tokio::spawn(async move {
            let result = backoff::future::retry(backoff, || {
                let tracker = Arc::clone(&tracker);
                let external_id = external_id.clone();
                async move {
                    tokio::time::timeout(timeout, tracker.delete_remote(&external_id))
                        .await
                        .map_err(|_| DomainError::ExternalSystem {
                            binding: tracker.provider().to_string(),
                            reason: "request timed out".to_string(),
                        })
                        .and_then(|r| r)
                        .map_err(backoff::Error::transient)
                }
            })
            .await;

            if let Err(err) = result {
                tracing::error!(binding = %binding, %err, "Remote deletion gave up");
            }
        });

        Ok(())
    }

    /// Reconciliation pull: fetch all remote records as drafts. The
    /// caller (API layer) applies them through the engine so normal
    /// dispatch and logging happen.
    pub async fn pull(&self, binding: &str) -> DomainResult<Vec<TaskDraft>> {
        let tracker = self.tracker(binding)?;
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        tokio::time::timeout(timeout, tracker.list_remote())
            .await
            .map_err(|_| DomainError::ExternalSystem {
                binding: binding.to_string(),
                reason: "reconciliation pull timed out".to_string(),
            })?
    }
}

/// One push attempt: update the existing remote record, or create it
/// and persist the new correlation id into the task's metadata.
async fn push_once(
    tracker: &dyn RemoteTracker,
    tasks: &dyn TaskRepository,
    events: &dyn EventStore,
    task_id: Uuid,
    timeout: Duration,
) -> DomainResult<()> {
    let task = tasks
        .get(task_id)
        .await?
        .ok_or(DomainError::TaskNotFound(task_id))?;

    let id_key = provider_key(tracker.provider(), "id");
    let external_id = task
        .metadata
        .get(&id_key)
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match external_id {
        Some(external_id) => {
            tokio::time::timeout(timeout, tracker.update_remote(&external_id, &task))
                .await
                .map_err(|_| timeout_error(tracker))??;
        }
        None => {
            let external_id = tokio::time::timeout(timeout, tracker.create_remote(&task))
                .await
                .map_err(|_| timeout_error(tracker))??;

            // Correlation write-back goes straight to the repository:
            // a metadata-only bookkeeping write that must not re-enter
            // rule dispatch.
            let mut task = tasks
                .get(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;
            task.metadata
                .insert(id_key, serde_json::Value::String(external_id));
            task.touch();
            tasks.update(&task).await?;
            events
                .append(&AutomationEvent::task_updated(task_id, true))
                .await?;
        }
    }

    Ok(())
}

fn timeout_error(tracker: &dyn RemoteTracker) -> DomainError {
    DomainError::ExternalSystem {
        binding: tracker.provider().to_string(),
        reason: "request timed out".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryEventStore, MemoryTaskRepository};
    use crate::domain::models::Task;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tracker double that records calls and can fail N times first.
    struct FlakyTracker {
        fail_first: usize,
        creates: AtomicUsize,
        updates: AtomicUsize,
    }

    impl FlakyTracker {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                creates: AtomicUsize::new(0),
                updates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteTracker for FlakyTracker {
        fn provider(&self) -> &str {
            "flaky"
        }

        async fn create_remote(&self, _task: &Task) -> DomainResult<String> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(DomainError::ExternalSystem {
                    binding: "flaky".to_string(),
                    reason: "transient".to_string(),
                });
            }
            Ok("ext-1".to_string())
        }

        async fn update_remote(&self, _external_id: &str, _task: &Task) -> DomainResult<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_remote(&self, _external_id: &str) -> DomainResult<()> {
            Ok(())
        }

        async fn list_remote(&self) -> DomainResult<Vec<TaskDraft>> {
            Ok(vec![TaskDraft::new("remote task")])
        }
    }

    fn quick_config() -> SyncConfig {
        SyncConfig {
            request_timeout_ms: 1000,
            initial_backoff_ms: 1,
            max_elapsed_ms: 2000,
        }
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_push_creates_and_records_correlation_id() {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let events = Arc::new(MemoryEventStore::new(100));
        let tracker = Arc::new(FlakyTracker::new(0));

        let task = Task::new("to sync");
        tasks.insert(&task).await.unwrap();

        let sync = SyncService::new(
            Arc::clone(&tasks) as Arc<dyn TaskRepository>,
            Arc::clone(&events) as Arc<dyn EventStore>,
            quick_config(),
        )
        .with_tracker(Arc::clone(&tracker) as Arc<dyn RemoteTracker>);

        sync.spawn_push("flaky", task.id).unwrap();

        let mut correlated = false;
        for _ in 0..200 {
            let current = tasks.get(task.id).await.unwrap().unwrap();
            if current.metadata.contains_key("provider.flaky.id") {
                correlated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(correlated, "push did not complete in time");

        let synced = tasks.get(task.id).await.unwrap().unwrap();
        assert_eq!(
            synced.metadata.get("provider.flaky.id"),
            Some(&serde_json::json!("ext-1"))
        );
        assert_eq!(tracker.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_retries_transient_failures() {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let events = Arc::new(MemoryEventStore::new(100));
        let tracker = Arc::new(FlakyTracker::new(2));

        let task = Task::new("to sync");
        tasks.insert(&task).await.unwrap();

        let sync = SyncService::new(
            Arc::clone(&tasks) as Arc<dyn TaskRepository>,
            Arc::clone(&events) as Arc<dyn EventStore>,
            quick_config(),
        )
        .with_tracker(Arc::clone(&tracker) as Arc<dyn RemoteTracker>);

        sync.spawn_push("flaky", task.id).unwrap();

        let mut correlated = false;
        for _ in 0..200 {
            let current = tasks.get(task.id).await.unwrap().unwrap();
            if current.metadata.contains_key("provider.flaky.id") {
                correlated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(correlated, "retrying push did not complete in time");
        assert_eq!(tracker.creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_push_updates_when_already_correlated() {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let events = Arc::new(MemoryEventStore::new(100));
        let tracker = Arc::new(FlakyTracker::new(0));

        let task =
            Task::new("synced").with_metadata("provider.flaky.id", serde_json::json!("ext-9"));
        tasks.insert(&task).await.unwrap();

        let sync = SyncService::new(
            Arc::clone(&tasks) as Arc<dyn TaskRepository>,
            Arc::clone(&events) as Arc<dyn EventStore>,
            quick_config(),
        )
        .with_tracker(Arc::clone(&tracker) as Arc<dyn RemoteTracker>);

        sync.spawn_push("flaky", task.id).unwrap();

        let tracker_ref = Arc::clone(&tracker);
        wait_for(move || tracker_ref.updates.load(Ordering::SeqCst) >= 1).await;
        assert_eq!(tracker.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_binding_is_inline_error() {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let events = Arc::new(MemoryEventStore::new(100));
        let sync = SyncService::new(
            tasks as Arc<dyn TaskRepository>,
            events as Arc<dyn EventStore>,
            quick_config(),
        );

        let result = sync.spawn_push("nope", Uuid::new_v4());
        assert!(matches!(result, Err(DomainError::ExternalSystem { .. })));
    }

    #[tokio::test]
    async fn test_pull_returns_remote_drafts() {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let events = Arc::new(MemoryEventStore::new(100));
        let sync = SyncService::new(
            tasks as Arc<dyn TaskRepository>,
            events as Arc<dyn EventStore>,
            quick_config(),
        )
        .with_tracker(Arc::new(FlakyTracker::new(0)) as Arc<dyn RemoteTracker>);

        let drafts = sync.pull("flaky").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "remote task");
    }
}
