use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskPriority, TaskStatus};

/// Filters for querying tasks.
#[derive(Default, Debug, Clone)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

/// Repository port for task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task.
    async fn insert(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Replace an existing task.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task by id. Returns false when the task did not exist.
    async fn delete(&self, id: Uuid) -> DomainResult<bool>;

    /// List tasks matching the filters, in creation order.
    async fn list(&self, filters: TaskFilters) -> DomainResult<Vec<Task>>;

    /// Find the task carrying a metadata entry with the given key and
    /// value; the correlation lookup used by webhook ingestion.
    async fn find_by_metadata(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> DomainResult<Option<Task>>;

    /// Tasks whose `dependencies` set contains the given id.
    async fn list_dependents(&self, dependency_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Task counts grouped by current status.
    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>>;
}
