//! In-memory task repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{TaskFilters, TaskRepository};

/// Tasks in a `HashMap` under an async `RwLock`. Lookups by metadata
/// and dependency scan the whole map; the task population is expected
/// to be thousands, not millions.
#[derive(Debug, Default)]
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn insert(&self, task: &Task) -> DomainResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        Ok(self.tasks.write().await.remove(&id).is_some())
    }

    async fn list(&self, filters: TaskFilters) -> DomainResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| filters.status.is_none_or(|s| t.status == s))
            .filter(|t| {
                filters
                    .assignee
                    .as_ref()
                    .is_none_or(|a| t.assignee.as_deref() == Some(a.as_str()))
            })
            .filter(|t| filters.priority.is_none_or(|p| t.priority == p))
            .filter(|t| {
                filters
                    .tag
                    .as_ref()
                    .is_none_or(|tag| t.tags.iter().any(|x| x == tag))
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filters.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn find_by_metadata(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> DomainResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|t| t.metadata.get(key) == Some(value))
            .cloned())
    }

    async fn list_dependents(&self, dependency_id: Uuid) -> DomainResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut dependents: Vec<Task> = tasks
            .values()
            .filter(|t| t.dependencies.contains(&dependency_id))
            .cloned()
            .collect();
        dependents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(dependents)
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let tasks = self.tasks.read().await;
        let mut counts = HashMap::new();
        for task in tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
