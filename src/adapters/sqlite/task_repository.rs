//! SQLite implementation of the `TaskRepository` port.
//!
//! Nested structures (tags, criteria, dependencies, metadata) live in
//! JSON columns. Metadata and dependency lookups filter in Rust after
//! a full fetch; the task population is thousands, not millions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::domain::ports::{TaskFilters, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    assignee: Option<String>,
    due_date: Option<String>,
    tags: String,
    estimated_hours: Option<f64>,
    actual_hours: Option<f64>,
    completion_criteria: String,
    dependencies: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

fn parse_timestamp(s: &str, field: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Database(format!("invalid {field}: {e}")))
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> DomainResult<Self> {
        Ok(Task {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Database(format!("invalid task id: {e}")))?,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Database(format!("unknown status '{}'", row.status)))?,
            priority: TaskPriority::from_str(&row.priority).ok_or_else(|| {
                DomainError::Database(format!("unknown priority '{}'", row.priority))
            })?,
            assignee: row.assignee,
            due_date: row
                .due_date
                .as_deref()
                .map(|s| parse_timestamp(s, "due_date"))
                .transpose()?,
            tags: serde_json::from_str(&row.tags)?,
            estimated_hours: row.estimated_hours,
            actual_hours: row.actual_hours,
            completion_criteria: serde_json::from_str(&row.completion_criteria)?,
            dependencies: serde_json::from_str(&row.dependencies)?,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        })
    }
}

impl SqliteTaskRepository {
    async fn fetch_all(&self) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    fn bind_task<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        task: &'q Task,
        tags: &'q str,
        criteria: &'q str,
        dependencies: &'q str,
        metadata: &'q str,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(task.title.as_str())
            .bind(task.description.as_deref())
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(task.assignee.as_deref())
            .bind(task.due_date.map(|d| d.to_rfc3339()))
            .bind(tags)
            .bind(task.estimated_hours)
            .bind(task.actual_hours)
            .bind(criteria)
            .bind(dependencies)
            .bind(metadata)
            .bind(task.created_at.to_rfc3339())
            .bind(task.updated_at.to_rfc3339())
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &Task) -> DomainResult<()> {
        let tags = serde_json::to_string(&task.tags)?;
        let criteria = serde_json::to_string(&task.completion_criteria)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let metadata = serde_json::to_string(&task.metadata)?;

        let query = sqlx::query(
            r#"
            INSERT INTO tasks (id, title, description, status, priority, assignee, due_date,
                               tags, estimated_hours, actual_hours, completion_criteria,
                               dependencies, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string());
        Self::bind_task(query, task, &tags, &criteria, &dependencies, &metadata)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let tags = serde_json::to_string(&task.tags)?;
        let criteria = serde_json::to_string(&task.completion_criteria)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let metadata = serde_json::to_string(&task.metadata)?;

        let query = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, status = ?, priority = ?, assignee = ?,
                due_date = ?, tags = ?, estimated_hours = ?, actual_hours = ?,
                completion_criteria = ?, dependencies = ?, metadata = ?,
                created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        );
        Self::bind_task(query, task, &tags, &criteria, &dependencies, &metadata)
            .bind(task.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filters: TaskFilters) -> DomainResult<Vec<Task>> {
        let tasks = self.fetch_all().await?;
        let mut matched: Vec<Task> = tasks
            .into_iter()
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
            .collect();
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
        let tasks = self.fetch_all().await?;
        Ok(tasks.into_iter().find(|t| t.metadata.get(key) == Some(value)))
    }

    async fn list_dependents(&self, dependency_id: Uuid) -> DomainResult<Vec<Task>> {
        let tasks = self.fetch_all().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.dependencies.contains(&dependency_id))
            .collect())
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;
    use crate::domain::models::CompletionCriterion;

    async fn setup() -> SqliteTaskRepository {
        SqliteTaskRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_roundtrip_with_nested_fields() {
        let repo = setup().await;
        let dep = Uuid::new_v4();
        let mut task = Task::new("Persisted")
            .with_description("with everything")
            .with_assignee("alice")
            .with_priority(TaskPriority::High)
            .with_dependency(dep)
            .with_criterion(CompletionCriterion::new("tests pass"))
            .with_metadata("provider.trello.id", serde_json::json!("c1"));
        task.tags = vec!["backend".to_string()];
        task.due_date = Some(Utc::now());

        repo.insert(&task).await.unwrap();
        let fetched = repo.get(task.id).await.unwrap().unwrap();

        assert_eq!(fetched.title, task.title);
        assert_eq!(fetched.dependencies, vec![dep]);
        assert_eq!(fetched.completion_criteria.len(), 1);
        assert_eq!(
            fetched.metadata.get("provider.trello.id"),
            Some(&serde_json::json!("c1"))
        );
        assert_eq!(fetched.tags, vec!["backend".to_string()]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup().await;
        let mut task = Task::new("T");
        repo.insert(&task).await.unwrap();

        task.status = TaskStatus::Done;
        task.assignee = Some("bob".to_string());
        repo.update(&task).await.unwrap();

        let fetched = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Done);
        assert_eq!(fetched.assignee.as_deref(), Some("bob"));

        assert!(repo.delete(task.id).await.unwrap());
        assert!(!repo.delete(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_filters_and_counts() {
        let repo = setup().await;
        repo.insert(&Task::new("a").with_status(TaskStatus::Todo))
            .await
            .unwrap();
        repo.insert(&Task::new("b").with_status(TaskStatus::Done))
            .await
            .unwrap();

        let todo = repo
            .list(TaskFilters {
                status: Some(TaskStatus::Todo),
                ..TaskFilters::default()
            })
            .await
            .unwrap();
        assert_eq!(todo.len(), 1);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&TaskStatus::Todo), Some(&1));
        assert_eq!(counts.get(&TaskStatus::Done), Some(&1));
    }

    #[tokio::test]
    async fn test_find_by_metadata_and_dependents() {
        let repo = setup().await;
        let synced =
            Task::new("synced").with_metadata("provider.agent.id", serde_json::json!("run-3"));
        let dependent = Task::new("dependent").with_dependency(synced.id);
        repo.insert(&synced).await.unwrap();
        repo.insert(&dependent).await.unwrap();

        let found = repo
            .find_by_metadata("provider.agent.id", &serde_json::json!("run-3"))
            .await
            .unwrap();
        assert_eq!(found.map(|t| t.id), Some(synced.id));

        let dependents = repo.list_dependents(synced.id).await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, dependent.id);
    }
}
