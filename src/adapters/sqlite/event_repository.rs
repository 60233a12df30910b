//! SQLite implementation of the `EventStore` port.
//!
//! Append order is the autoincrement sequence. Capacity is enforced on
//! append by trimming the head of the log, so retention matches the
//! in-memory ring buffer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutomationEvent, EventKind, EventQuery, TaskStatus};
use crate::domain::ports::EventStore;

#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
    capacity: i64,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool, capacity: usize) -> Self {
        Self {
            pool,
            capacity: i64::try_from(capacity.max(1)).unwrap_or(i64::MAX),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    timestamp: String,
    kind: String,
    task_id: String,
    rule_id: Option<String>,
    from_status: Option<String>,
    to_status: Option<String>,
    automated: i64,
    duration_ms: Option<i64>,
    error: Option<String>,
}

impl TryFrom<EventRow> for AutomationEvent {
    type Error = DomainError;

    fn try_from(row: EventRow) -> DomainResult<Self> {
        Ok(AutomationEvent {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Database(format!("invalid event id: {e}")))?,
            timestamp: DateTime::parse_from_rfc3339(&row.timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DomainError::Database(format!("invalid timestamp: {e}")))?,
            kind: EventKind::from_str(&row.kind)
                .ok_or_else(|| DomainError::Database(format!("unknown event kind '{}'", row.kind)))?,
            task_id: Uuid::parse_str(&row.task_id)
                .map_err(|e| DomainError::Database(format!("invalid task id: {e}")))?,
            rule_id: row
                .rule_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()
                .map_err(|e| DomainError::Database(format!("invalid rule id: {e}")))?,
            from_status: row.from_status.as_deref().and_then(TaskStatus::from_str),
            to_status: row.to_status.as_deref().and_then(TaskStatus::from_str),
            automated: row.automated != 0,
            duration_ms: row.duration_ms.map(|d| d.max(0) as u64),
            error: row.error,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventRepository {
    async fn append(&self, event: &AutomationEvent) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, timestamp, kind, task_id, rule_id, from_status, to_status,
                                automated, duration_ms, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.timestamp.to_rfc3339())
        .bind(event.kind.as_str())
        .bind(event.task_id.to_string())
        .bind(event.rule_id.map(|id| id.to_string()))
        .bind(event.from_status.map(|s| s.as_str()))
        .bind(event.to_status.map(|s| s.as_str()))
        .bind(i64::from(event.automated))
        .bind(event.duration_ms.map(|d| i64::try_from(d).unwrap_or(i64::MAX)))
        .bind(event.error.as_deref())
        .execute(&self.pool)
        .await?;

        // Evict from the head once past capacity.
        sqlx::query("DELETE FROM events WHERE seq <= (SELECT MAX(seq) FROM events) - ?")
            .bind(self.capacity)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn query(&self, query: EventQuery) -> DomainResult<Vec<AutomationEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as("SELECT * FROM events ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut matched: Vec<AutomationEvent> = rows
            .into_iter()
            .map(AutomationEvent::try_from)
            .collect::<DomainResult<Vec<_>>>()?
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        Ok(matched)
    }

    async fn count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    async fn setup(capacity: usize) -> SqliteEventRepository {
        SqliteEventRepository::new(create_test_pool().await.unwrap(), capacity)
    }

    #[tokio::test]
    async fn test_append_and_query_roundtrip() {
        let store = setup(100).await;
        let task_id = Uuid::new_v4();
        let rule_id = Uuid::new_v4();

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
        store
            .append(&AutomationEvent::rule_executed(task_id, rule_id, 12))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 3);

        let events = store.query(EventQuery::new().task(task_id)).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::TaskCreated);
        assert_eq!(events[1].from_status, Some(TaskStatus::Todo));
        assert_eq!(events[2].rule_id, Some(rule_id));
        assert_eq!(events[2].duration_ms, Some(12));
    }

    #[tokio::test]
    async fn test_capacity_trims_head() {
        let store = setup(2).await;
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store
                .append(&AutomationEvent::task_created(*id, TaskStatus::Todo, false))
                .await
                .unwrap();
        }

        // Capacity keeps the most recent entries only.
        let events = store.query(EventQuery::new()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].task_id, ids[2]);
        assert_eq!(events[1].task_id, ids[3]);
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let store = setup(100).await;
        let task_id = Uuid::new_v4();
        store
            .append(&AutomationEvent::task_created(task_id, TaskStatus::Todo, false))
            .await
            .unwrap();
        store
            .append(&AutomationEvent::automation_failed(task_id, None, "boom"))
            .await
            .unwrap();

        let failures = store
            .query(EventQuery::new().kind(EventKind::AutomationFailed))
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.as_deref(), Some("boom"));
    }
}
