//! SQLite implementation of the `RuleRepository` port.
//!
//! Trigger, conditions, and action are stored as JSON; the serde tag
//! format is the persistence format.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AutomationRule;
use crate::domain::ports::RuleRepository;

#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    name: String,
    description: String,
    trigger: String,
    conditions: String,
    action: String,
    enabled: i64,
    created_at: String,
}

impl TryFrom<RuleRow> for AutomationRule {
    type Error = DomainError;

    fn try_from(row: RuleRow) -> DomainResult<Self> {
        Ok(AutomationRule {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Database(format!("invalid rule id: {e}")))?,
            name: row.name,
            description: row.description,
            trigger: serde_json::from_str(&row.trigger)?,
            conditions: serde_json::from_str(&row.conditions)?,
            action: serde_json::from_str(&row.action)?,
            enabled: row.enabled != 0,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DomainError::Database(format!("invalid created_at: {e}")))?,
        })
    }
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    async fn insert(&self, rule: &AutomationRule) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_rules (id, name, description, trigger, conditions, action, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.id.to_string())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(serde_json::to_string(&rule.trigger)?)
        .bind(serde_json::to_string(&rule.conditions)?)
        .bind(serde_json::to_string(&rule.action)?)
        .bind(i64::from(rule.enabled))
        .bind(rule.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        let row: Option<RuleRow> = sqlx::query_as("SELECT * FROM automation_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(AutomationRule::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM automation_rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> =
            sqlx::query_as("SELECT * FROM automation_rules ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(AutomationRule::try_from).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE automation_rules SET enabled = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;
    use crate::domain::models::{Condition, RuleAction, TaskStatus, Trigger};

    async fn setup() -> SqliteRuleRepository {
        SqliteRuleRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_definition() {
        let repo = setup().await;
        let rule = AutomationRule::new(
            "auto-start",
            Trigger::StatusChange {
                from_status: None,
                to_status: Some(TaskStatus::Todo),
            },
            RuleAction::ChangeStatus {
                target: TaskStatus::InProgress,
            },
        )
        .with_description("starts assigned tasks")
        .with_condition(Condition::exists("assignee"));

        repo.insert(&rule).await.unwrap();
        let fetched = repo.get(rule.id).await.unwrap().unwrap();

        assert_eq!(fetched.name, rule.name);
        assert_eq!(fetched.trigger, rule.trigger);
        assert_eq!(fetched.conditions, rule.conditions);
        assert_eq!(fetched.action, rule.action);
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn test_set_enabled_and_delete() {
        let repo = setup().await;
        let rule = AutomationRule::new(
            "toggle",
            Trigger::CriteriaMet,
            RuleAction::SendNotification { template: None },
        );
        repo.insert(&rule).await.unwrap();

        assert!(repo.set_enabled(rule.id, false).await.unwrap());
        assert!(!repo.get(rule.id).await.unwrap().unwrap().enabled);
        assert!(!repo.set_enabled(Uuid::new_v4(), true).await.unwrap());

        assert!(repo.delete(rule.id).await.unwrap());
        assert!(repo.get(rule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let repo = setup().await;
        for name in ["first", "second", "third"] {
            repo.insert(&AutomationRule::new(
                name,
                Trigger::CriteriaMet,
                RuleAction::SendNotification { template: None },
            ))
            .await
            .unwrap();
        }

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
