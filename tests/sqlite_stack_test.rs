//! The full engine running on the SQLite adapters: task CRUD with
//! dispatch, rule persistence, and the bounded event log.

use std::sync::Arc;

use conveyor::adapters::sqlite::{
    create_test_pool, SqliteEventRepository, SqliteRuleRepository, SqliteTaskRepository,
};
use conveyor::domain::models::{
    AutomationConfig, AutomationRule, Condition, EventKind, EventQuery, RuleAction, TaskDraft,
    TaskPatch, TaskStatus, Trigger,
};
use conveyor::services::engine::AutomationEngine;
use conveyor::{EventStore, RuleRepository, TaskFilters, TaskRepository};

async fn sqlite_engine() -> (Arc<AutomationEngine>, Arc<dyn EventStore>) {
    let pool = create_test_pool().await.unwrap();

    let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let rules: Arc<dyn RuleRepository> = Arc::new(SqliteRuleRepository::new(pool.clone()));
    let events: Arc<dyn EventStore> = Arc::new(SqliteEventRepository::new(pool, 100));

    let engine = Arc::new(AutomationEngine::new(
        tasks,
        rules,
        Arc::clone(&events),
        AutomationConfig::default(),
    ));
    (engine, events)
}

#[tokio::test]
async fn test_assignment_rule_over_sqlite() {
    let (engine, events) = sqlite_engine().await;

    engine
        .add_rule(
            AutomationRule::new(
                "auto-start-on-assignment",
                Trigger::StatusChange {
                    from_status: None,
                    to_status: Some(TaskStatus::Todo),
                },
                RuleAction::ChangeStatus {
                    target: TaskStatus::InProgress,
                },
            )
            .with_condition(Condition::exists("assignee")),
        )
        .await
        .unwrap();

    let task = engine.create_task(TaskDraft::new("persisted")).await.unwrap();
    let updated = engine
        .update_task(task.id, TaskPatch::assignee("alice"))
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::InProgress);

    // The row survives a fresh read and the log shape matches the
    // memory backend's.
    let reloaded = engine.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::InProgress);
    assert_eq!(reloaded.assignee.as_deref(), Some("alice"));

    let transitions = events
        .query(EventQuery::new().kind(EventKind::StatusChanged))
        .await
        .unwrap();
    assert_eq!(transitions.len(), 1);
    assert!(transitions[0].automated);
}

#[tokio::test]
async fn test_rules_survive_reload() {
    let pool = create_test_pool().await.unwrap();
    let rules = SqliteRuleRepository::new(pool.clone());

    let rule = AutomationRule::new(
        "notify-on-block",
        Trigger::StatusChange {
            from_status: None,
            to_status: Some(TaskStatus::Blocked),
        },
        RuleAction::SendNotification { template: None },
    );
    rules.insert(&rule).await.unwrap();
    rules.set_enabled(rule.id, false).await.unwrap();

    // A second repository over the same pool sees the stored state.
    let reopened = SqliteRuleRepository::new(pool);
    let listed = reopened.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "notify-on-block");
    assert!(!listed[0].enabled);
}

#[tokio::test]
async fn test_metadata_correlation_lookup_over_sqlite() {
    let (engine, _) = sqlite_engine().await;

    let mut draft = TaskDraft::new("correlated");
    draft
        .metadata
        .insert("provider.agent.id".to_string(), serde_json::json!("run-9"));
    let task = engine.create_task(draft).await.unwrap();

    let found = engine
        .find_task_by_metadata("provider.agent.id", &serde_json::json!("run-9"))
        .await
        .unwrap();
    assert_eq!(found.map(|t| t.id), Some(task.id));

    let missing = engine
        .find_task_by_metadata("provider.agent.id", &serde_json::json!("run-10"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_event_log_capacity_enforced() {
    let pool = create_test_pool().await.unwrap();

    let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let rules: Arc<dyn RuleRepository> = Arc::new(SqliteRuleRepository::new(pool.clone()));
    let events: Arc<dyn EventStore> = Arc::new(SqliteEventRepository::new(pool, 5));

    let engine = AutomationEngine::new(tasks, rules, Arc::clone(&events), AutomationConfig::default());

    // Each create and each status flip appends one event; eight total.
    for i in 0..4 {
        let task = engine
            .create_task(TaskDraft::new(format!("t{i}")))
            .await
            .unwrap();
        engine
            .update_task(task.id, TaskPatch::status(TaskStatus::InProgress))
            .await
            .unwrap();
    }

    let retained = events.query(EventQuery::new()).await.unwrap();
    assert_eq!(retained.len(), 5);
    // The oldest entries were evicted; the newest survive.
    assert_eq!(retained.last().unwrap().kind, EventKind::StatusChanged);

    let all_tasks = engine.list_tasks(TaskFilters::default()).await.unwrap();
    assert_eq!(all_tasks.len(), 4);
}
