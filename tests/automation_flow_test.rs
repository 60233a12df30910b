//! End-to-end automation flows across the API facade, rule engine, and
//! webhook layer.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use conveyor::domain::models::{
    AutomationRule, Condition, EventKind, EventQuery, RuleAction, TaskDraft, TaskPatch,
    TaskStatus, Trigger,
};
use conveyor::domain::ports::EventStore;
use conveyor::services::webhook::AgentNormalizer;

fn auto_start_rule() -> AutomationRule {
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
    .with_condition(Condition::exists("assignee"))
}

#[tokio::test]
async fn test_assignment_scenario_event_log_shape() {
    let stack = common::stack();
    assert!(stack.api.add_automation_rule(auto_start_rule()).await.success);

    let task = stack
        .api
        .create_task(TaskDraft::new("T1"))
        .await
        .data
        .unwrap();
    assert_eq!(task.status, TaskStatus::Todo);

    let updated = stack
        .api
        .update_task(task.id, TaskPatch::assignee("alice"))
        .await
        .data
        .unwrap();
    assert_eq!(updated.status, TaskStatus::InProgress);

    // The log carries the manual creation and exactly one automated
    // transition produced by the rule.
    let log = stack.events.query(EventQuery::new().task(task.id)).await.unwrap();
    assert_eq!(log[0].kind, EventKind::TaskCreated);
    assert!(!log[0].automated);

    let transitions: Vec<_> = log
        .iter()
        .filter(|e| e.kind == EventKind::StatusChanged)
        .collect();
    assert_eq!(transitions.len(), 1);
    assert!(transitions[0].automated);
    assert_eq!(transitions[0].from_status, Some(TaskStatus::Todo));
    assert_eq!(transitions[0].to_status, Some(TaskStatus::InProgress));
}

#[tokio::test]
async fn test_webhook_label_rule_assigns_reviewer() {
    let stack = common::stack();
    stack
        .webhooks
        .register_endpoint("/webhooks/agent", Arc::new(AgentNormalizer::new()), None)
        .await;

    // When the agent finishes, route the review to bob.
    assert!(
        stack
            .api
            .add_automation_rule(AutomationRule::new(
                "route-finished-runs",
                Trigger::Webhook {
                    event: Some("agent_completed".to_string()),
                },
                RuleAction::AssignUser {
                    assignee: "bob".to_string(),
                },
            ))
            .await
            .success
    );

    let start = br#"{"agent_id": "run-1", "status": "running", "repository": "org/api"}"#;
    stack
        .webhooks
        .process("/webhooks/agent", start, &HashMap::new())
        .await;

    let done = br#"{"agent_id": "run-1", "status": "completed"}"#;
    let response = stack
        .webhooks
        .process("/webhooks/agent", done, &HashMap::new())
        .await;
    assert!(response.success);

    let tasks = stack
        .engine
        .list_tasks(conveyor::TaskFilters::default())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::InReview);
    assert_eq!(tasks[0].assignee.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_failing_rule_does_not_block_webhook_or_siblings() {
    let stack = common::stack();
    stack
        .webhooks
        .register_endpoint("/webhooks/agent", Arc::new(AgentNormalizer::new()), None)
        .await;

    // First rule pushes to a binding that was never configured and
    // fails; the second must still fire.
    assert!(
        stack
            .api
            .add_automation_rule(AutomationRule::new(
                "push-to-missing-binding",
                Trigger::StatusChange {
                    from_status: None,
                    to_status: Some(TaskStatus::InProgress),
                },
                RuleAction::UpdateExternalSystem {
                    binding: "nowhere".to_string(),
                },
            ))
            .await
            .success
    );
    assert!(
        stack
            .api
            .add_automation_rule(AutomationRule::new(
                "tag-active-runs",
                Trigger::StatusChange {
                    from_status: None,
                    to_status: Some(TaskStatus::InProgress),
                },
                RuleAction::AssignUser {
                    assignee: "triage".to_string(),
                },
            ))
            .await
            .success
    );

    let body = br#"{"agent_id": "run-2", "status": "running", "repository": "org/api"}"#;
    let response = stack
        .webhooks
        .process("/webhooks/agent", body, &HashMap::new())
        .await;
    assert!(response.success);

    let tasks = stack
        .engine
        .list_tasks(conveyor::TaskFilters::default())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].assignee.as_deref(), Some("triage"));

    let failures = stack
        .events
        .query(EventQuery::new().kind(EventKind::AutomationFailed))
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.as_ref().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_dependency_gate_survives_webhook_driven_rules() {
    let stack = common::stack();
    assert!(stack.api.add_automation_rule(auto_start_rule()).await.success);

    let dep = stack
        .api
        .create_task(TaskDraft::new("dep"))
        .await
        .data
        .unwrap();
    let gated = stack
        .api
        .create_task(TaskDraft {
            title: "gated".to_string(),
            assignee: Some("alice".to_string()),
            dependencies: vec![dep.id],
            ..TaskDraft::default()
        })
        .await
        .data
        .unwrap();

    // The rule matched on creation but the dependency gate held.
    assert_eq!(gated.status, TaskStatus::Todo);

    // Completing the dependency does not retroactively start it; the
    // next matching event does.
    stack
        .api
        .update_task(dep.id, TaskPatch::status(TaskStatus::Done))
        .await
        .data
        .unwrap();
    let after = stack
        .api
        .update_task(gated.id, TaskPatch::assignee("alice"))
        .await
        .data
        .unwrap();
    assert_eq!(after.status, TaskStatus::InProgress);
}
