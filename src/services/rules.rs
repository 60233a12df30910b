//! Trigger matching and condition evaluation.
//!
//! Pure functions over a rule and a task snapshot; the engine owns the
//! dispatch loop, this module owns the semantics of "does this rule
//! apply". Also home of the builtin rule set installed on startup.

use crate::domain::models::{
    AutomationRule, Condition, ConditionOperator, RuleAction, Task, TaskStatus, Trigger,
};

/// A concrete occurrence a rule may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// A task was created or updated. `from` is `None` on creation;
    /// `from == to` for mutations that did not move the status.
    StatusChange {
        from: Option<TaskStatus>,
        to: TaskStatus,
    },
    /// The last open completion criterion was just satisfied.
    CriteriaMet,
    /// All of the task's dependencies just reached terminal success.
    DependencyCompleted,
    /// A time-based schedule came due (scheduler sweep).
    TimeElapsed,
    /// A named canonical webhook event was ingested for the task.
    Webhook { event: String },
}

impl TriggerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatusChange { .. } => "status_change",
            Self::CriteriaMet => "criteria_met",
            Self::DependencyCompleted => "dependency_completed",
            Self::TimeElapsed => "time_based",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// Check whether a rule's trigger matches an event. Unset trigger
/// fields are wildcards.
pub fn trigger_matches(trigger: &Trigger, event: &TriggerEvent) -> bool {
    match (trigger, event) {
        (
            Trigger::StatusChange {
                from_status,
                to_status,
            },
            TriggerEvent::StatusChange { from, to },
        ) => {
            if let Some(required_from) = from_status {
                if *from != Some(*required_from) {
                    return false;
                }
            }
            if let Some(required_to) = to_status {
                if to != required_to {
                    return false;
                }
            }
            true
        }
        (Trigger::CriteriaMet, TriggerEvent::CriteriaMet) => true,
        (Trigger::DependencyCompleted, TriggerEvent::DependencyCompleted) => true,
        (Trigger::TimeBased { .. }, TriggerEvent::TimeElapsed) => true,
        (Trigger::Webhook { event: expected }, TriggerEvent::Webhook { event }) => {
            expected.as_ref().is_none_or(|e| e == event)
        }
        _ => false,
    }
}

/// Evaluate a rule's condition list as a logical AND over the task.
pub fn conditions_hold(conditions: &[Condition], task: &Task) -> bool {
    conditions.iter().all(|c| condition_holds(c, task))
}

fn condition_holds(condition: &Condition, task: &Task) -> bool {
    let field = task
        .field_value(&condition.field)
        .unwrap_or(serde_json::Value::Null);

    match condition.operator {
        ConditionOperator::Equals => field == condition.value,
        ConditionOperator::NotEquals => field != condition.value,
        ConditionOperator::GreaterThan => match (field.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        ConditionOperator::LessThan => match (field.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        ConditionOperator::Contains => {
            let Some(needle) = condition.value.as_str() else {
                return false;
            };
            match &field {
                serde_json::Value::String(s) => s.contains(needle),
                serde_json::Value::Array(items) => items.iter().any(|item| {
                    item.as_str().map_or_else(
                        || item.to_string().contains(needle),
                        |s| s.contains(needle),
                    )
                }),
                other => other.to_string().contains(needle),
            }
        }
        ConditionOperator::Exists => !field.is_null(),
        ConditionOperator::NotExists => field.is_null(),
    }
}

/// The default rule set, mirroring the stock automations a fresh board
/// starts with.
pub fn builtin_rules() -> Vec<AutomationRule> {
    vec![
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
        .with_description("Move a task to in_progress as soon as it has an assignee")
        .with_condition(Condition::exists("assignee")),
        AutomationRule::new(
            "auto-complete-on-criteria",
            Trigger::CriteriaMet,
            RuleAction::ChangeStatus {
                target: TaskStatus::Done,
            },
        )
        .with_description("Move a task to done when every completion criterion is satisfied"),
        AutomationRule::new(
            "auto-start-on-dependencies",
            Trigger::DependencyCompleted,
            RuleAction::ChangeStatus {
                target: TaskStatus::InProgress,
            },
        )
        .with_description("Start a waiting task once all of its dependencies are done")
        .with_condition(Condition::new(
            "status",
            ConditionOperator::Equals,
            serde_json::json!("todo"),
        )),
        AutomationRule::new(
            "notify-on-blocked",
            Trigger::StatusChange {
                from_status: None,
                to_status: Some(TaskStatus::Blocked),
            },
            RuleAction::SendNotification {
                template: Some("Task blocked and needs attention".to_string()),
            },
        )
        .with_description("Raise a notification whenever a task becomes blocked"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskPriority;

    #[test]
    fn test_status_change_wildcards() {
        let trigger = Trigger::StatusChange {
            from_status: None,
            to_status: Some(TaskStatus::Todo),
        };

        assert!(trigger_matches(
            &trigger,
            &TriggerEvent::StatusChange {
                from: None,
                to: TaskStatus::Todo
            }
        ));
        assert!(trigger_matches(
            &trigger,
            &TriggerEvent::StatusChange {
                from: Some(TaskStatus::Blocked),
                to: TaskStatus::Todo
            }
        ));
        assert!(!trigger_matches(
            &trigger,
            &TriggerEvent::StatusChange {
                from: None,
                to: TaskStatus::Done
            }
        ));
    }

    #[test]
    fn test_from_status_requires_previous() {
        let trigger = Trigger::StatusChange {
            from_status: Some(TaskStatus::Todo),
            to_status: None,
        };

        // Creation has no previous status, so a from-constrained
        // trigger cannot match it.
        assert!(!trigger_matches(
            &trigger,
            &TriggerEvent::StatusChange {
                from: None,
                to: TaskStatus::Todo
            }
        ));
        assert!(trigger_matches(
            &trigger,
            &TriggerEvent::StatusChange {
                from: Some(TaskStatus::Todo),
                to: TaskStatus::InProgress
            }
        ));
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        assert!(!trigger_matches(
            &Trigger::CriteriaMet,
            &TriggerEvent::DependencyCompleted
        ));
        assert!(!trigger_matches(
            &Trigger::DependencyCompleted,
            &TriggerEvent::StatusChange {
                from: None,
                to: TaskStatus::Todo
            }
        ));
    }

    #[test]
    fn test_webhook_event_matching() {
        let any = Trigger::Webhook { event: None };
        let named = Trigger::Webhook {
            event: Some("task_updated".to_string()),
        };
        let event = TriggerEvent::Webhook {
            event: "task_updated".to_string(),
        };
        let other = TriggerEvent::Webhook {
            event: "task_deleted".to_string(),
        };

        assert!(trigger_matches(&any, &event));
        assert!(trigger_matches(&named, &event));
        assert!(!trigger_matches(&named, &other));
    }

    #[test]
    fn test_condition_operators() {
        let task = Task::new("Fix login flow")
            .with_assignee("alice")
            .with_priority(TaskPriority::High)
            .with_metadata("provider.agent.id", serde_json::json!("run-1"));
        let mut task = task;
        task.estimated_hours = Some(12.0);
        task.tags = vec!["backend".to_string(), "auth".to_string()];

        assert!(condition_holds(
            &Condition::new("assignee", ConditionOperator::Equals, serde_json::json!("alice")),
            &task
        ));
        assert!(condition_holds(
            &Condition::new(
                "status",
                ConditionOperator::NotEquals,
                serde_json::json!("done")
            ),
            &task
        ));
        assert!(condition_holds(
            &Condition::new(
                "estimated_hours",
                ConditionOperator::GreaterThan,
                serde_json::json!(10)
            ),
            &task
        ));
        assert!(!condition_holds(
            &Condition::new(
                "estimated_hours",
                ConditionOperator::LessThan,
                serde_json::json!(10)
            ),
            &task
        ));
        assert!(condition_holds(
            &Condition::new("title", ConditionOperator::Contains, serde_json::json!("login")),
            &task
        ));
        assert!(condition_holds(
            &Condition::new("tags", ConditionOperator::Contains, serde_json::json!("auth")),
            &task
        ));
        assert!(condition_holds(
            &Condition::exists("metadata.provider.agent.id"),
            &task
        ));
        assert!(condition_holds(
            &Condition::new(
                "due_date",
                ConditionOperator::NotExists,
                serde_json::Value::Null
            ),
            &task
        ));
    }

    #[test]
    fn test_missing_field_comparisons() {
        let task = Task::new("Bare");

        // Missing fields compare as null.
        assert!(!condition_holds(&Condition::exists("assignee"), &task));
        assert!(condition_holds(
            &Condition::new(
                "assignee",
                ConditionOperator::NotEquals,
                serde_json::json!("alice")
            ),
            &task
        ));
        assert!(!condition_holds(
            &Condition::new(
                "estimated_hours",
                ConditionOperator::GreaterThan,
                serde_json::json!(1)
            ),
            &task
        ));
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let task = Task::new("Task").with_assignee("alice");
        let passing = vec![
            Condition::exists("assignee"),
            Condition::new("status", ConditionOperator::Equals, serde_json::json!("todo")),
        ];
        let failing = vec![
            Condition::exists("assignee"),
            Condition::new("status", ConditionOperator::Equals, serde_json::json!("done")),
        ];

        assert!(conditions_hold(&passing, &task));
        assert!(!conditions_hold(&failing, &task));
        assert!(conditions_hold(&[], &task));
    }

    #[test]
    fn test_builtin_rules_validate() {
        let rules = builtin_rules();
        assert!(rules.len() >= 4);
        assert!(rules.iter().all(|r| r.enabled));
        assert!(rules.iter().all(|r| r.validate().is_ok()));
        assert_eq!(rules[0].name, "auto-start-on-assignment");
    }
}
