//! Automation rule model.
//!
//! An `AutomationRule` pairs a declarative trigger with a condition list
//! and a single action. Rules are immutable after registration except
//! for their `enabled` flag; changing anything else is delete+recreate.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{TaskDraft, TaskPriority, TaskStatus};

/// Declarative matcher describing which category of event a rule
/// responds to. Unset fields are wildcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// A task entered a status (or was created into one).
    StatusChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_status: Option<TaskStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_status: Option<TaskStatus>,
    },
    /// Every completion criterion on a task just became satisfied.
    CriteriaMet,
    /// A dependency of the task just reached terminal success and no
    /// other dependency remains open.
    DependencyCompleted,
    /// Fires on an interval schedule, evaluated by the scheduler sweep.
    TimeBased {
        /// Interval grammar: `every <n><s|m|h>`, e.g. `every 10m`.
        schedule: String,
    },
    /// A named canonical webhook event was ingested for the task.
    Webhook {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

impl Trigger {
    /// Discriminant name, used in logs and validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatusChange { .. } => "status_change",
            Self::CriteriaMet => "criteria_met",
            Self::DependencyCompleted => "dependency_completed",
            Self::TimeBased { .. } => "time_based",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// Comparison applied between a task field and a condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
    NotExists,
}

/// A field/operator/value predicate evaluated against a task before a
/// rule's action runs. Fields are dotted paths (`metadata.provider.x`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, ConditionOperator::Exists, serde_json::Value::Null)
    }
}

/// Template for tasks spawned by a `CreateTask` action. Unset fields
/// fall back to values derived from the triggering task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskTemplate {
    /// Build the draft for a spawned task, defaulting the title to a
    /// follow-up of the triggering task.
    pub fn to_draft(&self, source_title: &str) -> TaskDraft {
        TaskDraft {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| format!("Follow-up for {source_title}")),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            assignee: self.assignee.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            ..TaskDraft::default()
        }
    }
}

/// The effect a rule produces once triggered and its conditions pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Move the task to a target status.
    ChangeStatus { target: TaskStatus },
    /// Reassign the task.
    AssignUser { assignee: String },
    /// Send a notification through the configured notifier.
    SendNotification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
    /// Spawn a new task from a template.
    CreateTask { template: TaskTemplate },
    /// Push the task to an external system binding, out-of-band.
    UpdateExternalSystem { binding: String },
}

impl RuleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChangeStatus { .. } => "change_status",
            Self::AssignUser { .. } => "assign_user",
            Self::SendNotification { .. } => "send_notification",
            Self::CreateTask { .. } => "create_task",
            Self::UpdateExternalSystem { .. } => "update_external_system",
        }
    }
}

/// A named, independently enabled automation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AutomationRule {
    pub fn new(name: impl Into<String>, trigger: Trigger, action: RuleAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            trigger,
            conditions: Vec::new(),
            action,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate the rule definition. Malformed rules are rejected at
    /// registration time, never silently accepted.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Rule name cannot be empty".to_string());
        }

        if let Trigger::TimeBased { ref schedule } = self.trigger {
            parse_schedule(schedule)?;
        }

        match &self.action {
            RuleAction::AssignUser { assignee } if assignee.trim().is_empty() => {
                return Err("assign_user action requires a non-empty assignee".to_string());
            }
            RuleAction::UpdateExternalSystem { binding } if binding.trim().is_empty() => {
                return Err(
                    "update_external_system action requires a binding name".to_string()
                );
            }
            _ => {}
        }

        for condition in &self.conditions {
            if condition.field.trim().is_empty() {
                return Err("Condition field path cannot be empty".to_string());
            }
            match condition.operator {
                ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
                    if !condition.value.is_number() {
                        return Err(format!(
                            "Condition on '{}' requires a numeric value for ordering comparison",
                            condition.field
                        ));
                    }
                }
                ConditionOperator::Contains => {
                    if !condition.value.is_string() {
                        return Err(format!(
                            "Condition on '{}' requires a string value for contains",
                            condition.field
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Parse the `every <n><s|m|h>` interval grammar used by time-based
/// triggers.
pub fn parse_schedule(schedule: &str) -> Result<Duration, String> {
    let spec = schedule
        .trim()
        .strip_prefix("every")
        .ok_or_else(|| format!("Invalid schedule '{schedule}': expected 'every <n><s|m|h>'"))?
        .trim();

    if spec.is_empty() {
        return Err(format!("Invalid schedule '{schedule}': missing interval"));
    }

    let (digits, unit) = spec.split_at(spec.len() - 1);
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("Invalid schedule '{schedule}': bad interval '{spec}'"))?;
    if n == 0 {
        return Err(format!("Invalid schedule '{schedule}': interval must be positive"));
    }

    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        other => {
            return Err(format!(
                "Invalid schedule '{schedule}': unknown unit '{other}'"
            ))
        }
    };

    Ok(Duration::from_secs(secs))
}
