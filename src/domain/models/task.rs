//! Task domain model.
//!
//! Tasks are the unit of work the automation engine tracks. Their status
//! moves through a kanban-style state machine; completion criteria and
//! dependencies gate the automated transitions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but work has not started
    Todo,
    /// Task is actively being worked
    InProgress,
    /// Work finished, awaiting review
    InReview,
    /// Task cannot proceed
    Blocked,
    /// Task completed successfully
    Done,
    /// Task was abandoned
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "todo" | "to_do" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "blocked" => Some(Self::Blocked),
            "done" | "complete" | "completed" => Some(Self::Done),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Check if this is the terminal-success state that satisfies
    /// dependents waiting on this task.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// All statuses, in board order.
    pub fn all() -> [TaskStatus; 6] {
        [
            Self::Todo,
            Self::InProgress,
            Self::InReview,
            Self::Blocked,
            Self::Done,
            Self::Cancelled,
        ]
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// How a completion criterion is expected to be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Manual,
    Automated,
    Deadline,
    Dependency,
}

impl Default for CriterionKind {
    fn default() -> Self {
        Self::Manual
    }
}

/// A named boolean check that must pass before a task counts as complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCriterion {
    pub id: Uuid,
    pub description: String,
    #[serde(default)]
    pub kind: CriterionKind,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompletionCriterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            kind: CriterionKind::Manual,
            completed: false,
            completed_at: None,
        }
    }

    pub fn with_kind(mut self, kind: CriterionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A unit of work tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Optional longer description
    pub description: Option<String>,
    /// Current status
    pub status: TaskStatus,
    /// Priority
    pub priority: TaskPriority,
    /// Assigned user, if any
    pub assignee: Option<String>,
    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Estimated effort in hours
    pub estimated_hours: Option<f64>,
    /// Actual effort in hours
    pub actual_hours: Option<f64>,
    /// Ordered list of independently completable checks
    pub completion_criteria: Vec<CompletionCriterion>,
    /// Task ids that must reach `done` before this task may leave `todo`
    pub dependencies: Vec<Uuid>,
    /// Flat key-value bag; external correlation ids live under
    /// `provider.<name>.<field>` keys
    pub metadata: HashMap<String, serde_json::Value>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last mutated; monotonically non-decreasing
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            assignee: None,
            due_date: None,
            tags: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
            completion_criteria: Vec::new(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.dependencies.contains(&task_id) && task_id != self.id {
            self.dependencies.push(task_id);
        }
        self
    }

    pub fn with_criterion(mut self, criterion: CompletionCriterion) -> Self {
        self.completion_criteria.push(criterion);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when the task has criteria and every one is satisfied.
    pub fn all_criteria_met(&self) -> bool {
        !self.completion_criteria.is_empty()
            && self.completion_criteria.iter().all(|c| c.completed)
    }

    /// Refresh `updated_at`, keeping it monotonically non-decreasing even
    /// if the wall clock steps backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Resolve a dotted field path against the task's JSON projection.
    ///
    /// `metadata.provider.trello.id` first tries the flat metadata key
    /// `provider.trello.id` (correlation keys are stored flat), then
    /// falls back to walking the nested JSON structure.
    pub fn field_value(&self, path: &str) -> Option<serde_json::Value> {
        if let Some(rest) = path.strip_prefix("metadata.") {
            if let Some(v) = self.metadata.get(rest) {
                return Some(v.clone());
            }
        }

        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }

    /// Validate task invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.dependencies.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        Ok(())
    }
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub completion_criteria: Vec<CompletionCriterion>,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Materialize the draft into a task.
    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.title).with_status(self.status);
        task.description = self.description;
        task.priority = self.priority;
        task.assignee = self.assignee;
        task.due_date = self.due_date;
        task.tags = self.tags;
        task.estimated_hours = self.estimated_hours;
        task.completion_criteria = self.completion_criteria;
        task.dependencies = self.dependencies;
        task.metadata = self.metadata;
        task
    }
}

/// Partial update applied to an existing task. `None` fields are left
/// untouched; `metadata` entries are merged over the existing map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn assignee(assignee: impl Into<String>) -> Self {
        Self {
            assignee: Some(assignee.into()),
            ..Self::default()
        }
    }

    pub fn metadata_entry(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut map = HashMap::new();
        map.insert(key.into(), value);
        Self {
            metadata: Some(map),
            ..Self::default()
        }
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// True when applying this patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
            && self.estimated_hours.is_none()
            && self.actual_hours.is_none()
            && self.metadata.is_none()
    }

    /// Apply the patch in place. Does not touch `updated_at`; the
    /// registry owns timestamp maintenance.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(ref assignee) = self.assignee {
            task.assignee = Some(assignee.clone());
        }
        if let Some(due) = self.due_date {
            task.due_date = Some(due);
        }
        if let Some(ref tags) = self.tags {
            task.tags = tags.clone();
        }
        if let Some(estimated) = self.estimated_hours {
            task.estimated_hours = Some(estimated);
        }
        if let Some(actual) = self.actual_hours {
            task.actual_hours = Some(actual);
        }
        if let Some(ref entries) = self.metadata {
            for (key, value) in entries {
                task.metadata.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in TaskStatus::all() {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("completed"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::from_str("unknown"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Done.is_terminal_success());
        assert!(!TaskStatus::Cancelled.is_terminal_success());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn test_task_builder() {
        let dep = Uuid::new_v4();
        let task = Task::new("Ship release")
            .with_description("Cut and publish v1.2")
            .with_priority(TaskPriority::High)
            .with_assignee("alice")
            .with_dependency(dep);

        assert_eq!(task.title, "Ship release");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.assignee.as_deref(), Some("alice"));
        assert_eq!(task.dependencies, vec![dep]);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut task = Task::new("Task");
        let id = task.id;
        task.dependencies.push(id);
        assert!(task.validate().is_err());

        // The builder silently refuses self-dependencies.
        let task = Task::new("Task");
        let id = task.id;
        let task = task.with_dependency(id);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_all_criteria_met() {
        let mut task = Task::new("Task").with_criterion(CompletionCriterion::new("tests pass"));
        assert!(!task.all_criteria_met());
        task.completion_criteria[0].completed = true;
        assert!(task.all_criteria_met());

        // A task without criteria never reports "all met".
        let bare = Task::new("Bare");
        assert!(!bare.all_criteria_met());
    }

    #[test]
    fn test_field_value_resolution() {
        let task = Task::new("Task")
            .with_assignee("bob")
            .with_metadata("provider.trello.id", serde_json::json!("card-9"));

        assert_eq!(task.field_value("assignee"), Some(serde_json::json!("bob")));
        assert_eq!(
            task.field_value("metadata.provider.trello.id"),
            Some(serde_json::json!("card-9"))
        );
        assert_eq!(task.field_value("status"), Some(serde_json::json!("todo")));
        assert_eq!(task.field_value("due_date"), None);
        assert_eq!(task.field_value("nonexistent.path"), None);
    }

    #[test]
    fn test_patch_apply_merges_metadata() {
        let mut task =
            Task::new("Task").with_metadata("provider.trello.id", serde_json::json!("c1"));
        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            metadata: Some(
                [("provider.github.pr".to_string(), serde_json::json!(42))]
                    .into_iter()
                    .collect(),
            ),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.metadata.len(), 2);
        assert_eq!(task.metadata["provider.trello.id"], serde_json::json!("c1"));
    }

    #[test]
    fn test_draft_into_task() {
        let draft = TaskDraft {
            title: "From draft".to_string(),
            status: TaskStatus::InProgress,
            priority: TaskPriority::Urgent,
            ..TaskDraft::default()
        };
        let task = draft.into_task();
        assert_eq!(task.title, "From draft");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::Urgent);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut task = Task::new("Task");
        let before = task.updated_at;
        task.touch();
        assert!(task.updated_at >= before);
    }
}
