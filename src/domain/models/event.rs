//! Append-only automation event log entries.
//!
//! Events are the sole audit trail and the sole input to derived
//! metrics. They are created by the registry and rule engine, never
//! mutated, and may only be pruned from the head of the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskStatus;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    StatusChanged,
    RuleExecuted,
    AutomationFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskDeleted => "task_deleted",
            Self::StatusChanged => "status_changed",
            Self::RuleExecuted => "rule_executed",
            Self::AutomationFailed => "automation_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_created" => Some(Self::TaskCreated),
            "task_updated" => Some(Self::TaskUpdated),
            "task_deleted" => Some(Self::TaskDeleted),
            "status_changed" => Some(Self::StatusChanged),
            "rule_executed" => Some(Self::RuleExecuted),
            "automation_failed" => Some(Self::AutomationFailed),
            _ => None,
        }
    }
}

/// An immutable log entry describing one mutation or rule outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub task_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<TaskStatus>,
    /// True when the mutation originated from the rule engine rather
    /// than a caller or webhook.
    pub automated: bool,
    /// Rule execution duration, for `rule_executed` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AutomationEvent {
    fn base(kind: EventKind, task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            task_id,
            rule_id: None,
            from_status: None,
            to_status: None,
            automated: false,
            duration_ms: None,
            error: None,
        }
    }

    pub fn task_created(task_id: Uuid, to_status: TaskStatus, automated: bool) -> Self {
        Self {
            to_status: Some(to_status),
            automated,
            ..Self::base(EventKind::TaskCreated, task_id)
        }
    }

    pub fn task_updated(task_id: Uuid, automated: bool) -> Self {
        Self {
            automated,
            ..Self::base(EventKind::TaskUpdated, task_id)
        }
    }

    pub fn task_deleted(task_id: Uuid) -> Self {
        Self::base(EventKind::TaskDeleted, task_id)
    }

    pub fn status_changed(
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        automated: bool,
    ) -> Self {
        Self {
            from_status: Some(from),
            to_status: Some(to),
            automated,
            ..Self::base(EventKind::StatusChanged, task_id)
        }
    }

    pub fn rule_executed(task_id: Uuid, rule_id: Uuid, duration_ms: u64) -> Self {
        Self {
            rule_id: Some(rule_id),
            automated: true,
            duration_ms: Some(duration_ms),
            ..Self::base(EventKind::RuleExecuted, task_id)
        }
    }

    pub fn automation_failed(task_id: Uuid, rule_id: Option<Uuid>, error: impl Into<String>) -> Self {
        Self {
            rule_id,
            error: Some(error.into()),
            ..Self::base(EventKind::AutomationFailed, task_id)
        }
    }

    /// Rebase the timestamp, used by tests that need events at known
    /// offsets in the past.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Filter for event queries. All fields are optional conjuncts.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub task_id: Option<Uuid>,
    pub kind: Option<EventKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a single event against the filter.
    pub fn matches(&self, event: &AutomationEvent) -> bool {
        if let Some(task_id) = self.task_id {
            if event.task_id != task_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}
