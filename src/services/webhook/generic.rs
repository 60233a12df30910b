//! Generic task webhook normalizer.
//!
//! Canonical `{event, task, previous_task?}` shape for system-to-system
//! sync: another instance (or any conforming producer) mirrors whole
//! tasks across.

use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskDraft, TaskPatch, TaskPriority, TaskStatus};

use super::{Normalizer, ProviderAction, ProviderEvent};

#[derive(Debug, Deserialize)]
struct GenericPayload {
    event: String,
    task: RemoteTaskShape,
    #[serde(default, rename = "previous_task")]
    _previous_task: Option<RemoteTaskShape>,
}

/// The mirrored task. Identifier is the sender's, never reused locally.
#[derive(Debug, Deserialize)]
struct RemoteTaskShape {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct GenericNormalizer;

impl GenericNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn parse_status(status: Option<&str>) -> Option<TaskStatus> {
        status.and_then(TaskStatus::from_str)
    }
}

impl Normalizer for GenericNormalizer {
    fn provider(&self) -> &str {
        "generic"
    }

    fn normalize(&self, payload: &serde_json::Value) -> DomainResult<Vec<ProviderEvent>> {
        let payload: GenericPayload = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::Validation(format!("generic payload: {e}")))?;

        let remote = payload.task;
        let external_id = remote.id.clone();

        let action = match payload.event.as_str() {
            "task_created" => {
                let draft = TaskDraft {
                    title: remote
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Imported task {external_id}")),
                    description: remote.description.clone(),
                    status: Self::parse_status(remote.status.as_deref()).unwrap_or_default(),
                    priority: remote
                        .priority
                        .as_deref()
                        .and_then(TaskPriority::from_str)
                        .unwrap_or_default(),
                    assignee: remote.assignee.clone(),
                    tags: remote.tags.clone().unwrap_or_default(),
                    ..TaskDraft::default()
                };
                ProviderAction::Started { draft }
            }
            "task_updated" | "status_changed" => {
                let patch = TaskPatch {
                    title: remote.title.clone(),
                    description: remote.description.clone(),
                    status: Self::parse_status(remote.status.as_deref()),
                    priority: remote.priority.as_deref().and_then(TaskPriority::from_str),
                    assignee: remote.assignee.clone(),
                    tags: remote.tags.clone(),
                    ..TaskPatch::default()
                };
                ProviderAction::Update { patch }
            }
            "task_deleted" => ProviderAction::Deleted,
            other => ProviderAction::Ignore {
                reason: format!("unhandled generic event '{other}'"),
            },
        };

        Ok(vec![ProviderEvent {
            external_id,
            label: payload.event,
            action,
        }])
    }
}
