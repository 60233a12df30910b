//! Coding-agent webhook normalizer.
//!
//! Translates run-status events from a background coding agent into
//! canonical status changes. The agent's run vocabulary maps through a
//! fixed table onto the task status enum; states the table does not
//! know are tolerated as no-ops so third-party protocol drift never
//! becomes an error.

use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{provider_key, TaskDraft, TaskPatch, TaskStatus};

use super::{Normalizer, ProviderAction, ProviderEvent};

/// Run-status payload sent by the agent runner.
#[derive(Debug, Deserialize)]
struct AgentPayload {
    agent_id: String,
    status: String,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    pull_request_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default)]
pub struct AgentNormalizer;

impl AgentNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Fixed mapping from agent run states to task statuses.
    fn map_status(status: &str) -> Option<TaskStatus> {
        match status.to_lowercase().as_str() {
            "pending" | "queued" => Some(TaskStatus::Todo),
            "running" => Some(TaskStatus::InProgress),
            // A finished run means the change is up for review.
            "completed" => Some(TaskStatus::InReview),
            "failed" | "cancelled" | "timeout" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

impl Normalizer for AgentNormalizer {
    fn provider(&self) -> &str {
        "agent"
    }

    fn normalize(&self, payload: &serde_json::Value) -> DomainResult<Vec<ProviderEvent>> {
        let payload: AgentPayload = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::Validation(format!("agent payload: {e}")))?;

        let label = format!("agent_{}", payload.status.to_lowercase());

        let Some(to) = Self::map_status(&payload.status) else {
            return Ok(vec![ProviderEvent {
                external_id: payload.agent_id,
                label,
                action: ProviderAction::Ignore {
                    reason: format!("unmapped agent state '{}'", payload.status),
                },
            }]);
        };

        // Only a running agent represents "work started"; every other
        // state merely asserts status on an already-tracked task.
        let action = if to == TaskStatus::InProgress {
            let repository = payload.repository.clone().unwrap_or_default();
            let mut draft = TaskDraft {
                title: format!("Agent run: {repository}"),
                description: Some(format!(
                    "Tracked automatically from coding agent {}",
                    payload.agent_id
                )),
                status: TaskStatus::InProgress,
                ..TaskDraft::default()
            };
            if let Some(ref repository) = payload.repository {
                draft.metadata.insert(
                    provider_key("agent", "repository"),
                    serde_json::json!(repository),
                );
            }
            if let Some(ref branch) = payload.branch {
                draft
                    .metadata
                    .insert(provider_key("agent", "branch"), serde_json::json!(branch));
            }
            ProviderAction::Started { draft }
        } else {
            let mut patch = TaskPatch::default();
            if let Some(ref url) = payload.pull_request_url {
                patch = patch.with_metadata_entry(
                    provider_key("agent", "pull_request_url"),
                    serde_json::json!(url),
                );
            }
            if let Some(ref error) = payload.error {
                patch = patch
                    .with_metadata_entry(provider_key("agent", "error"), serde_json::json!(error));
            }
            ProviderAction::Status {
                to,
                patch: (!patch.is_empty()).then_some(patch),
            }
        };

        Ok(vec![ProviderEvent {
            external_id: payload.agent_id,
            label,
            action,
        }])
    }
}
