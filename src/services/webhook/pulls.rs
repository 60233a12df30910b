//! Pull-request lifecycle normalizer (GitHub-style payloads).
//!
//! Correlates on the PR head branch: tasks carry
//! `provider.pulls.id = <branch>` once an agent or user links them to
//! a branch. PR events never create tasks; an unknown branch is
//! dropped.

use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{provider_key, TaskPatch, TaskStatus};

use super::{Normalizer, ProviderAction, ProviderEvent};

#[derive(Debug, Deserialize)]
struct PullPayload {
    action: String,
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    merged: bool,
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Default)]
pub struct PullRequestNormalizer;

impl PullRequestNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Normalizer for PullRequestNormalizer {
    fn provider(&self) -> &str {
        "pulls"
    }

    fn signature_header(&self) -> &'static str {
        "x-hub-signature-256"
    }

    fn normalize(&self, payload: &serde_json::Value) -> DomainResult<Vec<ProviderEvent>> {
        let payload: PullPayload = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::Validation(format!("pull request payload: {e}")))?;

        let pr = payload.pull_request;
        let mut patch = TaskPatch::default().with_metadata_entry(
            provider_key("pulls", "number"),
            serde_json::json!(pr.number),
        );
        if let Some(ref url) = pr.html_url {
            patch = patch.with_metadata_entry(provider_key("pulls", "url"), serde_json::json!(url));
        }

        let (label, action) = match payload.action.as_str() {
            "opened" | "reopened" | "ready_for_review" => (
                "pull_request_opened".to_string(),
                ProviderAction::Status {
                    to: TaskStatus::InReview,
                    patch: Some(patch),
                },
            ),
            "closed" if pr.merged => (
                "pull_request_merged".to_string(),
                ProviderAction::Status {
                    to: TaskStatus::Done,
                    patch: Some(
                        patch.with_metadata_entry(
                            provider_key("pulls", "merged"),
                            serde_json::json!(true),
                        ),
                    ),
                },
            ),
            "closed" => (
                "pull_request_closed".to_string(),
                ProviderAction::Status {
                    to: TaskStatus::Blocked,
                    patch: Some(patch),
                },
            ),
            other => (
                format!("pull_request_{other}"),
                ProviderAction::Ignore {
                    reason: format!("unhandled pull request action '{other}'"),
                },
            ),
        };

        Ok(vec![ProviderEvent {
            external_id: pr.head.branch,
            label,
            action,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_one(payload: serde_json::Value) -> ProviderEvent {
        let events = PullRequestNormalizer::new().normalize(&payload).unwrap();
        assert_eq!(events.len(), 1);
        events.into_iter().next().unwrap()
    }

    #[test]
    fn test_opened_goes_to_review() {
        let event = normalize_one(serde_json::json!({
            "action": "opened",
            "pull_request": {
                "number": 42,
                "html_url": "https://example.com/pr/42",
                "head": { "ref": "feature/login" }
            }
        }));

        assert_eq!(event.external_id, "feature/login");
        assert_eq!(event.label, "pull_request_opened");
        match event.action {
            ProviderAction::Status { to, patch } => {
                assert_eq!(to, TaskStatus::InReview);
                let metadata = patch.unwrap().metadata.unwrap();
                assert_eq!(
                    metadata.get("provider.pulls.number"),
                    Some(&serde_json::json!(42))
                );
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_merged_completes_task() {
        let event = normalize_one(serde_json::json!({
            "action": "closed",
            "pull_request": {
                "number": 42,
                "merged": true,
                "head": { "ref": "feature/login" }
            }
        }));

        assert_eq!(event.label, "pull_request_merged");
        match event.action {
            ProviderAction::Status { to, .. } => assert_eq!(to, TaskStatus::Done),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_unmerged_blocks_task() {
        let event = normalize_one(serde_json::json!({
            "action": "closed",
            "pull_request": {
                "number": 42,
                "merged": false,
                "head": { "ref": "feature/login" }
            }
        }));

        match event.action {
            ProviderAction::Status { to, .. } => assert_eq!(to, TaskStatus::Blocked),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_unhandled_action_ignored() {
        let event = normalize_one(serde_json::json!({
            "action": "synchronize",
            "pull_request": {
                "number": 42,
                "head": { "ref": "feature/login" }
            }
        }));
        assert!(matches!(event.action, ProviderAction::Ignore { .. }));
    }
}
