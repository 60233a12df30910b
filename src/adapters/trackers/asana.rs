//! Asana project tracker.
//!
//! Asana models completion as a boolean rather than a column, so only
//! `done` round-trips through `completed`; the richer status lives in
//! the local registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExternalBinding, Task, TaskDraft, TaskStatus};
use crate::domain::ports::RemoteTracker;

use super::RateLimiter;

const ASANA_API_BASE: &str = "https://app.asana.com/api/1.0";

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct AsanaTask {
    gid: String,
    name: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    completed: bool,
}

pub struct AsanaTracker {
    binding: ExternalBinding,
    http: Client,
    base_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl AsanaTracker {
    pub fn new(binding: ExternalBinding) -> Self {
        Self {
            binding,
            http: Client::new(),
            base_url: ASANA_API_BASE.to_string(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(150, Duration::from_secs(60)))),
        }
    }

    /// Point the client at a different API base; used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn error(&self, reason: impl Into<String>) -> DomainError {
        DomainError::ExternalSystem {
            binding: self.binding.name.clone(),
            reason: reason.into(),
        }
    }

    async fn check(&self, resp: reqwest::Response, op: &str) -> DomainResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(self.error(format!("{op} returned {status}: {body}")))
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.binding.api_token)
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl RemoteTracker for AsanaTracker {
    fn provider(&self) -> &str {
        &self.binding.name
    }

    async fn create_remote(&self, task: &Task) -> DomainResult<String> {
        self.rate_limiter.lock().await.acquire().await;

        let body = serde_json::json!({
            "data": {
                "name": task.title,
                "notes": task.description.clone().unwrap_or_default(),
                "projects": [self.binding.container_id],
                "completed": task.status == TaskStatus::Done,
            }
        });

        let resp = self
            .request(reqwest::Method::POST, format!("{}/tasks", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(format!("create task request failed: {e}")))?;
        let resp = self.check(resp, "create task").await?;

        let created: DataEnvelope<AsanaTask> = resp
            .json()
            .await
            .map_err(|e| self.error(format!("create task parse failed: {e}")))?;
        Ok(created.data.gid)
    }

    async fn update_remote(&self, external_id: &str, task: &Task) -> DomainResult<()> {
        self.rate_limiter.lock().await.acquire().await;

        let body = serde_json::json!({
            "data": {
                "name": task.title,
                "notes": task.description.clone().unwrap_or_default(),
                "completed": task.status == TaskStatus::Done,
            }
        });

        let resp = self
            .request(
                reqwest::Method::PUT,
                format!("{}/tasks/{external_id}", self.base_url),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(format!("update task request failed: {e}")))?;
        self.check(resp, "update task").await?;
        Ok(())
    }

    async fn delete_remote(&self, external_id: &str) -> DomainResult<()> {
        self.rate_limiter.lock().await.acquire().await;

        let resp = self
            .request(
                reqwest::Method::DELETE,
                format!("{}/tasks/{external_id}", self.base_url),
            )
            .send()
            .await
            .map_err(|e| self.error(format!("delete task request failed: {e}")))?;
        self.check(resp, "delete task").await?;
        Ok(())
    }

    async fn list_remote(&self) -> DomainResult<Vec<TaskDraft>> {
        self.rate_limiter.lock().await.acquire().await;

        let resp = self
            .request(
                reqwest::Method::GET,
                format!(
                    "{}/projects/{}/tasks?opt_fields=name,notes,completed",
                    self.base_url, self.binding.container_id
                ),
            )
            .send()
            .await
            .map_err(|e| self.error(format!("list tasks request failed: {e}")))?;
        let resp = self.check(resp, "list tasks").await?;

        let listing: DataEnvelope<Vec<AsanaTask>> = resp
            .json()
            .await
            .map_err(|e| self.error(format!("list tasks parse failed: {e}")))?;

        Ok(listing
            .data
            .into_iter()
            .map(|remote| {
                let mut draft = TaskDraft {
                    title: remote.name,
                    description: (!remote.notes.is_empty()).then_some(remote.notes),
                    status: if remote.completed {
                        TaskStatus::Done
                    } else {
                        TaskStatus::Todo
                    },
                    ..TaskDraft::default()
                };
                draft.metadata.insert(
                    self.binding.id_key(),
                    serde_json::Value::String(remote.gid),
                );
                draft
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TrackerKind;

    fn binding() -> ExternalBinding {
        ExternalBinding::new("asana", TrackerKind::Asana, "secret-token", "project-1")
    }

    #[tokio::test]
    async fn test_create_remote_unwraps_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tasks")
            .match_header("authorization", "Bearer secret-token")
            .with_status(201)
            .with_body(r#"{"data": {"gid": "1203", "name": "Ship it"}}"#)
            .create_async()
            .await;

        let tracker = AsanaTracker::new(binding()).with_base_url(server.url());
        let gid = tracker.create_remote(&Task::new("Ship it")).await.unwrap();

        assert_eq!(gid, "1203");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_done_status_marks_completed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/tasks/1203")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"data": {"completed": true}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"data": {}}"#)
            .create_async()
            .await;

        let tracker = AsanaTracker::new(binding()).with_base_url(server.url());
        let task = Task::new("Ship it").with_status(TaskStatus::Done);
        tracker.update_remote("1203", &task).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_remote_maps_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/project-1/tasks")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"gid": "1", "name": "Open", "notes": "", "completed": false},
                    {"gid": "2", "name": "Closed", "notes": "done long ago", "completed": true}
                ]}"#,
            )
            .create_async()
            .await;

        let tracker = AsanaTracker::new(binding()).with_base_url(server.url());
        let drafts = tracker.list_remote().await.unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].status, TaskStatus::Todo);
        assert_eq!(drafts[1].status, TaskStatus::Done);
        assert_eq!(
            drafts[1].metadata.get("provider.asana.id"),
            Some(&serde_json::json!("2"))
        );
    }

    #[tokio::test]
    async fn test_error_status_surfaces_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/tasks/1203")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let tracker = AsanaTracker::new(binding()).with_base_url(server.url());
        match tracker.delete_remote("1203").await {
            Err(DomainError::ExternalSystem { reason, .. }) => assert!(reason.contains("403")),
            other => panic!("expected ExternalSystem error, got {other:?}"),
        }
    }
}
