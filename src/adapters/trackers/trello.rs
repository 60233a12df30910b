//! Trello board tracker.
//!
//! Cards mirror tasks; the binding's status map carries status -> list
//! id. The API key and token ride as query parameters per Trello's
//! auth scheme; the binding token is `key:token`.

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

const TRELLO_API_BASE: &str = "https://api.trello.com/1";

/// A card as returned by the boards/cards listing.
#[derive(Debug, Deserialize)]
struct TrelloCard {
    id: String,
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default, rename = "idList")]
    id_list: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedCard {
    id: String,
}

pub struct TrelloTracker {
    binding: ExternalBinding,
    http: Client,
    base_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    key: String,
    token: String,
}

impl TrelloTracker {
    pub fn new(binding: ExternalBinding) -> Self {
        let (key, token) = match binding.api_token.split_once(':') {
            Some((key, token)) => (key.to_string(), token.to_string()),
            None => (binding.api_token.clone(), binding.api_token.clone()),
        };
        Self {
            binding,
            http: Client::new(),
            base_url: TRELLO_API_BASE.to_string(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(100, Duration::from_secs(10)))),
            key,
            token,
        }
    }

    /// Point the client at a different API base; used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [("key", self.key.as_str()), ("token", self.token.as_str())]
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

    /// Canonical status for a list id, via the binding's reverse map.
    fn status_for_list(&self, list_id: Option<&str>) -> TaskStatus {
        list_id
            .and_then(|id| {
                self.binding
                    .status_map
                    .iter()
                    .find(|(_, mapped)| mapped.as_str() == id)
                    .map(|(status, _)| *status)
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteTracker for TrelloTracker {
    fn provider(&self) -> &str {
        &self.binding.name
    }

    async fn create_remote(&self, task: &Task) -> DomainResult<String> {
        self.rate_limiter.lock().await.acquire().await;

        let mut body = serde_json::json!({
            "name": task.title,
            "desc": task.description.clone().unwrap_or_default(),
        });
        if let Some(list_id) = self.binding.remote_state(task.status) {
            body["idList"] = serde_json::json!(list_id);
        }

        let resp = self
            .http
            .post(format!("{}/cards", self.base_url))
            .query(&self.auth_query())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(format!("create card request failed: {e}")))?;
        let resp = self.check(resp, "create card").await?;

        let card: CreatedCard = resp
            .json()
            .await
            .map_err(|e| self.error(format!("create card parse failed: {e}")))?;
        Ok(card.id)
    }

    async fn update_remote(&self, external_id: &str, task: &Task) -> DomainResult<()> {
        self.rate_limiter.lock().await.acquire().await;

        let mut body = serde_json::json!({
            "name": task.title,
            "desc": task.description.clone().unwrap_or_default(),
        });
        if let Some(list_id) = self.binding.remote_state(task.status) {
            body["idList"] = serde_json::json!(list_id);
        }

        let resp = self
            .http
            .put(format!("{}/cards/{external_id}", self.base_url))
            .query(&self.auth_query())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(format!("update card request failed: {e}")))?;
        self.check(resp, "update card").await?;
        Ok(())
    }

    async fn delete_remote(&self, external_id: &str) -> DomainResult<()> {
        self.rate_limiter.lock().await.acquire().await;

        let resp = self
            .http
            .delete(format!("{}/cards/{external_id}", self.base_url))
            .query(&self.auth_query())
            .send()
            .await
            .map_err(|e| self.error(format!("delete card request failed: {e}")))?;
        self.check(resp, "delete card").await?;
        Ok(())
    }

    async fn list_remote(&self) -> DomainResult<Vec<TaskDraft>> {
        self.rate_limiter.lock().await.acquire().await;

        let resp = self
            .http
            .get(format!(
                "{}/boards/{}/cards",
                self.base_url, self.binding.container_id
            ))
            .query(&self.auth_query())
            .send()
            .await
            .map_err(|e| self.error(format!("list cards request failed: {e}")))?;
        let resp = self.check(resp, "list cards").await?;

        let cards: Vec<TrelloCard> = resp
            .json()
            .await
            .map_err(|e| self.error(format!("list cards parse failed: {e}")))?;

        Ok(cards
            .into_iter()
            .map(|card| {
                let mut draft = TaskDraft {
                    title: card.name,
                    description: (!card.desc.is_empty()).then_some(card.desc),
                    status: self.status_for_list(card.id_list.as_deref()),
                    ..TaskDraft::default()
                };
                draft.metadata.insert(
                    self.binding.id_key(),
                    serde_json::Value::String(card.id),
                );
                draft
            })
            .collect())
    }
}
