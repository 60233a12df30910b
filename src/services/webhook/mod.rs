//! Webhook ingestion and normalization.
//!
//! Each endpoint mounts a provider-specific [`Normalizer`] that turns a
//! raw payload into canonical provider events. The router owns the
//! cross-cutting steps: signature verification, correlation by
//! provider id, idempotent application through the engine, and the
//! follow-up `webhook` trigger dispatch. Normalizers stay pure
//! translation; all conditional behavior lives in automation rules.

pub mod agent;
pub mod board;
pub mod generic;
pub mod pulls;

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{provider_key, Task, TaskDraft, TaskPatch, TaskStatus};
use crate::services::engine::AutomationEngine;

pub use agent::AgentNormalizer;
pub use board::BoardNormalizer;
pub use generic::GenericNormalizer;
pub use pulls::PullRequestNormalizer;

type HmacSha256 = Hmac<Sha256>;

/// Canonical effect extracted from one provider event.
#[derive(Debug, Clone)]
pub enum ProviderAction {
    /// The remote subject is now in this canonical status. The patch
    /// carries provider bookkeeping (urls, list ids) to merge in.
    Status {
        to: TaskStatus,
        patch: Option<TaskPatch>,
    },
    /// Work started remotely; creates the task when none is correlated.
    Started { draft: TaskDraft },
    /// Field sync from a system that mirrors whole tasks.
    Update { patch: TaskPatch },
    /// The remote subject was deleted.
    Deleted,
    /// Unmapped provider state: tolerated as a no-op, never an error.
    Ignore { reason: String },
}

/// One normalized event plus its correlation key.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// The provider's identifier for the event subject; the
    /// idempotency key for redelivery.
    pub external_id: String,
    /// Canonical event name, dispatched to `webhook` triggers after a
    /// successful application.
    pub label: String,
    pub action: ProviderAction,
}

/// Provider-specific payload translator.
pub trait Normalizer: Send + Sync {
    /// Provider namespace for metadata keys (`provider.<name>.id`).
    fn provider(&self) -> &str;

    /// Header carrying the payload signature, when the provider signs.
    fn signature_header(&self) -> &'static str {
        "x-webhook-signature"
    }

    /// Pure translation of a raw payload into canonical events.
    fn normalize(&self, payload: &serde_json::Value) -> DomainResult<Vec<ProviderEvent>>;
}

/// Result shape returned to webhook callers.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

struct Endpoint {
    normalizer: Arc<dyn Normalizer>,
    secret: Option<String>,
}

/// Routes raw webhook deliveries to normalizers and applies the
/// resulting canonical events through the engine.
pub struct WebhookRouter {
    engine: Arc<AutomationEngine>,
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl WebhookRouter {
    pub fn new(engine: Arc<AutomationEngine>) -> Self {
        Self {
            engine,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Mount a normalizer at a path, optionally with a signing secret.
    pub async fn register_endpoint(
        &self,
        path: impl Into<String>,
        normalizer: Arc<dyn Normalizer>,
        secret: Option<String>,
    ) {
        let path = path.into();
        tracing::info!(path, provider = normalizer.provider(), "Webhook endpoint registered");
        self.endpoints
            .write()
            .await
            .insert(path, Endpoint { normalizer, secret });
    }

    pub async fn unregister_endpoint(&self, path: &str) -> bool {
        self.endpoints.write().await.remove(path).is_some()
    }

    pub async fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.endpoints.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Process one delivery. Header names must be lowercase.
    ///
    /// A rejected signature changes no state. Redelivery of an already
    /// applied payload is detected by correlation id and produces no
    /// second task, no second transition, and no dispatch.
    pub async fn process(
        &self,
        path: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> WebhookResponse {
        match self.process_inner(path, body, headers).await {
            Ok(summary) => WebhookResponse::ok(summary),
            Err(err) => {
                tracing::warn!(path, %err, "Webhook processing failed");
                WebhookResponse::fail(err.to_string())
            }
        }
    }

    async fn process_inner(
        &self,
        path: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> DomainResult<String> {
        let (normalizer, secret) = {
            let endpoints = self.endpoints.read().await;
            let endpoint = endpoints
                .get(path)
                .ok_or_else(|| DomainError::UnknownEndpoint(path.to_string()))?;
            (Arc::clone(&endpoint.normalizer), endpoint.secret.clone())
        };

        if let Some(secret) = secret {
            let header = normalizer.signature_header();
            let signature = headers
                .get(header)
                .ok_or_else(|| DomainError::Authentication(format!("missing {header} header")))?;
            verify_signature(&secret, signature, body)?;
        }

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| DomainError::Validation(format!("malformed webhook payload: {e}")))?;

        let events = normalizer.normalize(&payload)?;
        let provider = normalizer.provider().to_string();

        let mut applied = 0usize;
        let mut skipped = 0usize;
        for event in events {
            tracing::debug!(
                provider,
                external_id = %event.external_id,
                label = %event.label,
                "Webhook event received"
            );
            match self.apply(&provider, event).await? {
                Applied::Done => applied += 1,
                Applied::Skipped => skipped += 1,
            }
        }

        Ok(format!("processed {applied} event(s), skipped {skipped}"))
    }

    async fn apply(&self, provider: &str, event: ProviderEvent) -> DomainResult<Applied> {
        let id_key = provider_key(provider, "id");
        let id_value = serde_json::Value::String(event.external_id.clone());
        let existing = self.engine.find_task_by_metadata(&id_key, &id_value).await?;

        match (existing, event.action) {
            (Some(task), ProviderAction::Status { to, patch }) => {
                self.apply_status(&task, to, patch, &event.label).await
            }
            (Some(task), ProviderAction::Started { draft }) => {
                // Redelivered start: treat as a status assertion.
                self.apply_status(&task, draft.status, None, &event.label).await
            }
            (Some(task), ProviderAction::Update { patch }) => {
                let updated = self.engine.update_task(task.id, patch).await?;
                self.engine.dispatch_webhook_event(&event.label, &updated).await;
                Ok(Applied::Done)
            }
            (Some(task), ProviderAction::Deleted) => {
                self.engine.delete_task(task.id).await?;
                Ok(Applied::Done)
            }
            (None, ProviderAction::Started { mut draft }) => {
                // Record the correlation id so redelivery finds the task.
                draft.metadata.insert(id_key, id_value);
                let task = self.engine.create_task(draft).await?;
                self.engine.dispatch_webhook_event(&event.label, &task).await;
                Ok(Applied::Done)
            }
            (None, ProviderAction::Status { to, .. }) => {
                // Only "work started" shapes may create tasks. A
                // terminal or failure event for an unknown subject must
                // not conjure a phantom record.
                tracing::warn!(
                    provider,
                    external_id = %event.external_id,
                    to = to.as_str(),
                    "Dropping webhook event with no correlated task"
                );
                Ok(Applied::Skipped)
            }
            (None, ProviderAction::Update { .. } | ProviderAction::Deleted) => {
                tracing::warn!(
                    provider,
                    external_id = %event.external_id,
                    "Dropping webhook event with no correlated task"
                );
                Ok(Applied::Skipped)
            }
            (_, ProviderAction::Ignore { reason }) => {
                tracing::debug!(provider, external_id = %event.external_id, reason, "Webhook event ignored");
                Ok(Applied::Skipped)
            }
        }
    }

    async fn apply_status(
        &self,
        task: &Task,
        to: TaskStatus,
        patch: Option<TaskPatch>,
        label: &str,
    ) -> DomainResult<Applied> {
        let mut patch = patch.unwrap_or_default();
        if task.status != to {
            patch.status = Some(to);
        }

        if patch_is_noop(task, &patch) {
            // Logged, but no event appended and nothing dispatched.
            tracing::info!(
                task_id = %task.id,
                status = to.as_str(),
                "Webhook redelivery is a no-op; task already in target state"
            );
            return Ok(Applied::Skipped);
        }

        let updated = self.engine.update_task(task.id, patch).await?;
        self.engine.dispatch_webhook_event(label, &updated).await;
        Ok(Applied::Done)
    }
}

enum Applied {
    Done,
    Skipped,
}

/// Would applying the patch leave the task unchanged?
fn patch_is_noop(task: &Task, patch: &TaskPatch) -> bool {
    if patch.is_empty() {
        return true;
    }
    let mut probe = task.clone();
    patch.apply_to(&mut probe);
    probe == *task
}

/// Constant-time HMAC-SHA256 verification. Accepts hex digests with or
/// without a `sha256=` prefix.
pub fn verify_signature(secret: &str, signature: &str, body: &[u8]) -> DomainResult<()> {
    let hex_digest = signature.trim().trim_start_matches("sha256=");
    let expected = hex::decode(hex_digest)
        .map_err(|_| DomainError::Authentication("signature is not valid hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DomainError::Authentication("invalid signing secret".to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| DomainError::Authentication("signature mismatch".to_string()))
}

/// Compute the hex HMAC-SHA256 of a body; test and client helper.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"status":"running"}"#;
        let signature = sign_payload("s3cret", body);

        assert!(verify_signature("s3cret", &signature, body).is_ok());
        assert!(verify_signature("s3cret", &format!("sha256={signature}"), body).is_ok());
        assert!(verify_signature("wrong", &signature, body).is_err());
        assert!(verify_signature("s3cret", &signature, b"tampered").is_err());
        assert!(verify_signature("s3cret", "zz-not-hex", body).is_err());
    }

    #[test]
    fn test_patch_is_noop() {
        let task = Task::new("t").with_metadata("provider.x.id", serde_json::json!("1"));

        assert!(patch_is_noop(&task, &TaskPatch::default()));
        assert!(patch_is_noop(
            &task,
            &TaskPatch::metadata_entry("provider.x.id", serde_json::json!("1"))
        ));
        assert!(!patch_is_noop(
            &task,
            &TaskPatch::metadata_entry("provider.x.id", serde_json::json!("2"))
        ));
        assert!(!patch_is_noop(&task, &TaskPatch::status(TaskStatus::Done)));
    }
}
