//! Structured-result facade over the engine, metrics, webhook, and
//! sync services.
//!
//! Every caller-visible failure comes back as `{success, data|error}`;
//! nothing in this layer propagates a raw fault across the API
//! boundary. The HTTP adapter and CLI both sit on top of this facade.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    provider_key, AutomationRule, Task, TaskDraft, TaskPatch, TaskStatus,
};
use crate::domain::ports::TaskFilters;
use crate::services::engine::AutomationEngine;
use crate::services::metrics::{EfficiencyReport, MetricsService, RealtimeHealth, TaskMetrics};
use crate::services::sync::SyncService;
use crate::services::webhook::{WebhookResponse, WebhookRouter};

/// Uniform response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    fn from_result(result: DomainResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(err),
        }
    }
}

/// Outcome of a bulk operation: per-item accounting, never an
/// all-or-nothing failure.
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub success: bool,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct AutomationApi {
    engine: Arc<AutomationEngine>,
    metrics: Arc<MetricsService>,
    webhooks: Arc<WebhookRouter>,
    sync: Option<Arc<SyncService>>,
}

impl AutomationApi {
    pub fn new(
        engine: Arc<AutomationEngine>,
        metrics: Arc<MetricsService>,
        webhooks: Arc<WebhookRouter>,
    ) -> Self {
        Self {
            engine,
            metrics,
            webhooks,
            sync: None,
        }
    }

    pub fn with_sync(mut self, sync: Arc<SyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn engine(&self) -> Arc<AutomationEngine> {
        Arc::clone(&self.engine)
    }

    pub fn webhooks(&self) -> Arc<WebhookRouter> {
        Arc::clone(&self.webhooks)
    }

    // -----------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------

    pub async fn create_task(&self, draft: TaskDraft) -> ApiResponse<Task> {
        ApiResponse::from_result(self.engine.create_task(draft).await)
    }

    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> ApiResponse<Task> {
        ApiResponse::from_result(self.engine.update_task(id, patch).await)
    }

    /// Delete a task, queueing remote deletions for every binding the
    /// task was correlated with.
    pub async fn delete_task(&self, id: Uuid) -> ApiResponse<bool> {
        let bound = match self.engine.get_task(id).await {
            Ok(Some(task)) => self.bound_external_ids(&task),
            Ok(None) => Vec::new(),
            Err(err) => return ApiResponse::fail(err),
        };

        match self.engine.delete_task(id).await {
            Ok(existed) => {
                if existed {
                    if let Some(ref sync) = self.sync {
                        for (binding, external_id) in bound {
                            if let Err(err) = sync.spawn_delete(&binding, external_id) {
                                tracing::warn!(%err, binding, "Could not queue remote deletion");
                            }
                        }
                    }
                }
                ApiResponse::ok(existed)
            }
            Err(err) => ApiResponse::fail(err),
        }
    }

    pub async fn get_task(&self, id: Uuid) -> ApiResponse<Option<Task>> {
        ApiResponse::from_result(self.engine.get_task(id).await)
    }

    pub async fn list_tasks(&self, filters: TaskFilters) -> ApiResponse<Vec<Task>> {
        ApiResponse::from_result(self.engine.list_tasks(filters).await)
    }

    pub async fn update_completion_criteria(
        &self,
        task_id: Uuid,
        criterion_id: Uuid,
        completed: bool,
    ) -> ApiResponse<Task> {
        ApiResponse::from_result(
            self.engine
                .update_completion_criteria(task_id, criterion_id, completed)
                .await,
        )
    }

    /// Bulk status change with per-item results.
    pub async fn bulk_status_change(&self, ids: &[Uuid], status: TaskStatus) -> BulkResult {
        let mut updated = 0;
        let mut errors = Vec::new();

        for id in ids {
            match self.engine.update_task(*id, TaskPatch::status(status)).await {
                Ok(_) => updated += 1,
                Err(err) => errors.push(format!("task {id}: {err}")),
            }
        }

        BulkResult {
            success: errors.is_empty(),
            updated,
            failed: errors.len(),
            errors,
        }
    }

    // -----------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------

    pub async fn add_automation_rule(&self, rule: AutomationRule) -> ApiResponse<AutomationRule> {
        ApiResponse::from_result(self.engine.add_rule(rule).await)
    }

    pub async fn remove_automation_rule(&self, id: Uuid) -> ApiResponse<bool> {
        ApiResponse::from_result(self.engine.remove_rule(id).await)
    }

    pub async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> ApiResponse<bool> {
        ApiResponse::from_result(self.engine.set_rule_enabled(id, enabled).await)
    }

    pub async fn list_automation_rules(&self) -> ApiResponse<Vec<AutomationRule>> {
        ApiResponse::from_result(self.engine.list_rules().await)
    }

    // -----------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------

    pub async fn query_metrics(&self, window_hours: i64) -> ApiResponse<TaskMetrics> {
        ApiResponse::from_result(
            self.metrics
                .query_metrics(Duration::hours(window_hours.max(1)))
                .await,
        )
    }

    pub async fn generate_efficiency_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResponse<EfficiencyReport> {
        ApiResponse::from_result(self.metrics.generate_efficiency_report(start, end).await)
    }

    pub async fn health_check(&self) -> ApiResponse<RealtimeHealth> {
        ApiResponse::from_result(self.metrics.realtime_health().await)
    }

    // -----------------------------------------------------------------
    // Webhooks & sync
    // -----------------------------------------------------------------

    pub async fn process_webhook(
        &self,
        path: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> WebhookResponse {
        self.webhooks.process(path, body, headers).await
    }

    /// Reconciliation pull from every configured binding; remote
    /// records are upserted through the engine so normal dispatch and
    /// logging apply.
    pub async fn sync_external(&self) -> ApiResponse<usize> {
        let Some(ref sync) = self.sync else {
            return ApiResponse::fail("no external bindings configured");
        };

        let mut synced = 0;
        for binding in sync.binding_names() {
            let drafts = match sync.pull(&binding).await {
                Ok(drafts) => drafts,
                Err(err) => {
                    tracing::warn!(%err, binding, "Reconciliation pull failed");
                    continue;
                }
            };

            let id_key = provider_key(&binding, "id");
            for draft in drafts {
                let Some(id_value) = draft.metadata.get(&id_key).cloned() else {
                    tracing::warn!(binding, "Pulled record without a correlation id; skipping");
                    continue;
                };

                let result = match self.engine.find_task_by_metadata(&id_key, &id_value).await {
                    Ok(Some(existing)) => {
                        let patch = TaskPatch {
                            title: Some(draft.title.clone()),
                            description: draft.description.clone(),
                            status: Some(draft.status),
                            priority: Some(draft.priority),
                            tags: Some(draft.tags.clone()),
                            ..TaskPatch::default()
                        };
                        self.engine.update_task(existing.id, patch).await.map(|_| ())
                    }
                    Ok(None) => self.engine.create_task(draft).await.map(|_| ()),
                    Err(err) => Err(err),
                };

                match result {
                    Ok(()) => synced += 1,
                    Err(err) => tracing::warn!(%err, binding, "Reconciliation upsert failed"),
                }
            }
        }

        ApiResponse::ok(synced)
    }

    fn bound_external_ids(&self, task: &Task) -> Vec<(String, String)> {
        let Some(ref sync) = self.sync else {
            return Vec::new();
        };
        sync.binding_names()
            .into_iter()
            .filter_map(|binding| {
                task.metadata
                    .get(&provider_key(&binding, "id"))
                    .and_then(|v| v.as_str())
                    .map(|id| (binding, id.to_string()))
            })
            .collect()
    }
}
