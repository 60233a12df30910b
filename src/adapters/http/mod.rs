//! HTTP surface: inbound API plus webhook endpoints.
//!
//! A thin axum layer over [`AutomationApi`]. Every response is the
//! structured `{success, data|error}` envelope; webhook handlers pass
//! the raw body through untouched so signature verification sees the
//! exact bytes the provider signed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::models::{
    AutomationRule, Condition, RuleAction, ServerConfig, Task, TaskDraft, TaskPatch, TaskPriority,
    TaskStatus, Trigger,
};
use crate::domain::ports::TaskFilters;
use crate::services::api::{ApiResponse, AutomationApi, BulkResult};
use crate::services::metrics::{EfficiencyReport, RealtimeHealth, TaskMetrics};
use crate::services::webhook::WebhookResponse;

type AppState = Arc<AutomationApi>;

/// Build the router with all API and webhook routes mounted.
pub fn build_router(api: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route(
            "/api/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/criteria/:criterion", post(update_criterion))
        .route("/api/tasks/bulk-status", post(bulk_status))
        .route("/api/rules", post(add_rule).get(list_rules))
        .route("/api/rules/:id", axum::routing::delete(remove_rule))
        .route("/api/rules/:id/enabled", post(set_rule_enabled))
        .route("/api/metrics", get(metrics))
        .route("/api/metrics/report", get(efficiency_report))
        .route("/api/health", get(health))
        .route("/api/sync", post(sync_external))
        .route("/webhooks/*path", post(webhook))
        .with_state(api)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Bind and serve until the process is stopped.
pub async fn serve(api: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let router = build_router(api, config.enable_cors);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

// ---------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    assignee: Option<String>,
    priority: Option<String>,
    tag: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CriterionBody {
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct BulkStatusBody {
    ids: Vec<Uuid>,
    status: TaskStatus,
}

/// Rule definition as submitted by callers; id and creation time are
/// assigned server-side.
#[derive(Debug, Deserialize)]
struct NewRuleBody {
    name: String,
    #[serde(default)]
    description: String,
    trigger: Trigger,
    #[serde(default)]
    conditions: Vec<Condition>,
    action: RuleAction,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------

async fn create_task(
    State(api): State<AppState>,
    Json(draft): Json<TaskDraft>,
) -> Json<ApiResponse<Task>> {
    Json(api.create_task(draft).await)
}

async fn list_tasks(
    State(api): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<ApiResponse<Vec<Task>>> {
    let filters = TaskFilters {
        status: query.status.as_deref().and_then(TaskStatus::from_str),
        assignee: query.assignee,
        priority: query.priority.as_deref().and_then(TaskPriority::from_str),
        tag: query.tag,
        limit: query.limit,
    };
    Json(api.list_tasks(filters).await)
}

async fn get_task(
    State(api): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<ApiResponse<Option<Task>>> {
    Json(api.get_task(id).await)
}

async fn update_task(
    State(api): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> Json<ApiResponse<Task>> {
    Json(api.update_task(id, patch).await)
}

async fn delete_task(
    State(api): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<ApiResponse<bool>> {
    Json(api.delete_task(id).await)
}

async fn update_criterion(
    State(api): State<AppState>,
    Path((id, criterion)): Path<(Uuid, Uuid)>,
    Json(body): Json<CriterionBody>,
) -> Json<ApiResponse<Task>> {
    Json(
        api.update_completion_criteria(id, criterion, body.completed)
            .await,
    )
}

async fn bulk_status(
    State(api): State<AppState>,
    Json(body): Json<BulkStatusBody>,
) -> Json<BulkResult> {
    Json(api.bulk_status_change(&body.ids, body.status).await)
}

async fn add_rule(
    State(api): State<AppState>,
    Json(body): Json<NewRuleBody>,
) -> Json<ApiResponse<AutomationRule>> {
    let mut rule = AutomationRule::new(body.name, body.trigger, body.action)
        .with_description(body.description);
    rule.conditions = body.conditions;
    rule.enabled = body.enabled;
    Json(api.add_automation_rule(rule).await)
}

async fn list_rules(State(api): State<AppState>) -> Json<ApiResponse<Vec<AutomationRule>>> {
    Json(api.list_automation_rules().await)
}

async fn remove_rule(
    State(api): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<ApiResponse<bool>> {
    Json(api.remove_automation_rule(id).await)
}

async fn set_rule_enabled(
    State(api): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<EnabledBody>,
) -> Json<ApiResponse<bool>> {
    Json(api.set_rule_enabled(id, body.enabled).await)
}

async fn metrics(
    State(api): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<ApiResponse<TaskMetrics>> {
    let window_hours = query
        .get("window_hours")
        .and_then(|v| v.parse().ok())
        .unwrap_or(24);
    Json(api.query_metrics(window_hours).await)
}

async fn efficiency_report(
    State(api): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Json<ApiResponse<EfficiencyReport>> {
    Json(api.generate_efficiency_report(query.start, query.end).await)
}

async fn health(State(api): State<AppState>) -> Json<ApiResponse<RealtimeHealth>> {
    Json(api.health_check().await)
}

async fn sync_external(State(api): State<AppState>) -> Json<ApiResponse<usize>> {
    Json(api.sync_external().await)
}

async fn webhook(
    State(api): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Json<WebhookResponse> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let full_path = format!("/webhooks/{path}");
    Json(api.process_webhook(&full_path, &body, &header_map).await)
}
