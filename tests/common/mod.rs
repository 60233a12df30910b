//! Shared helpers for integration tests.

use std::sync::Arc;

use conveyor::adapters::memory::{MemoryEventStore, MemoryRuleRepository, MemoryTaskRepository};
use conveyor::domain::models::{AutomationConfig, MetricsConfig};
use conveyor::services::api::AutomationApi;
use conveyor::services::engine::AutomationEngine;
use conveyor::services::metrics::MetricsService;
use conveyor::services::webhook::WebhookRouter;
use conveyor::{EventStore, RuleRepository, TaskRepository};

#[allow(dead_code)]
pub struct Stack {
    pub api: Arc<AutomationApi>,
    pub engine: Arc<AutomationEngine>,
    pub webhooks: Arc<WebhookRouter>,
    pub events: Arc<dyn EventStore>,
}

/// Memory-backed stack with no builtin rules installed; tests register
/// exactly the rules they assert on.
pub fn stack() -> Stack {
    let tasks: Arc<dyn TaskRepository> = Arc::new(MemoryTaskRepository::new());
    let rules: Arc<dyn RuleRepository> = Arc::new(MemoryRuleRepository::new());
    let events: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new(10_000));

    let engine = Arc::new(AutomationEngine::new(
        Arc::clone(&tasks),
        Arc::clone(&rules),
        Arc::clone(&events),
        AutomationConfig::default(),
    ));
    let metrics = Arc::new(MetricsService::new(
        Arc::clone(&tasks),
        Arc::clone(&rules),
        Arc::clone(&events),
        MetricsConfig::default(),
    ));
    let webhooks = Arc::new(WebhookRouter::new(Arc::clone(&engine)));
    let api = Arc::new(AutomationApi::new(
        Arc::clone(&engine),
        metrics,
        Arc::clone(&webhooks),
    ));

    Stack {
        api,
        engine,
        webhooks,
        events,
    }
}
