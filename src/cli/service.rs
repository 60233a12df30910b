//! CLI wiring: build the service stack from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::memory::{MemoryEventStore, MemoryRuleRepository, MemoryTaskRepository};
use crate::adapters::sqlite::{
    create_pool, run_migrations, SqliteEventRepository, SqliteRuleRepository,
    SqliteTaskRepository,
};
use crate::adapters::trackers::create_tracker;
use crate::domain::models::{Config, StorageBackend};
use crate::domain::ports::{EventStore, RuleRepository, TaskRepository};
use crate::services::api::AutomationApi;
use crate::services::engine::AutomationEngine;
use crate::services::metrics::MetricsService;
use crate::services::sync::SyncService;
use crate::services::webhook::{
    AgentNormalizer, BoardNormalizer, GenericNormalizer, Normalizer, PullRequestNormalizer,
    WebhookRouter,
};

/// Everything a CLI command needs: the loaded config and the wired
/// service facade.
pub struct CliContext {
    pub config: Config,
    pub api: Arc<AutomationApi>,
}

impl CliContext {
    /// Build the full stack from a config: stores, engine, sync,
    /// webhook endpoints, metrics, and the structured-result facade.
    pub async fn build(config: Config) -> Result<Self> {
        let (tasks, rules, events) = build_stores(&config).await?;

        let mut engine = AutomationEngine::new(
            Arc::clone(&tasks),
            Arc::clone(&rules),
            Arc::clone(&events),
            config.automation.clone(),
        );

        let sync = if config.bindings.is_empty() {
            None
        } else {
            let mut sync = SyncService::new(
                Arc::clone(&tasks),
                Arc::clone(&events),
                config.sync.clone(),
            );
            for binding in &config.bindings {
                let tracker = create_tracker(binding)
                    .with_context(|| format!("binding {:?} is not usable", binding.name))?;
                sync = sync.with_tracker(tracker);
            }
            Some(Arc::new(sync))
        };

        if let Some(ref sync) = sync {
            engine = engine.with_sync(Arc::clone(sync));
        }
        let engine = Arc::new(engine);

        if config.automation.install_default_rules {
            let installed = engine
                .install_builtin_rules()
                .await
                .context("Failed to install builtin rules")?;
            if installed > 0 {
                tracing::info!(installed, "Builtin automation rules installed");
            }
        }

        let webhooks = Arc::new(WebhookRouter::new(Arc::clone(&engine)));
        for endpoint in &config.webhooks {
            let normalizer: Arc<dyn Normalizer> = match endpoint.provider.as_str() {
                "agent" => Arc::new(AgentNormalizer::new()),
                "board" => Arc::new(BoardNormalizer::new()),
                "pulls" => Arc::new(PullRequestNormalizer::new()),
                _ => Arc::new(GenericNormalizer::new()),
            };
            webhooks
                .register_endpoint(endpoint.path.clone(), normalizer, endpoint.secret.clone())
                .await;
        }

        let metrics = Arc::new(MetricsService::new(
            Arc::clone(&tasks),
            Arc::clone(&rules),
            Arc::clone(&events),
            config.metrics.clone(),
        ));

        let mut api = AutomationApi::new(engine, metrics, webhooks);
        if let Some(sync) = sync {
            api = api.with_sync(sync);
        }

        Ok(Self {
            config,
            api: Arc::new(api),
        })
    }
}

type Stores = (
    Arc<dyn TaskRepository>,
    Arc<dyn RuleRepository>,
    Arc<dyn EventStore>,
);

async fn build_stores(config: &Config) -> Result<Stores> {
    match config.database.backend {
        StorageBackend::Memory => Ok((
            Arc::new(MemoryTaskRepository::new()),
            Arc::new(MemoryRuleRepository::new()),
            Arc::new(MemoryEventStore::new(config.event_log.capacity)),
        )),
        StorageBackend::Sqlite => {
            let pool = create_pool(&config.database.url, config.database.max_connections)
                .await
                .with_context(|| format!("Failed to open database {:?}", config.database.url))?;

            run_migrations(&pool)
                .await
                .context("Failed to apply database schema")?;

            Ok((
                Arc::new(SqliteTaskRepository::new(pool.clone())),
                Arc::new(SqliteRuleRepository::new(pool.clone())),
                Arc::new(SqliteEventRepository::new(pool, config.event_log.capacity)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskDraft, WebhookEndpointConfig};

    #[tokio::test]
    async fn test_build_memory_stack() {
        let config = Config {
            webhooks: vec![WebhookEndpointConfig {
                path: "/webhooks/agent".to_string(),
                provider: "agent".to_string(),
                secret: None,
            }],
            ..Config::default()
        };
        let ctx = CliContext::build(config).await.unwrap();

        let created = ctx.api.create_task(TaskDraft::new("wired")).await;
        assert!(created.success);

        let paths = ctx.api.webhooks().registered_paths().await;
        assert_eq!(paths, vec!["/webhooks/agent".to_string()]);
    }

    #[tokio::test]
    async fn test_builtin_rules_installed_once() {
        let ctx = CliContext::build(Config::default()).await.unwrap();
        let rules = ctx.api.list_automation_rules().await.data.unwrap();
        assert!(!rules.is_empty());

        // A second install pass must not duplicate them.
        let again = ctx.api.engine().install_builtin_rules().await.unwrap();
        assert_eq!(again, 0);
    }
}
