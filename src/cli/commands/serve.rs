//! The `serve` command: HTTP API, webhook endpoints, and the
//! time-based rule sweeper.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use crate::adapters::http;
use crate::cli::CliContext;

/// How often time-based rules are checked for due schedules. Schedules
/// themselves are per-rule; this only bounds firing latency.
const TIME_RULE_SWEEP: Duration = Duration::from_secs(30);

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let engine = ctx.api.engine();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TIME_RULE_SWEEP);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match engine.run_time_rules(Utc::now()).await {
                Ok(0) => {}
                Ok(executed) => tracing::debug!(executed, "Time-based rules executed"),
                Err(err) => tracing::warn!(%err, "Time-based rule sweep failed"),
            }
        }
    });

    let paths = ctx.api.webhooks().registered_paths().await;
    tracing::info!(
        backend = ?ctx.config.database.backend,
        webhook_endpoints = paths.len(),
        "Engine ready"
    );

    let result = tokio::select! {
        result = http::serve(ctx.api.clone(), &ctx.config.server) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    sweeper.abort();
    result
}
