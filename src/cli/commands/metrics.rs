//! Metrics and health commands.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Subcommand};

use super::unwrap_response;
use crate::cli::output::{format_bottlenecks, format_metrics};
use crate::cli::CliContext;

#[derive(Args)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: MetricsCommands,
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Aggregate figures over a recent window
    Show {
        /// Window size in hours
        #[arg(short, long, default_value = "24")]
        window_hours: i64,
    },

    /// Efficiency report over a date range
    Report {
        /// Range start (RFC 3339); defaults to 7 days ago
        #[arg(long)]
        start: Option<String>,

        /// Range end (RFC 3339); defaults to now
        #[arg(long)]
        end: Option<String>,
    },

    /// Current system health
    Health,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow!("invalid timestamp {s:?}: {e}"))?
        .with_timezone(&Utc))
}

pub async fn execute(args: MetricsArgs, ctx: &CliContext, json: bool) -> Result<()> {
    match args.command {
        MetricsCommands::Show { window_hours } => {
            let metrics = unwrap_response(ctx.api.query_metrics(window_hours).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("Metrics (last {window_hours}h):");
                println!("{}", format_metrics(&metrics));
            }
        }

        MetricsCommands::Report { start, end } => {
            let end = end.as_deref().map(parse_time).transpose()?.unwrap_or_else(Utc::now);
            let start = start
                .as_deref()
                .map(parse_time)
                .transpose()?
                .unwrap_or_else(|| end - Duration::days(7));
            if start >= end {
                return Err(anyhow!("--start must be before --end"));
            }

            let report = unwrap_response(ctx.api.generate_efficiency_report(start, end).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Efficiency report {} .. {}:",
                    report.start.format("%Y-%m-%d %H:%M"),
                    report.end.format("%Y-%m-%d %H:%M")
                );
                println!("  Tasks created: {}", report.total_tasks_created);
                println!(
                    "  Transitions: {} automated, {} manual ({:.1}% efficiency)",
                    report.automated_transitions,
                    report.manual_transitions,
                    report.automation_efficiency
                );
                println!("  Estimated time saved: {:.1}h", report.time_saved_hours);
                if !report.rule_performance.is_empty() {
                    println!("  Rule performance:");
                    for perf in &report.rule_performance {
                        println!(
                            "    {} — {} run(s), {:.0}% success, avg {:.0}ms, {} task(s)",
                            if perf.rule_name.is_empty() {
                                perf.rule_id.to_string()
                            } else {
                                perf.rule_name.clone()
                            },
                            perf.executions,
                            perf.success_rate,
                            perf.average_duration_ms,
                            perf.tasks_affected
                        );
                    }
                }
                for recommendation in &report.recommendations {
                    println!("  Recommendation: {recommendation}");
                }
            }
        }

        MetricsCommands::Health => {
            let health = unwrap_response(ctx.api.health_check().await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("System health: {}", health.system_health.as_str());
                println!("  Active automations: {}", health.active_automations);
                println!("  Recent failures: {}", health.recent_failures.len());
                if !health.current_bottlenecks.is_empty() {
                    println!("  Bottlenecks:");
                    println!("{}", format_bottlenecks(&health.current_bottlenecks));
                }
            }
        }
    }

    Ok(())
}
