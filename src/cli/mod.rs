//! Command-line interface.
//!
//! `conveyor serve` runs the HTTP surface; `task`, `rule`, and
//! `metrics` drive the engine directly against the configured store.

pub mod commands;
pub mod output;
pub mod service;

use clap::{Parser, Subcommand};

pub use service::CliContext;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Rule-driven workflow automation core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a config file (defaults to .conveyor/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and webhook server
    Serve,

    /// Task management commands
    Task(commands::task::TaskArgs),

    /// Automation rule commands
    Rule(commands::rule::RuleArgs),

    /// Metrics and health queries
    Metrics(commands::metrics::MetricsArgs),
}

/// Print a top-level error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let body = serde_json::json!({ "success": false, "error": err.to_string() });
        eprintln!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
