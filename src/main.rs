//! Conveyor CLI entry point.

use clap::Parser;

use conveyor::cli::{commands, Cli, CliContext, Commands};
use conveyor::infrastructure::{logging, ConfigLoader};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => conveyor::cli::handle_error(err, cli.json),
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(err) => conveyor::cli::handle_error(err, cli.json),
    };

    let ctx = match CliContext::build(config).await {
        Ok(ctx) => ctx,
        Err(err) => conveyor::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Serve => commands::serve::execute(&ctx).await,
        Commands::Task(args) => commands::task::execute(args, &ctx, cli.json).await,
        Commands::Rule(args) => commands::rule::execute(args, &ctx, cli.json).await,
        Commands::Metrics(args) => commands::metrics::execute(args, &ctx, cli.json).await,
    };

    if let Err(err) = result {
        conveyor::cli::handle_error(err, cli.json);
    }
}
