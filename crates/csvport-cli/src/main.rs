//! csvport CLI - main entry point.

use clap::Parser;
use colored::Colorize;
use csvport_cli::{commands, Cli, Commands};
use csvport_common::logging::{init_logging, LogConfig, LogLevel};
use csvport_engine::{EngineConfig, MigrationService};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default()
            .with_level(LogLevel::Debug)
            .with_prefix("csvport")
    } else {
        LogConfig::default()
            .with_level(LogLevel::Warn)
            .with_prefix("csvport")
    };
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    let _ = init_logging(&log_config);

    if let Err(e) = execute(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("{} {e:#}", "error:".red().bold());
        process::exit(1);
    }
}

async fn execute(cli: Cli) -> csvport_cli::Result<()> {
    let connection = cli
        .connection
        .ok_or_else(|| anyhow::anyhow!("no connection string; pass --connection or set CSVPORT_CONNECTION"))?;

    let config = EngineConfig::from_env()?;
    let service = MigrationService::new(config);

    let result = match &cli.command {
        Commands::Init => commands::init(&service, &connection).await,
        Commands::Check => commands::check(&service, &connection).await,
        Commands::Run { root_folder } => commands::run(&service, &connection, root_folder).await,
        Commands::Reprocess { job_id, file } => {
            commands::reprocess(&service, &connection, *job_id, *file).await
        }
        Commands::Jobs => commands::list_jobs(&service, &connection).await,
        Commands::Job { job_id } => commands::show_job(&service, &connection, *job_id).await,
    };

    service.shutdown().await;
    result
}
