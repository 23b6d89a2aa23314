//! procflow CLI entry point.

use clap::Parser;

use procflow::cli::{commands, Cli, Commands};
use procflow::infrastructure::config::ConfigLoader;
use procflow::infrastructure::logging::{cleanup_old_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before init there is no project config; fall back to defaults for logging.
    let logging = ConfigLoader::load().map(|c| c.logging).unwrap_or_default();
    let log_config = LogConfig::from(&logging);
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };
    if let Some(dir) = &log_config.log_dir {
        if let Err(err) = cleanup_old_logs(dir, log_config.retention_days).await {
            tracing::warn!(error = %err, "log retention cleanup failed");
        }
    }

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json).await,
        Commands::Process(args) => commands::process::execute(args, cli.json).await,
        Commands::Task(args) => commands::task::execute(args, cli.json).await,
        Commands::Copy(args) => commands::copy::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        procflow::cli::handle_error(err, cli.json);
    }
}
