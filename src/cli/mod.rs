//! Command-line interface.

pub mod commands;
pub mod display;
pub mod engine;
pub mod output;

use clap::{Parser, Subcommand};

use crate::domain::errors::DomainError;

#[derive(Parser, Debug)]
#[command(name = "procflow")]
#[command(about = "procflow - process task engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration, sample definitions and the database
    Init(commands::init::InitArgs),
    /// Process definitions and instances
    Process(commands::process::ProcessArgs),
    /// Task operations
    Task(commands::task::TaskArgs),
    /// Copy tasks (notifications)
    Copy(commands::copy::CopyArgs),
}

/// Print an error and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = match err.downcast_ref::<DomainError>() {
        Some(domain) if domain.is_system_fault() => "system_fault",
        Some(_) => "rejected",
        None => "error",
    };
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}"), "kind": code });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
