//! Implementation of the `procflow init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::setup::{initialize_project, SetupPaths, SetupReport};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite existing configuration and sample files
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub initialized_path: PathBuf,
    #[serde(flatten)]
    pub report: SetupReport,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Project initialized at {}", self.initialized_path.display())];
        for dir in &self.report.directories_created {
            lines.push(format!("  created {dir}/"));
        }
        for file in &self.report.files_written {
            lines.push(format!("  wrote   {file}"));
        }
        if self.report.database_initialized {
            lines.push("  database migrated".to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let root = if args.path.is_absolute() {
        args.path
    } else {
        std::env::current_dir().context("Failed to get current directory")?.join(args.path)
    };
    let paths = SetupPaths::new(&root);
    let report = initialize_project(&paths, args.force).await?;
    output(&InitOutput { initialized_path: root, report }, json_mode);
    Ok(())
}
