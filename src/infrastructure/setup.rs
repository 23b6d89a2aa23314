//! Project initialization
//!
//! Creates the project-local `.procflow/` directory with a default
//! configuration, a sample process definition, a sample identity directory
//! and a migrated database.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::sqlite::{initialize_database, PoolConfig};
use crate::domain::models::DatabaseConfig;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# procflow configuration
# Override settings by editing this file, adding .procflow/local.yaml, or
# setting environment variables with the PROCFLOW_ prefix, for example:
#   export PROCFLOW_LOGGING__LEVEL=debug
#   export PROCFLOW_ENGINE__MAX_WALK_DEPTH=128

database:
  path: ".procflow/procflow.db"
  max_connections: 5

logging:
  # trace, debug, info, warn, error
  level: "info"
  # json or pretty
  format: "pretty"
  # log_dir: ".procflow/logs"
  rotation: "daily"
  retention_days: 30

engine:
  max_transition_retries: 3
  max_walk_depth: 256
  default_priority: 50

copy_tasks:
  retry_initial_ms: 50
  retry_max_elapsed_ms: 2000
  read_names_limit: 5

processes:
  definitions_dir: ".procflow/processes"
  identity_file: ".procflow/identity.yaml"
"#;

const SAMPLE_PROCESS: &str = r"key: leave
name: Leave request
nodes:
  - { key: start, kind: start_event }
  - { key: request, kind: user_task, name: Submit request, assignee: '${starter}' }
  - { key: approve, kind: user_task, name: Manager approval, candidate_groups: [managers] }
  - { key: decide, kind: exclusive_gateway }
  - key: archive
    kind: user_task
    name: Archive
    candidate_groups: [hr]
    copy_to: { users: ['${starter}'], groups: [hr] }
  - { key: end, kind: end_event }
flows:
  - { source: start, target: request }
  - { source: request, target: approve }
  - { source: approve, target: decide }
  - { source: decide, target: archive, condition: '${approved}' }
  - { source: decide, target: request, is_default: true }
  - { source: archive, target: end }
";

const SAMPLE_IDENTITY: &str = r"users:
  kermit: Kermit
  piggy: Miss Piggy
  fozzie: Fozzie Bear
groups:
  managers: [piggy]
  hr: [fozzie]
admins: [piggy]
withdraw_grants: {}
allow_previous_performer: true
";

/// Files and directories of an initialized project.
pub struct SetupPaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub processes_dir: PathBuf,
    pub identity_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl SetupPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_dir = root.join(".procflow");
        Self {
            config_file: config_dir.join("config.yaml"),
            database_file: config_dir.join("procflow.db"),
            processes_dir: config_dir.join("processes"),
            identity_file: config_dir.join("identity.yaml"),
            logs_dir: config_dir.join("logs"),
            config_dir,
            root,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists() && self.database_file.exists()
    }
}

/// What [`initialize_project`] created.
#[derive(Debug, Default, serde::Serialize)]
pub struct SetupReport {
    pub directories_created: Vec<String>,
    pub files_written: Vec<String>,
    pub database_initialized: bool,
}

fn relative(paths: &SetupPaths, path: &Path) -> String {
    path.strip_prefix(&paths.root).unwrap_or(path).to_string_lossy().to_string()
}

fn write_if_missing(paths: &SetupPaths, path: &Path, content: &str, force: bool, report: &mut SetupReport) -> Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    report.files_written.push(relative(paths, path));
    Ok(())
}

/// Create the project layout and migrate the database. Existing files are kept unless `force`.
pub async fn initialize_project(paths: &SetupPaths, force: bool) -> Result<SetupReport> {
    let mut report = SetupReport::default();

    for dir in [&paths.config_dir, &paths.processes_dir, &paths.logs_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
            report.directories_created.push(relative(paths, dir));
        }
    }

    write_if_missing(paths, &paths.config_file, DEFAULT_CONFIG_TEMPLATE, force, &mut report)?;
    write_if_missing(paths, &paths.processes_dir.join("leave.yaml"), SAMPLE_PROCESS, force, &mut report)?;
    write_if_missing(paths, &paths.identity_file, SAMPLE_IDENTITY, force, &mut report)?;

    let database = DatabaseConfig {
        path: paths.database_file.to_string_lossy().to_string(),
        ..DatabaseConfig::default()
    };
    let pool = initialize_database(&database.url(), Some(PoolConfig::from(&database)))
        .await
        .context("Failed to initialize database")?;
    pool.close().await;
    report.database_initialized = true;

    tracing::info!(root = %paths.root.display(), "project initialized");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryProcessRegistry, StaticIdentityDirectory};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_creates_a_usable_project() {
        let dir = TempDir::new().unwrap();
        let paths = SetupPaths::new(dir.path());
        assert!(!paths.is_initialized());

        let report = initialize_project(&paths, false).await.unwrap();
        assert!(paths.is_initialized());
        assert!(report.database_initialized);
        assert_eq!(report.files_written.len(), 3);

        let registry = InMemoryProcessRegistry::new();
        let deployed = registry.deploy_dir(&paths.processes_dir).unwrap();
        assert_eq!(deployed[0].key, "leave");
        StaticIdentityDirectory::from_yaml(SAMPLE_IDENTITY).unwrap();

        let again = initialize_project(&paths, false).await.unwrap();
        assert!(again.files_written.is_empty());
    }
}
