use serde::{Deserialize, Serialize};

/// Main configuration structure for procflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Task engine behaviour
    #[serde(default)]
    pub engine: EngineConfig,

    /// Copy-task creation retry policy
    #[serde(default)]
    pub copy_tasks: CopyTaskConfig,

    /// Where the CLI finds process definitions and the identity directory
    #[serde(default)]
    pub processes: ProcessesConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".procflow/procflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Re-evaluations of a transition after a version conflict
    #[serde(default = "default_max_transition_retries")]
    pub max_transition_retries: u32,

    /// Upper bound on backward path walks and forward node entries per transition
    #[serde(default = "default_max_walk_depth")]
    pub max_walk_depth: u32,

    /// Priority given to tasks created at user-task nodes
    #[serde(default = "default_priority")]
    pub default_priority: i32,
}

const fn default_max_transition_retries() -> u32 {
    3
}

const fn default_max_walk_depth() -> u32 {
    256
}

const fn default_priority() -> i32 {
    crate::domain::models::task::DEFAULT_PRIORITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transition_retries: default_max_transition_retries(),
            max_walk_depth: default_max_walk_depth(),
            default_priority: default_priority(),
        }
    }
}

/// Copy-task retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CopyTaskConfig {
    /// Initial backoff before retrying a single recipient, in milliseconds
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Give up on a recipient after this long, in milliseconds
    #[serde(default = "default_retry_max_elapsed_ms")]
    pub retry_max_elapsed_ms: u64,

    /// Default number of names returned by the read-user summary
    #[serde(default = "default_read_names_limit")]
    pub read_names_limit: usize,
}

const fn default_retry_initial_ms() -> u64 {
    50
}

const fn default_retry_max_elapsed_ms() -> u64 {
    2_000
}

const fn default_read_names_limit() -> usize {
    5
}

impl Default for CopyTaskConfig {
    fn default() -> Self {
        Self {
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_elapsed_ms: default_retry_max_elapsed_ms(),
            read_names_limit: default_read_names_limit(),
        }
    }
}

/// Process definition and identity sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessesConfig {
    /// Directory of YAML process definitions deployed at startup
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: String,

    /// YAML identity directory (users, groups, admins, withdraw grants)
    #[serde(default = "default_identity_file")]
    pub identity_file: String,
}

fn default_definitions_dir() -> String {
    ".procflow/processes".to_string()
}

fn default_identity_file() -> String {
    ".procflow/identity.yaml".to_string()
}

impl Default for ProcessesConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            identity_file: default_identity_file(),
        }
    }
}
