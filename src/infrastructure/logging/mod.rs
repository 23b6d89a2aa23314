//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stdout output
//! - Rolling JSON log files through tracing-appender
//! - Retention cleanup of rolled files

pub mod config;
pub mod logger;
pub mod retention;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use retention::cleanup_old_logs;

/// File name prefix of rolled log files.
pub const LOG_FILE_PREFIX: &str = "procflow.log";
