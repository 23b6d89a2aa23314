//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging (tracing, tracing-appender)
//! - Project setup for the CLI

pub mod config;
pub mod logging;
pub mod setup;
