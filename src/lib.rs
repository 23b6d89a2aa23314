//! procflow - process task engine
//!
//! Runs process instances over deployed process definitions, materializes
//! human tasks at user-task nodes and moves tokens as tasks are claimed,
//! delegated, completed, rejected or withdrawn. Broadcast nodes fan out
//! non-blocking copy tasks that track per-recipient read state.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): SQLite persistence, in-memory process registry and identity directory
//! - **Service Layer** (`services`): token driver, task lifecycle, rejection router, copy tasks
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, project setup
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use procflow::services::{EngineContext, RuntimeService, TaskService};
//!
//! let ctx = EngineContext::sqlite(pool, registry, identity, config);
//! let started = RuntimeService::new(ctx.clone())
//!     .start_process_instance_by_key("leave", Some("req-7"), &VariableMap::new(), Some("kermit"))
//!     .await?;
//! TaskService::new(ctx).claim(&started.new_task_ids[0], Some("kermit")).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    CompleteOptions, Config, ProcessDefinition, ProcessDefinitionBuilder, RejectOptions, RejectType, RoutingFailure,
    RoutingOutcome, Task, VariableMap, VariableValue, WithdrawOptions,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CopyTaskService, EngineContext, RuntimeService, TaskService};
