//! Wiring of the engine for one CLI invocation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::memory::{InMemoryProcessRegistry, StaticIdentityDirectory};
use crate::adapters::sqlite::{initialize_database, PoolConfig};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CopyTaskService, EngineContext, RuntimeService, TaskService};

/// Services backed by the configured database, definitions and identity directory.
pub struct Engine {
    pub ctx: EngineContext,
    pub registry: Arc<InMemoryProcessRegistry>,
}

impl Engine {
    /// Load the project configuration and open the engine.
    pub async fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        Self::open(config).await
    }

    /// Definitions are redeployed in file name order on every start, so the
    /// ids recorded on running instances stay stable while the files do.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
            .await
            .context("Failed to open database. Run 'procflow init' first.")?;

        let registry = Arc::new(InMemoryProcessRegistry::new());
        let definitions_dir = Path::new(&config.processes.definitions_dir);
        if definitions_dir.is_dir() {
            registry
                .deploy_dir(definitions_dir)
                .with_context(|| format!("Failed to deploy definitions from {}", definitions_dir.display()))?;
        } else {
            tracing::warn!(dir = %definitions_dir.display(), "definitions directory missing");
        }

        let identity_file = Path::new(&config.processes.identity_file);
        let identity = if identity_file.is_file() {
            let yaml = std::fs::read_to_string(identity_file)
                .with_context(|| format!("Failed to read {}", identity_file.display()))?;
            StaticIdentityDirectory::from_yaml(&yaml)?
        } else {
            tracing::warn!(file = %identity_file.display(), "identity file missing, using an empty directory");
            StaticIdentityDirectory::new()
        };

        let ctx = EngineContext::sqlite(pool, registry.clone(), Arc::new(identity), config);
        Ok(Self { ctx, registry })
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(self.ctx.clone())
    }

    pub fn runtime(&self) -> RuntimeService {
        RuntimeService::new(self.ctx.clone())
    }

    pub fn copies(&self) -> CopyTaskService {
        CopyTaskService::new(self.ctx.clone())
    }
}
