//! Port bundle shared by the engine services.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::adapters::sqlite::{
    SqliteAuditSink, SqliteChangeSetStore, SqliteCommentRepository, SqliteCopyTaskRepository,
    SqliteExecutionRepository, SqliteIdentityLinkRepository, SqliteTaskRepository, SqliteVariableRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{
    AuditSink, ChangeSetStore, CommentRepository, CopyTaskRepository, ExecutionRepository, IdentityDirectory,
    IdentityLinkRepository, ProcessGraph, TaskRepository, VariableRepository,
};

/// Every port the engine talks to, plus configuration.
#[derive(Clone)]
pub struct EngineContext {
    pub tasks: Arc<dyn TaskRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub variables: Arc<dyn VariableRepository>,
    pub copy_tasks: Arc<dyn CopyTaskRepository>,
    pub identity_links: Arc<dyn IdentityLinkRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub store: Arc<dyn ChangeSetStore>,
    pub graph: Arc<dyn ProcessGraph>,
    pub identity: Arc<dyn IdentityDirectory>,
    pub config: Arc<Config>,
}

impl EngineContext {
    /// Wire the SQLite adapters around one pool.
    pub fn sqlite(
        pool: SqlitePool,
        graph: Arc<dyn ProcessGraph>,
        identity: Arc<dyn IdentityDirectory>,
        config: Config,
    ) -> Self {
        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            executions: Arc::new(SqliteExecutionRepository::new(pool.clone())),
            variables: Arc::new(SqliteVariableRepository::new(pool.clone())),
            copy_tasks: Arc::new(SqliteCopyTaskRepository::new(pool.clone())),
            identity_links: Arc::new(SqliteIdentityLinkRepository::new(pool.clone())),
            comments: Arc::new(SqliteCommentRepository::new(pool.clone())),
            audit: Arc::new(SqliteAuditSink::new(pool.clone())),
            store: Arc::new(SqliteChangeSetStore::new(pool)),
            graph,
            identity,
            config: Arc::new(config),
        }
    }
}
