use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AuditEntry;

/// Append-only audit trail of task actions.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> DomainResult<()>;

    /// Entries recorded for a task, oldest first
    async fn task_events(&self, task_id: &str) -> DomainResult<Vec<AuditEntry>>;
}
