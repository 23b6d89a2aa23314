use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CopyTask, CopyTaskQuery, CopyTaskRead, Page, PageRequest};

/// Persistence of copy tasks and their read history.
#[async_trait]
pub trait CopyTaskRepository: Send + Sync {
    /// Insert all copy tasks in one transaction. Returns how many rows were new.
    async fn insert_batch(&self, copy_tasks: &[CopyTask]) -> DomainResult<u64>;

    /// Insert one copy task; an existing (activity instance, recipient) pair is
    /// kept and `false` returned
    async fn insert(&self, copy_task: &CopyTask) -> DomainResult<bool>;

    async fn get(&self, id: &str) -> DomainResult<Option<CopyTask>>;

    /// Flag the copy task read and append the history entry atomically.
    ///
    /// Returns `false` when it was already read.
    async fn mark_read(&self, read: &CopyTaskRead) -> DomainResult<bool>;

    /// Unread copy tasks; `query.user` filters by recipient
    async fn list_unread(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>>;

    /// Read-history entries; `query.user` filters by reader
    async fn list_reads(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTaskRead>>;

    /// Readers of one activity instance, oldest read first
    async fn reads_for_activity(
        &self,
        activity_instance_id: &str,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>>;

    async fn list_for_activity(&self, activity_instance_id: &str) -> DomainResult<Vec<CopyTask>>;
}
