use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::errors::DomainResult;

/// Context handed to the withdraw authorization check.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawRequest<'a> {
    pub task_id: &'a str,
    pub node_key: Option<&'a str>,
    pub caller: &'a str,
    /// Assignee of the task whose completion created the withdrawn task
    pub previous_performer: Option<&'a str>,
}

/// Identity and organisation lookups.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Expand users and groups into a de-duplicated set of user ids
    async fn resolve_recipients(&self, users: &[String], groups: &[String]) -> DomainResult<BTreeSet<String>>;

    async fn is_authorized_withdrawer(&self, request: &WithdrawRequest<'_>) -> DomainResult<bool>;

    /// Display name of a user; `None` when the directory does not know it
    async fn display_name(&self, user_id: &str) -> DomainResult<Option<String>>;

    /// Groups the user belongs to
    async fn groups_of(&self, user_id: &str) -> DomainResult<Vec<String>>;
}
