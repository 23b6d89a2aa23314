use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Identity, IdentityLink, IdentityLinkType};

#[async_trait]
pub trait IdentityLinkRepository: Send + Sync {
    async fn add(&self, link: &IdentityLink) -> DomainResult<()>;

    /// Delete the task links matching identity and type; returns the number removed
    async fn delete_for_task(
        &self,
        task_id: &str,
        identity: &Identity,
        link_type: &IdentityLinkType,
    ) -> DomainResult<u64>;

    async fn list_for_task(&self, task_id: &str) -> DomainResult<Vec<IdentityLink>>;

    async fn list_for_process_instance(&self, process_instance_id: &str) -> DomainResult<Vec<IdentityLink>>;
}
