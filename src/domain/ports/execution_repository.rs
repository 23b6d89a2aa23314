use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivityRecord, Execution, ProcessInstance};

/// Read side of runtime state: instances, executions and the activity path.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn get_instance(&self, id: &str) -> DomainResult<Option<ProcessInstance>>;

    async fn get_execution(&self, id: &str) -> DomainResult<Option<Execution>>;

    /// All executions of an instance, root first
    async fn list_executions(&self, process_instance_id: &str) -> DomainResult<Vec<Execution>>;

    async fn get_record(&self, id: &str) -> DomainResult<Option<ActivityRecord>>;

    /// Every activity record of an instance, oldest first
    async fn list_records(&self, process_instance_id: &str) -> DomainResult<Vec<ActivityRecord>>;
}
