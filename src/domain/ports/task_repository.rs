use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoricTask, Task, TaskFilter};

/// Read side of task persistence. Writes go through [`super::ChangeSetStore`].
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Get a live task by ID
    async fn get(&self, id: &str) -> DomainResult<Option<Task>>;

    /// List live tasks matching the filter, highest priority first
    async fn list(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>>;

    /// Live tasks of a process instance
    async fn list_by_instance(&self, process_instance_id: &str) -> DomainResult<Vec<Task>>;

    /// Live subtasks of a task
    async fn get_sub_tasks(&self, parent_task_id: &str) -> DomainResult<Vec<Task>>;

    /// Historic record of a task, live or finished
    async fn get_historic(&self, id: &str) -> DomainResult<Option<HistoricTask>>;

    /// Historic tasks at a node of an instance, most recent first
    async fn historic_at_node(
        &self,
        process_instance_id: &str,
        node_key: &str,
    ) -> DomainResult<Vec<HistoricTask>>;
}
