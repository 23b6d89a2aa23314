use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActivityRecord, AuditEntry, Execution, IdentityLink, ProcessInstance, Task, TaskOutcome,
    VariableWrite,
};

/// Write to the process-instance row of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceWrite {
    Insert(ProcessInstance),
    /// Compare-and-set bump of the instance version
    Touch {
        id: String,
        expected_version: u64,
        ended_at: Option<DateTime<Utc>>,
    },
}

/// Removal of a live task that leaves a historic record behind.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskClosure {
    pub task_id: String,
    pub expected_version: u64,
    pub outcome: TaskOutcome,
    pub reason: Option<String>,
    pub ended_at: DateTime<Utc>,
}

/// Removal requested through `delete`; `cascade` also purges history and attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDeletion {
    pub task_id: String,
    pub cascade: bool,
    pub reason: Option<String>,
}

/// Every write of one transition, committed in a single SQL transaction.
///
/// Task updates and closures are compare-and-set on `version`; a stale
/// version fails the whole commit with `ConcurrencyConflict`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub instance: Option<InstanceWrite>,
    /// Inserted or replaced
    pub executions: Vec<Execution>,
    /// Deleted together with their variables
    pub removed_executions: Vec<String>,
    pub activity_records: Vec<ActivityRecord>,
    pub new_tasks: Vec<Task>,
    pub updated_tasks: Vec<Task>,
    pub closed_tasks: Vec<TaskClosure>,
    pub deleted_tasks: Vec<TaskDeletion>,
    pub variables: Vec<VariableWrite>,
    pub identity_links: Vec<IdentityLink>,
    pub audit: Vec<AuditEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[async_trait]
pub trait ChangeSetStore: Send + Sync {
    async fn commit(&self, changes: ChangeSet) -> DomainResult<()>;
}
