//! Task domain model.
//!
//! A task is a human work item bound to one execution at one node, or a
//! standalone item created directly through the task service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Default task priority.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Delegation state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationState {
    #[default]
    None,
    /// Delegated and waiting for the delegate to resolve it.
    Pending,
    /// Handed back to the owner.
    Resolved,
}

impl DelegationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// How a task left the live set, as recorded in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Rejected,
    Withdrawn,
    Jumped,
    ReturnedToRejected,
    Deleted,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Jumped => "jumped",
            Self::ReturnedToRejected => "returned_to_rejected",
            Self::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            "jumped" => Some(Self::Jumped),
            "returned_to_rejected" => Some(Self::ReturnedToRejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Operation code a caller may attach to a completion.
///
/// The numeric codes are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOp {
    ReturnToRejected,
    Withdraw,
    Jump,
    Rejected,
}

impl CompletionOp {
    pub fn code(&self) -> u8 {
        match self {
            Self::ReturnToRejected => 0,
            Self::Withdraw => 1,
            Self::Jump => 2,
            Self::Rejected => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ReturnToRejected),
            1 => Some(Self::Withdraw),
            2 => Some(Self::Jump),
            3 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Outcome label written to the task history.
    pub fn outcome(&self) -> TaskOutcome {
        match self {
            Self::ReturnToRejected => TaskOutcome::ReturnedToRejected,
            Self::Withdraw => TaskOutcome::Withdrawn,
            Self::Jump => TaskOutcome::Jumped,
            Self::Rejected => TaskOutcome::Rejected,
        }
    }
}

/// A live human work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub owner: Option<String>,
    pub delegation_state: DelegationState,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    /// Parent task, for subtasks
    pub parent_task_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub process_definition_key: Option<String>,
    pub process_instance_id: Option<String>,
    pub execution_id: Option<String>,
    pub node_key: Option<String>,
    /// Activity record of the node entry that created this task
    pub activity_instance_id: Option<String>,
    /// Node the task returns to on completion after a reject with return
    pub return_to: Option<String>,
    /// Version for optimistic locking
    pub version: u64,
}

impl Task {
    /// Create a transient standalone task. The id is generated when not supplied.
    pub fn new(id: Option<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: String::new(),
            description: None,
            assignee: None,
            owner: None,
            delegation_state: DelegationState::None,
            priority: DEFAULT_PRIORITY,
            created_at: Utc::now(),
            due_date: None,
            parent_task_id: None,
            process_definition_id: None,
            process_definition_key: None,
            process_instance_id: None,
            execution_id: None,
            node_key: None,
            activity_instance_id: None,
            return_to: None,
            version: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_parent(mut self, parent_task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_task_id.into());
        self
    }

    /// Whether the task lives outside any process instance.
    pub fn is_standalone(&self) -> bool {
        self.execution_id.is_none()
    }

    /// Apply a claim. Returns `false` when the claim is a no-op.
    ///
    /// `None` unclaims unconditionally.
    pub fn claim(&mut self, user_id: Option<&str>) -> DomainResult<bool> {
        match (user_id, self.assignee.as_deref()) {
            (None, None) => Ok(false),
            (None, Some(_)) => {
                self.assignee = None;
                Ok(true)
            }
            (Some(user), Some(current)) if user == current => Ok(false),
            (Some(_), Some(current)) => Err(DomainError::AlreadyClaimed {
                task_id: self.id.clone(),
                assignee: current.to_string(),
            }),
            (Some(user), None) => {
                self.assignee = Some(user.to_string());
                Ok(true)
            }
        }
    }

    /// Hand the task to `user_id` while keeping ownership.
    pub fn delegate(&mut self, user_id: &str) {
        if self.owner.is_none() {
            self.owner = self.assignee.clone();
        }
        self.assignee = Some(user_id.to_string());
        self.delegation_state = DelegationState::Pending;
    }

    /// Hand a delegated task back to its owner.
    pub fn resolve(&mut self) -> DomainResult<()> {
        if self.delegation_state != DelegationState::Pending {
            return Err(DomainError::invalid_state(
                &self.id,
                format!(
                    "cannot resolve a task in delegation state {}",
                    self.delegation_state.as_str()
                ),
            ));
        }
        self.delegation_state = DelegationState::Resolved;
        self.assignee = self.owner.clone();
        Ok(())
    }

    /// Completion is refused while a delegation is pending.
    pub fn ensure_completable(&self) -> DomainResult<()> {
        if self.delegation_state == DelegationState::Pending {
            return Err(DomainError::invalid_state(
                &self.id,
                "task is delegated and must be resolved before completion",
            ));
        }
        Ok(())
    }

    /// Check the structural invariants before the task is persisted.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("task id cannot be empty".into()));
        }
        if self.delegation_state == DelegationState::Pending && self.owner.is_none() {
            return Err(DomainError::ValidationFailed(format!(
                "task {} is pending delegation without an owner",
                self.id
            )));
        }
        if self.execution_id.is_some() && self.process_instance_id.is_none() {
            return Err(DomainError::ValidationFailed(format!(
                "task {} has an execution but no process instance",
                self.id
            )));
        }
        Ok(())
    }
}

/// Historic record of a task, kept after it leaves the live set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricTask {
    pub id: String,
    pub name: String,
    pub process_instance_id: Option<String>,
    pub execution_id: Option<String>,
    pub node_key: Option<String>,
    pub assignee: Option<String>,
    pub owner: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub outcome: Option<TaskOutcome>,
    pub delete_reason: Option<String>,
    pub activity_instance_id: Option<String>,
}

impl HistoricTask {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

impl From<&Task> for HistoricTask {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            process_instance_id: task.process_instance_id.clone(),
            execution_id: task.execution_id.clone(),
            node_key: task.node_key.clone(),
            assignee: task.assignee.clone(),
            owner: task.owner.clone(),
            start_time: task.created_at,
            end_time: None,
            outcome: None,
            delete_reason: None,
            activity_instance_id: task.activity_instance_id.clone(),
        }
    }
}

/// Filter for live task queries.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub assignee: Option<String>,
    /// Tasks the user is a candidate for, directly or through `candidate_groups`
    pub candidate_user: Option<String>,
    pub candidate_groups: Vec<String>,
    pub process_instance_id: Option<String>,
    pub node_key: Option<String>,
    pub parent_task_id: Option<String>,
    pub unassigned_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_rules() {
        let mut task = Task::new(Some("t1".into()));
        assert!(task.claim(Some("kermit")).unwrap());
        assert!(!task.claim(Some("kermit")).unwrap());
        assert!(matches!(
            task.claim(Some("gonzo")),
            Err(DomainError::AlreadyClaimed { .. })
        ));
        assert!(task.claim(None).unwrap());
        assert_eq!(task.assignee, None);
    }

    #[test]
    fn test_delegate_keeps_prior_assignee_as_owner() {
        let mut task = Task::new(None).with_assignee("kermit");
        task.delegate("fozzie");
        assert_eq!(task.owner.as_deref(), Some("kermit"));
        assert_eq!(task.assignee.as_deref(), Some("fozzie"));
        assert!(task.ensure_completable().is_err());

        task.resolve().unwrap();
        assert_eq!(task.delegation_state, DelegationState::Resolved);
        assert_eq!(task.assignee.as_deref(), Some("kermit"));
        assert!(task.ensure_completable().is_ok());
        assert!(task.resolve().is_err());
    }

    #[test]
    fn test_delegate_with_existing_owner() {
        let mut task = Task::new(None).with_assignee("kermit");
        task.owner = Some("piggy".into());
        task.delegate("fozzie");
        assert_eq!(task.owner.as_deref(), Some("piggy"));
    }

    #[test]
    fn test_completion_op_codes() {
        for code in 0..4 {
            assert_eq!(CompletionOp::from_code(code).unwrap().code(), code);
        }
        assert_eq!(CompletionOp::from_code(4), None);
        assert_eq!(CompletionOp::Rejected.outcome(), TaskOutcome::Rejected);
    }

    #[test]
    fn test_validate_pending_requires_owner() {
        let mut task = Task::new(None);
        task.delegation_state = DelegationState::Pending;
        assert!(task.validate().is_err());
        task.owner = Some("kermit".into());
        assert!(task.validate().is_ok());
    }
}
