//! Runtime state of process instances: executions and the activity path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::process::NodeKind;
use crate::domain::models::variable::{MultiInstanceMode, VariableValue};

/// A running (or finished) process instance.
///
/// The instance's root execution shares its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: String,
    pub definition_id: String,
    pub definition_key: String,
    pub business_key: Option<String>,
    pub starter: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Bumped by every token-moving transition
    pub version: u64,
}

impl ProcessInstance {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Fan-out bookkeeping held by the scope execution of a multi-instance node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiInstanceState {
    pub mode: MultiInstanceMode,
    pub node_key: String,
    pub elements: Vec<VariableValue>,
    pub element_variable: String,
    /// Index of the next element to hand out (sequential mode)
    pub next_index: u32,
    pub completed: u32,
    /// Activity record of the scope's entry into the node
    pub entry_record_id: String,
}

impl MultiInstanceState {
    pub fn total(&self) -> u32 {
        u32::try_from(self.elements.len()).unwrap_or(u32::MAX)
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total()
    }
}

/// A token moving through a process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub process_instance_id: String,
    pub parent_id: Option<String>,
    pub node_key: Option<String>,
    pub is_active: bool,
    /// Child of a fork or of a multi-instance scope
    pub is_concurrent: bool,
    pub multi_instance: Option<MultiInstanceState>,
    /// Activity record of the current node entry
    pub activity_record_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    pub fn root(process_instance_id: &str) -> Self {
        Self {
            id: process_instance_id.to_string(),
            process_instance_id: process_instance_id.to_string(),
            parent_id: None,
            node_key: None,
            is_active: true,
            is_concurrent: false,
            multi_instance: None,
            activity_record_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn child_of(parent: &Execution) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            process_instance_id: parent.process_instance_id.clone(),
            parent_id: Some(parent.id.clone()),
            node_key: parent.node_key.clone(),
            is_active: true,
            is_concurrent: true,
            multi_instance: None,
            activity_record_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Historic record of one node entry on the executed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub process_instance_id: String,
    pub execution_id: String,
    pub node_key: String,
    pub node_kind: NodeKind,
    /// Node the token arrived from
    pub from_node_key: Option<String>,
    /// Records this entry was reached from; several after a join
    pub from_records: Vec<String>,
    pub previous_task_id: Option<String>,
    pub previous_task_node: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_execution_shares_instance_id() {
        let root = Execution::root("pi-1");
        assert_eq!(root.id, "pi-1");
        assert!(root.is_root());

        let child = Execution::child_of(&root);
        assert_eq!(child.parent_id.as_deref(), Some("pi-1"));
        assert!(child.is_concurrent);
        assert_ne!(child.id, root.id);
    }

    #[test]
    fn test_multi_instance_progress() {
        let mut state = MultiInstanceState {
            mode: MultiInstanceMode::Sequential,
            node_key: "review".into(),
            elements: vec!["a".into(), "b".into()],
            element_variable: "reviewer".into(),
            next_index: 1,
            completed: 1,
            entry_record_id: "r1".into(),
        };
        assert!(!state.is_done());
        state.completed = 2;
        assert!(state.is_done());
    }
}
