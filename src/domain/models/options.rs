//! Options carried by task transitions.

use serde::{Deserialize, Serialize};

use crate::domain::models::task::CompletionOp;
use crate::domain::models::variable::{VariableMap, VariableValue};

/// Which predecessor a reject routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectType {
    /// The task whose completion moved the token here (code 0)
    #[default]
    PriorTask,
    /// The node this activity was entered from on the recorded path (code 1)
    PriorPath,
}

impl RejectType {
    pub fn code(&self) -> u8 {
        match self {
            Self::PriorTask => 0,
            Self::PriorPath => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::PriorTask),
            1 => Some(Self::PriorPath),
            _ => None,
        }
    }
}

/// Business annotations recorded with a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionNote {
    pub reason: Option<String>,
    pub business_op: Option<String>,
    pub business_remark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompleteOptions {
    pub variables: VariableMap,
    pub note: TransitionNote,
    /// Move to this node instead of following the outgoing flows
    pub destination_key: Option<String>,
    pub op: Option<CompletionOp>,
    /// Acting user, recorded in the audit trail
    pub actor: Option<String>,
}

impl CompleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn variables(mut self, variables: VariableMap) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.note.reason = Some(reason.into());
        self
    }

    pub fn business(mut self, op: impl Into<String>, remark: impl Into<String>) -> Self {
        self.note.business_op = Some(op.into());
        self.note.business_remark = Some(remark.into());
        self
    }

    pub fn destination(mut self, node_key: impl Into<String>) -> Self {
        self.destination_key = Some(node_key.into());
        self
    }

    pub fn op(mut self, op: CompletionOp) -> Self {
        self.op = Some(op);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RejectOptions {
    pub variables: VariableMap,
    pub note: TransitionNote,
    pub reject_type: RejectType,
    /// Required by `reject_to_task`
    pub destination_key: Option<String>,
    /// The created task returns to the rejection point when completed
    pub return_to_reject: bool,
    pub actor: Option<String>,
}

impl RejectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.note.reason = Some(reason.into());
        self
    }

    pub fn business(mut self, op: impl Into<String>, remark: impl Into<String>) -> Self {
        self.note.business_op = Some(op.into());
        self.note.business_remark = Some(remark.into());
        self
    }

    pub fn reject_type(mut self, reject_type: RejectType) -> Self {
        self.reject_type = reject_type;
        self
    }

    pub fn destination(mut self, node_key: impl Into<String>) -> Self {
        self.destination_key = Some(node_key.into());
        self
    }

    pub fn return_to_reject(mut self, enabled: bool) -> Self {
        self.return_to_reject = enabled;
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithdrawOptions {
    pub variables: VariableMap,
    pub note: TransitionNote,
    /// Node to pull the token back to; defaults to the prior task node
    pub destination_key: Option<String>,
}

impl WithdrawOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.note.reason = Some(reason.into());
        self
    }

    pub fn destination(mut self, node_key: impl Into<String>) -> Self {
        self.destination_key = Some(node_key.into());
        self
    }
}

/// Backward-routing candidates for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionTarget {
    pub prior_task_node: Option<String>,
    /// `None` when the activity was entered from several branches, or when no
    /// user task can be reached backward from it without crossing a join
    pub prior_path_node: Option<String>,
}

/// Why a reject or withdraw could not move the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFailure {
    NoPredecessor,
    ProcessStart,
    AmbiguousPath,
    UnknownDestination(String),
    NotAuthorized,
    StandaloneTask,
}

impl RoutingFailure {
    pub fn describe(&self) -> String {
        match self {
            Self::NoPredecessor => "no predecessor task to route back to".to_string(),
            Self::ProcessStart => "the path leads back to the process start".to_string(),
            Self::AmbiguousPath => "the activity was entered from several paths".to_string(),
            Self::UnknownDestination(key) => format!("'{key}' is not a user task of this process"),
            Self::NotAuthorized => "caller may not withdraw this task".to_string(),
            Self::StandaloneTask => "task does not belong to a process instance".to_string(),
        }
    }
}

/// Result of a reject or withdraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    Moved {
        target_node: String,
        new_task_ids: Vec<String>,
    },
    Refused(RoutingFailure),
}

impl RoutingOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }

    pub fn failure(&self) -> Option<&RoutingFailure> {
        match self {
            Self::Refused(failure) => Some(failure),
            Self::Moved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_options_builder() {
        let opts = CompleteOptions::new()
            .variable("approved", true)
            .reason("looks good")
            .destination("archive")
            .op(CompletionOp::Jump);
        assert_eq!(opts.variables.get("approved"), Some(&VariableValue::Boolean(true)));
        assert_eq!(opts.destination_key.as_deref(), Some("archive"));
        assert_eq!(opts.op.map(|op| op.code()), Some(2));
    }

    #[test]
    fn test_reject_type_codes() {
        assert_eq!(RejectType::from_code(1), Some(RejectType::PriorPath));
        assert_eq!(RejectType::default().code(), 0);
        assert_eq!(RejectType::from_code(2), None);
    }

    #[test]
    fn test_outcome_helpers() {
        let refused = RoutingOutcome::Refused(RoutingFailure::AmbiguousPath);
        assert!(!refused.succeeded());
        assert_eq!(refused.failure(), Some(&RoutingFailure::AmbiguousPath));
    }
}
