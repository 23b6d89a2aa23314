//! Process definition graph.
//!
//! Definitions are immutable once deployed. They are built with
//! [`ProcessDefinitionBuilder`] or deserialized from YAML.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::variable::MultiInstanceMode;

/// Kind of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    StartEvent,
    UserTask,
    ServiceTask,
    ExclusiveGateway,
    ParallelGateway,
    EndEvent,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartEvent => "start_event",
            Self::UserTask => "user_task",
            Self::ServiceTask => "service_task",
            Self::ExclusiveGateway => "exclusive_gateway",
            Self::ParallelGateway => "parallel_gateway",
            Self::EndEvent => "end_event",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "start_event" => Some(Self::StartEvent),
            "user_task" => Some(Self::UserTask),
            "service_task" => Some(Self::ServiceTask),
            "exclusive_gateway" => Some(Self::ExclusiveGateway),
            "parallel_gateway" => Some(Self::ParallelGateway),
            "end_event" => Some(Self::EndEvent),
            _ => None,
        }
    }

    /// Nodes that run without human interaction.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::UserTask)
    }
}

/// Multi-instance characteristics of a user task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiInstanceSpec {
    /// Design-time mode, overridable through the mode variable
    #[serde(default)]
    pub mode: MultiInstanceMode,
    /// Variable holding the collection to fan out over
    pub collection: String,
    /// Local variable receiving the element on each instance
    pub element_variable: String,
}

/// Copy recipients of a broadcast node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl CopySpec {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub kind: NodeKind,
    /// Assignee literal or `${variable}` expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_instance: Option<MultiInstanceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_to: Option<CopySpec>,
}

impl FlowNode {
    pub fn new(key: impl Into<String>, kind: NodeKind) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            kind,
            assignee: None,
            candidate_users: Vec::new(),
            candidate_groups: Vec::new(),
            multi_instance: None,
            copy_to: None,
        }
    }

    pub fn is_user_task(&self) -> bool {
        self.kind == NodeKind::UserTask
    }

    /// Whether reaching this node spawns copy tasks.
    pub fn is_broadcast(&self) -> bool {
        self.copy_to.as_ref().is_some_and(|spec| !spec.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// Condition expression, evaluated on exclusive gateways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// A deployed process definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// `key:version`, assigned on deployment
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<FlowNode>,
    pub flows: Vec<SequenceFlow>,
}

impl ProcessDefinition {
    pub fn node(&self, key: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    pub fn require_node(&self, key: &str) -> DomainResult<&FlowNode> {
        self.node(key).ok_or_else(|| DomainError::NodeNotFound {
            definition_id: self.id.clone(),
            node_key: key.to_string(),
        })
    }

    pub fn start_node(&self) -> DomainResult<&FlowNode> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::StartEvent)
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("definition {} has no start event", self.key))
            })
    }

    pub fn outgoing(&self, key: &str) -> Vec<&SequenceFlow> {
        self.flows.iter().filter(|f| f.source == key).collect()
    }

    pub fn incoming(&self, key: &str) -> Vec<&SequenceFlow> {
        self.flows.iter().filter(|f| f.target == key).collect()
    }

    /// First user task reachable from the start event, breadth first.
    pub fn first_user_task(&self) -> Option<&FlowNode> {
        let start = self.start_node().ok()?;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.key.as_str()]);
        while let Some(key) = queue.pop_front() {
            if !seen.insert(key) {
                continue;
            }
            let node = self.node(key)?;
            if node.is_user_task() {
                return Some(node);
            }
            for flow in self.outgoing(key) {
                queue.push_back(flow.target.as_str());
            }
        }
        None
    }

    /// Source nodes of the flows entering `key`.
    pub fn predecessor_path_nodes(&self, key: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        for flow in self.incoming(key) {
            out.insert(flow.source.clone());
        }
        out.into_iter().collect()
    }

    /// User-task nodes reachable backward from `key` across automatic nodes.
    pub fn predecessor_task_nodes(&self, key: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = self.incoming(key).iter().map(|f| f.source.as_str()).collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.node(current) else { continue };
            if node.is_user_task() {
                out.insert(node.key.clone());
            } else {
                queue.extend(self.incoming(current).iter().map(|f| f.source.as_str()));
            }
        }
        out.into_iter().collect()
    }

    /// Structural checks run on deployment.
    pub fn validate(&self) -> DomainResult<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::ValidationFailed("definition key cannot be empty".into()));
        }
        let mut keys = HashSet::new();
        for node in &self.nodes {
            if !keys.insert(node.key.as_str()) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate node key '{}' in {}",
                    node.key, self.key
                )));
            }
            if node.multi_instance.is_some() && !node.is_user_task() {
                return Err(DomainError::ValidationFailed(format!(
                    "node '{}' is multi-instance but not a user task",
                    node.key
                )));
            }
        }
        let starts = self.nodes.iter().filter(|n| n.kind == NodeKind::StartEvent).count();
        if starts != 1 {
            return Err(DomainError::ValidationFailed(format!(
                "definition {} must have exactly one start event, found {starts}",
                self.key
            )));
        }
        for flow in &self.flows {
            for end in [&flow.source, &flow.target] {
                if !keys.contains(end.as_str()) {
                    return Err(DomainError::ValidationFailed(format!(
                        "flow {} references unknown node '{end}'",
                        flow.id
                    )));
                }
            }
        }
        for node in &self.nodes {
            let defaults = self.outgoing(&node.key).iter().filter(|f| f.is_default).count();
            if defaults > 1 {
                return Err(DomainError::ValidationFailed(format!(
                    "node '{}' has more than one default flow",
                    node.key
                )));
            }
            if node.kind != NodeKind::EndEvent && self.outgoing(&node.key).is_empty() {
                return Err(DomainError::ValidationFailed(format!(
                    "node '{}' has no outgoing flow",
                    node.key
                )));
            }
        }
        Ok(())
    }
}

/// Fluent construction of a [`ProcessDefinition`].
///
/// Node modifiers (`assignee`, `candidate_users`, ...) apply to the node added last.
#[derive(Debug, Clone)]
pub struct ProcessDefinitionBuilder {
    key: String,
    name: String,
    nodes: Vec<FlowNode>,
    flows: Vec<SequenceFlow>,
}

impl ProcessDefinitionBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            nodes: Vec::new(),
            flows: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn node(mut self, key: &str, kind: NodeKind) -> Self {
        self.nodes.push(FlowNode::new(key, kind));
        self
    }

    pub fn start_event(self, key: &str) -> Self {
        self.node(key, NodeKind::StartEvent)
    }

    pub fn user_task(self, key: &str, name: &str) -> Self {
        let mut builder = self.node(key, NodeKind::UserTask);
        if let Some(last) = builder.nodes.last_mut() {
            last.name = name.to_string();
        }
        builder
    }

    pub fn service_task(self, key: &str) -> Self {
        self.node(key, NodeKind::ServiceTask)
    }

    pub fn exclusive_gateway(self, key: &str) -> Self {
        self.node(key, NodeKind::ExclusiveGateway)
    }

    pub fn parallel_gateway(self, key: &str) -> Self {
        self.node(key, NodeKind::ParallelGateway)
    }

    pub fn end_event(self, key: &str) -> Self {
        self.node(key, NodeKind::EndEvent)
    }

    fn modify_last(mut self, f: impl FnOnce(&mut FlowNode)) -> Self {
        if let Some(last) = self.nodes.last_mut() {
            f(last);
        }
        self
    }

    pub fn assignee(self, assignee: &str) -> Self {
        self.modify_last(|n| n.assignee = Some(assignee.to_string()))
    }

    pub fn candidate_users(self, users: &[&str]) -> Self {
        self.modify_last(|n| n.candidate_users = users.iter().map(ToString::to_string).collect())
    }

    pub fn candidate_groups(self, groups: &[&str]) -> Self {
        self.modify_last(|n| n.candidate_groups = groups.iter().map(ToString::to_string).collect())
    }

    pub fn multi_instance(self, mode: MultiInstanceMode, collection: &str, element_variable: &str) -> Self {
        self.modify_last(|n| {
            n.multi_instance = Some(MultiInstanceSpec {
                mode,
                collection: collection.to_string(),
                element_variable: element_variable.to_string(),
            });
        })
    }

    pub fn copy_to(self, users: &[&str], groups: &[&str]) -> Self {
        self.modify_last(|n| {
            n.copy_to = Some(CopySpec {
                users: users.iter().map(ToString::to_string).collect(),
                groups: groups.iter().map(ToString::to_string).collect(),
            });
        })
    }

    fn push_flow(mut self, source: &str, target: &str, condition: Option<&str>, is_default: bool) -> Self {
        let id = format!("flow{}", self.flows.len() + 1);
        self.flows.push(SequenceFlow {
            id,
            source: source.to_string(),
            target: target.to_string(),
            condition: condition.map(ToString::to_string),
            is_default,
        });
        self
    }

    pub fn flow(self, source: &str, target: &str) -> Self {
        self.push_flow(source, target, None, false)
    }

    pub fn conditional_flow(self, source: &str, target: &str, condition: &str) -> Self {
        self.push_flow(source, target, Some(condition), false)
    }

    pub fn default_flow(self, source: &str, target: &str) -> Self {
        self.push_flow(source, target, None, true)
    }

    pub fn build(self) -> DomainResult<ProcessDefinition> {
        let definition = ProcessDefinition {
            id: String::new(),
            key: self.key,
            version: 0,
            name: self.name,
            nodes: self.nodes,
            flows: self.flows,
        };
        definition.validate()?;
        Ok(definition)
    }
}
