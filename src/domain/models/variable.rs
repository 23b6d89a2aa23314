//! Process variables and the scopes they live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Task-local variable mirroring a task's return-to-reject address.
pub const RETURN_TO_REJECT_VARIABLE: &str = "bpmn.behavior.returnToReject";

/// Loop counter variable set on every multi-instance child execution.
pub const LOOP_COUNTER_VARIABLE: &str = "loopCounter";

/// Name of the variable that overrides the multi-instance mode of a node.
pub fn multi_instance_mode_variable(node_key: &str) -> String {
    format!("{node_key}.bpmn.behavior.multiInstance.mode")
}

/// Typed variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    Json(serde_json::Value),
}

impl VariableValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert an untyped JSON value into the closest typed variant.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map_or(Self::Null, Self::Double),
            },
            serde_json::Value::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }

    /// Expand a value into a list of elements.
    ///
    /// JSON arrays yield their elements, strings are split on commas and an
    /// integer `n` yields the loop indexes `0..n`.
    pub fn elements(&self) -> Vec<VariableValue> {
        match self {
            Self::Json(serde_json::Value::Array(items)) => {
                items.iter().cloned().map(Self::from_json).collect()
            }
            Self::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Self::String(part.to_string()))
                .collect(),
            Self::Integer(n) => (0..(*n).max(0)).map(Self::Integer).collect(),
            Self::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Render a value as a plain identifier, for assignee and recipient expressions.
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Boolean(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Double(d) => Some(d.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Date(d) => Some(d.to_rfc3339()),
            Self::Json(v) => Some(v.to_string()),
        }
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for VariableValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for VariableValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<serde_json::Value> for VariableValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Variables keyed by name.
pub type VariableMap = BTreeMap<String, VariableValue>;

/// Scope a variable is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ScopeRef {
    Task(String),
    Execution(String),
}

impl ScopeRef {
    pub fn scope_type(&self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Execution(_) => "execution",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Task(id) | Self::Execution(id) => id,
        }
    }

    pub fn from_parts(scope_type: &str, id: String) -> Option<Self> {
        match scope_type {
            "task" => Some(Self::Task(id)),
            "execution" => Some(Self::Execution(id)),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type(), self.id())
    }
}

/// A pending variable mutation. `value: None` removes the variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableWrite {
    pub scope: ScopeRef,
    pub name: String,
    pub value: Option<VariableValue>,
}

impl VariableWrite {
    pub fn set(scope: ScopeRef, name: impl Into<String>, value: VariableValue) -> Self {
        Self {
            scope,
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn remove(scope: ScopeRef, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            value: None,
        }
    }
}

/// How a multi-instance node fans out its task instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiInstanceMode {
    #[default]
    Parallel,
    Sequential,
}

impl MultiInstanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

impl FromStr for MultiInstanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!("unknown multi-instance mode: {other}")),
        }
    }
}
