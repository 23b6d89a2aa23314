//! Audit entries, comments and attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Created,
    Claimed,
    Unclaimed,
    Delegated,
    Resolved,
    Completed,
    Rejected,
    Withdrawn,
    Deleted,
    Updated,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Claimed => "claimed",
            Self::Unclaimed => "unclaimed",
            Self::Delegated => "delegated",
            Self::Resolved => "resolved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Deleted => "deleted",
            Self::Updated => "updated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "claimed" => Some(Self::Claimed),
            "unclaimed" => Some(Self::Unclaimed),
            "delegated" => Some(Self::Delegated),
            "resolved" => Some(Self::Resolved),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            "deleted" => Some(Self::Deleted),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// Append-only audit record of a task action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub task_id: String,
    pub process_instance_id: Option<String>,
    pub action: TaskAction,
    pub reason: Option<String>,
    pub business_op: Option<String>,
    pub business_remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(task_id: &str, process_instance_id: Option<&str>, action: TaskAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: None,
            task_id: task_id.to_string(),
            process_instance_id: process_instance_id.map(ToString::to_string),
            action,
            reason: None,
            business_op: None,
            business_remark: None,
            created_at: Utc::now(),
        }
    }

    pub fn by(mut self, actor: Option<&str>) -> Self {
        self.actor_id = actor.map(ToString::to_string);
        self
    }

    pub fn with_reason(
        mut self,
        reason: Option<&str>,
        business_op: Option<&str>,
        business_remark: Option<&str>,
    ) -> Self {
        self.reason = reason.map(ToString::to_string);
        self.business_op = business_op.map(ToString::to_string);
        self.business_remark = business_remark.map(ToString::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub task_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub user_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(task_id: Option<&str>, process_instance_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.map(ToString::to_string),
            process_instance_id: process_instance_id.map(ToString::to_string),
            user_id: None,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Where an attachment's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    Url(String),
    Content(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub attachment_type: String,
    pub task_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn new(
        attachment_type: impl Into<String>,
        task_id: Option<&str>,
        process_instance_id: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attachment_type: attachment_type.into(),
            task_id: task_id.map(ToString::to_string),
            process_instance_id: process_instance_id.map(ToString::to_string),
            name: name.into(),
            description: None,
            url: None,
            created_at: Utc::now(),
        }
    }
}
