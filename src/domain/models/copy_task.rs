//! Copy (notification) tasks and their read history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a broadcast happened: one activity-instance id shared by all recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastPoint {
    pub activity_instance_id: String,
    pub node_key: String,
    pub node_name: String,
    pub process_definition_key: String,
    pub process_instance_id: String,
    pub business_key: Option<String>,
}

/// Non-blocking read-acknowledgement item for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTask {
    pub id: String,
    pub activity_instance_id: String,
    pub node_key: String,
    pub node_name: String,
    pub recipient: String,
    pub process_definition_key: String,
    pub process_instance_id: String,
    pub business_key: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CopyTask {
    pub fn for_recipient(point: &BroadcastPoint, recipient: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_instance_id: point.activity_instance_id.clone(),
            node_key: point.node_key.clone(),
            node_name: point.node_name.clone(),
            recipient: recipient.into(),
            process_definition_key: point.process_definition_key.clone(),
            process_instance_id: point.process_instance_id.clone(),
            business_key: point.business_key.clone(),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Read-history entry written when a copy task is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTaskRead {
    pub id: String,
    pub copy_task_id: String,
    pub activity_instance_id: String,
    pub reader: String,
    pub reader_name: String,
    pub node_key: String,
    pub node_name: String,
    pub process_definition_key: String,
    pub process_instance_id: String,
    pub business_key: Option<String>,
    pub read_at: DateTime<Utc>,
}

impl CopyTaskRead {
    pub fn of(copy_task: &CopyTask, reader: &str, reader_name: String, read_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            copy_task_id: copy_task.id.clone(),
            activity_instance_id: copy_task.activity_instance_id.clone(),
            reader: reader.to_string(),
            reader_name,
            node_key: copy_task.node_key.clone(),
            node_name: copy_task.node_name.clone(),
            process_definition_key: copy_task.process_definition_key.clone(),
            process_instance_id: copy_task.process_instance_id.clone(),
            business_key: copy_task.business_key.clone(),
            read_at,
        }
    }
}

/// Filter shared by the copy-task listing queries.
#[derive(Debug, Clone, Default)]
pub struct CopyTaskQuery {
    /// Recipient (unread views) or reader (read-history views); `None` for admin views
    pub user: Option<String>,
    pub process_definition_key: Option<String>,
    pub business_key: Option<String>,
}

impl CopyTaskQuery {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::default()
        }
    }

    pub fn process_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }
}

/// Display names of the readers of one activity instance, truncated to a limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadUserNames {
    pub names: Vec<String>,
    pub total: u64,
    pub limit: usize,
}

impl ReadUserNames {
    pub fn has_more(&self) -> bool {
        self.total > self.names.len() as u64
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.names.len() as u64)
    }

    /// Comma separated names followed by an "N more" indicator when truncated.
    pub fn summary(&self) -> String {
        let joined = self.names.join(", ");
        if self.has_more() {
            format!("{joined} and {} more", self.remaining())
        } else {
            joined
        }
    }
}
