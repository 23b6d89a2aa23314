//! Identity links between tasks or process instances and users or groups.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityLinkType {
    Candidate,
    Assignee,
    Owner,
    Starter,
    Participant,
    Custom(String),
}

impl IdentityLinkType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Candidate => "candidate",
            Self::Assignee => "assignee",
            Self::Owner => "owner",
            Self::Starter => "starter",
            Self::Participant => "participant",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "candidate" => Self::Candidate,
            "assignee" => Self::Assignee,
            "owner" => Self::Owner,
            "starter" => Self::Starter,
            "participant" => Self::Participant,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Either side of an identity link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    User(String),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    pub id: String,
    pub task_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub link_type: IdentityLinkType,
}

impl IdentityLink {
    pub fn for_task(task_id: &str, identity: Identity, link_type: IdentityLinkType) -> Self {
        let (user_id, group_id) = match identity {
            Identity::User(user) => (Some(user), None),
            Identity::Group(group) => (None, Some(group)),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: Some(task_id.to_string()),
            process_instance_id: None,
            user_id,
            group_id,
            link_type,
        }
    }

    pub fn for_process_instance(instance_id: &str, user_id: &str, link_type: IdentityLinkType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: None,
            process_instance_id: Some(instance_id.to_string()),
            user_id: Some(user_id.to_string()),
            group_id: None,
            link_type,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.user_id.is_some() == self.group_id.is_some() {
            return Err(DomainError::ValidationFailed(
                "identity link needs exactly one of user or group".into(),
            ));
        }
        if self.task_id.is_none() && self.process_instance_id.is_none() {
            return Err(DomainError::ValidationFailed(
                "identity link needs a task or a process instance".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_link_type_round_trips_through_str() {
        let custom = IdentityLinkType::parse("reviewer");
        assert_eq!(custom, IdentityLinkType::Custom("reviewer".into()));
        assert_eq!(custom.as_str(), "reviewer");
        assert_eq!(IdentityLinkType::parse("candidate"), IdentityLinkType::Candidate);
    }

    #[test]
    fn test_task_link_validation() {
        let link = IdentityLink::for_task("t1", Identity::Group("management".into()), IdentityLinkType::Candidate);
        assert!(link.validate().is_ok());
        assert_eq!(link.group_id.as_deref(), Some("management"));

        let mut broken = link.clone();
        broken.user_id = Some("kermit".into());
        assert!(broken.validate().is_err());
    }
}
