//! Static identity directory.
//!
//! Users, groups and withdraw grants are fixed at construction, either
//! through the builder methods or from a YAML document.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{IdentityDirectory, WithdrawRequest};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticIdentityDirectory {
    /// User id to display name
    users: BTreeMap<String, String>,
    /// Group id to member user ids
    groups: BTreeMap<String, BTreeSet<String>>,
    /// Users allowed to withdraw any task
    admins: BTreeSet<String>,
    /// Node key to users allowed to withdraw tasks at that node
    withdraw_grants: BTreeMap<String, BTreeSet<String>>,
    /// Whether the performer of the previous task may withdraw
    allow_previous_performer: bool,
}

impl Default for StaticIdentityDirectory {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            groups: BTreeMap::new(),
            admins: BTreeSet::new(),
            withdraw_grants: BTreeMap::new(),
            allow_previous_performer: true,
        }
    }
}

impl StaticIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(yaml: &str) -> DomainResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| DomainError::SerializationError(e.to_string()))
    }

    pub fn user(mut self, id: &str, display_name: &str) -> Self {
        self.users.insert(id.to_string(), display_name.to_string());
        self
    }

    pub fn group(mut self, id: &str, members: &[&str]) -> Self {
        self.groups
            .entry(id.to_string())
            .or_default()
            .extend(members.iter().map(ToString::to_string));
        self
    }

    pub fn admin(mut self, id: &str) -> Self {
        self.admins.insert(id.to_string());
        self
    }

    pub fn grant_withdraw(mut self, node_key: &str, user: &str) -> Self {
        self.withdraw_grants
            .entry(node_key.to_string())
            .or_default()
            .insert(user.to_string());
        self
    }

    pub fn allow_previous_performer(mut self, allowed: bool) -> Self {
        self.allow_previous_performer = allowed;
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn resolve_recipients(&self, users: &[String], groups: &[String]) -> DomainResult<BTreeSet<String>> {
        let mut recipients: BTreeSet<String> = users.iter().filter(|u| !u.is_empty()).cloned().collect();
        for group in groups {
            match self.groups.get(group) {
                Some(members) => recipients.extend(members.iter().cloned()),
                None => tracing::warn!(group = %group, "unknown group in recipient list"),
            }
        }
        Ok(recipients)
    }

    async fn is_authorized_withdrawer(&self, request: &WithdrawRequest<'_>) -> DomainResult<bool> {
        if self.admins.contains(request.caller) {
            return Ok(true);
        }
        if self.allow_previous_performer && request.previous_performer == Some(request.caller) {
            return Ok(true);
        }
        Ok(request
            .node_key
            .and_then(|key| self.withdraw_grants.get(key))
            .is_some_and(|granted| granted.contains(request.caller)))
    }

    async fn display_name(&self, user_id: &str) -> DomainResult<Option<String>> {
        Ok(self.users.get(user_id).cloned())
    }

    async fn groups_of(&self, user_id: &str) -> DomainResult<Vec<String>> {
        Ok(self
            .groups
            .iter()
            .filter(|(_, members)| members.contains(user_id))
            .map(|(group, _)| group.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticIdentityDirectory {
        StaticIdentityDirectory::new()
            .user("kermit", "Kermit the Frog")
            .user("gonzo", "The Great Gonzo")
            .group("management", &["kermit", "piggy"])
            .admin("root")
            .grant_withdraw("approve", "fozzie")
    }

    #[tokio::test]
    async fn test_recipients_are_deduplicated() {
        let dir = directory();
        let recipients = dir
            .resolve_recipients(&["kermit".into(), "gonzo".into()], &["management".into(), "ghosts".into()])
            .await
            .unwrap();
        assert_eq!(
            recipients.into_iter().collect::<Vec<_>>(),
            vec!["gonzo".to_string(), "kermit".to_string(), "piggy".to_string()]
        );
    }

    #[tokio::test]
    async fn test_withdraw_authorization() {
        let dir = directory();
        let request = |caller, previous| WithdrawRequest {
            task_id: "t1",
            node_key: Some("approve"),
            caller,
            previous_performer: previous,
        };
        assert!(dir.is_authorized_withdrawer(&request("root", None)).await.unwrap());
        assert!(dir.is_authorized_withdrawer(&request("kermit", Some("kermit"))).await.unwrap());
        assert!(dir.is_authorized_withdrawer(&request("fozzie", None)).await.unwrap());
        assert!(!dir.is_authorized_withdrawer(&request("gonzo", Some("kermit"))).await.unwrap());

        let strict = directory().allow_previous_performer(false);
        assert!(!strict.is_authorized_withdrawer(&request("kermit", Some("kermit"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_from_yaml() {
        let dir = StaticIdentityDirectory::from_yaml(
            "users: { kermit: Kermit }\ngroups: { hr: [kermit] }\nadmins: [root]\n",
        )
        .unwrap();
        assert_eq!(dir.display_name("kermit").await.unwrap().as_deref(), Some("Kermit"));
        assert_eq!(dir.groups_of("kermit").await.unwrap(), vec!["hr".to_string()]);
        assert!(dir.display_name("nobody").await.unwrap().is_none());
    }
}
