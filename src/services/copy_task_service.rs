//! Copy tasks: non-blocking read acknowledgements spawned at broadcast nodes.

use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BroadcastPoint, CopyTask, CopyTaskQuery, CopyTaskRead, Page, PageRequest, ReadUserNames, ScopeRef,
};
use crate::services::condition::resolve_identities;
use crate::services::context::EngineContext;
use crate::services::scope_resolver::ScopeChain;
use crate::services::token_driver::Broadcast;

pub struct CopyTaskService {
    ctx: EngineContext,
}

impl CopyTaskService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Create the copy tasks of every broadcast reached by a transition.
    ///
    /// Failures are logged; the transition that reached the broadcast has
    /// already committed and is never affected.
    pub async fn spawn_for(&self, broadcasts: &[Broadcast]) -> usize {
        let mut created = 0;
        for broadcast in broadcasts {
            match self.spawn(broadcast).await {
                Ok(count) => created += count,
                Err(e) => tracing::error!(
                    activity_instance_id = %broadcast.point.activity_instance_id,
                    node_key = %broadcast.point.node_key,
                    error = %e,
                    "failed to create copy tasks"
                ),
            }
        }
        created
    }

    /// Create copy tasks for the broadcast node an execution currently sits at.
    ///
    /// Returns the number of copy tasks written; zero when the node carries no
    /// recipients.
    pub async fn create_copy_tasks(&self, execution_id: &str) -> DomainResult<usize> {
        let execution = self
            .ctx
            .executions
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DomainError::ExecutionNotFound(execution_id.to_string()))?;
        let instance = self
            .ctx
            .executions
            .get_instance(&execution.process_instance_id)
            .await?
            .ok_or_else(|| DomainError::ProcessInstanceNotFound(execution.process_instance_id.clone()))?;
        let (Some(node_key), Some(record_id)) = (execution.node_key.clone(), execution.activity_record_id.clone())
        else {
            return Ok(0);
        };

        let definition = self.ctx.graph.definition(&instance.definition_id)?;
        let node = definition.require_node(&node_key)?;
        let Some(spec) = node.copy_to.as_ref().filter(|spec| !spec.is_empty()) else {
            tracing::debug!(execution_id, node_key = %node_key, "node has no copy recipients");
            return Ok(0);
        };

        let mut scopes = Vec::new();
        let mut current = Some(execution.id.clone());
        while let Some(id) = current {
            current = self.ctx.executions.get_execution(&id).await?.and_then(|e| e.parent_id);
            scopes.push(ScopeRef::Execution(id));
        }
        let vars = ScopeChain::load(self.ctx.variables.as_ref(), scopes).await?.all();

        let broadcast = Broadcast {
            point: BroadcastPoint {
                activity_instance_id: record_id,
                node_key: node.key.clone(),
                node_name: node.name.clone(),
                process_definition_key: definition.key.clone(),
                process_instance_id: instance.id.clone(),
                business_key: instance.business_key.clone(),
            },
            users: resolve_identities(&spec.users, &vars),
            groups: resolve_identities(&spec.groups, &vars),
        };
        self.spawn(&broadcast).await
    }

    async fn spawn(&self, broadcast: &Broadcast) -> DomainResult<usize> {
        let recipients = self
            .ctx
            .identity
            .resolve_recipients(&broadcast.users, &broadcast.groups)
            .await?;
        if recipients.is_empty() {
            tracing::warn!(
                node_key = %broadcast.point.node_key,
                "broadcast resolved to no recipients"
            );
            return Ok(0);
        }

        let copies: Vec<CopyTask> = recipients
            .iter()
            .map(|recipient| CopyTask::for_recipient(&broadcast.point, recipient.as_str()))
            .collect();

        match self.ctx.copy_tasks.insert_batch(&copies).await {
            Ok(inserted) => {
                let created = usize::try_from(inserted).unwrap_or(copies.len());
                tracing::info!(
                    activity_instance_id = %broadcast.point.activity_instance_id,
                    node_key = %broadcast.point.node_key,
                    recipients = copies.len(),
                    created,
                    "copy tasks created"
                );
                Ok(created)
            }
            Err(e) => {
                tracing::warn!(
                    activity_instance_id = %broadcast.point.activity_instance_id,
                    error = %e,
                    "batch insert of copy tasks failed, retrying per recipient"
                );
                let mut created = 0;
                for copy in &copies {
                    match self.insert_with_backoff(copy).await {
                        Ok(true) => created += 1,
                        Ok(false) => {}
                        Err(e) => tracing::error!(
                            recipient = %copy.recipient,
                            activity_instance_id = %copy.activity_instance_id,
                            error = %e,
                            "giving up on copy task"
                        ),
                    }
                }
                Ok(created)
            }
        }
    }

    async fn insert_with_backoff(&self, copy: &CopyTask) -> DomainResult<bool> {
        let settings = &self.ctx.config.copy_tasks;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(settings.retry_initial_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(settings.retry_max_elapsed_ms)))
            .build();

        backoff::future::retry(policy, || async move {
            self.ctx.copy_tasks.insert(copy).await.map_err(|e| {
                if e.is_system_fault() {
                    tracing::debug!(recipient = %copy.recipient, error = %e, "copy task insert failed");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    /// Mark a copy task read by `reader`. Completing a read copy task is a no-op.
    pub async fn complete_copy_task(&self, copy_task_id: &str, reader: &str) -> DomainResult<()> {
        let copy = self
            .ctx
            .copy_tasks
            .get(copy_task_id)
            .await?
            .ok_or_else(|| DomainError::CopyTaskNotFound(copy_task_id.to_string()))?;
        if copy.is_read {
            tracing::debug!(copy_task_id, "copy task already read");
            return Ok(());
        }

        let reader_name = self
            .ctx
            .identity
            .display_name(reader)
            .await?
            .unwrap_or_else(|| reader.to_string());
        let read = CopyTaskRead::of(&copy, reader, reader_name, Utc::now());
        if self.ctx.copy_tasks.mark_read(&read).await? {
            tracing::info!(copy_task_id, reader, "copy task read");
        }
        Ok(())
    }

    /// Unread copy tasks of one recipient.
    pub async fn get_user_copy_tasks(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>> {
        if query.user.is_none() {
            return Err(DomainError::ValidationFailed("a user copy-task query needs a user".into()));
        }
        self.ctx.copy_tasks.list_unread(query, page).await
    }

    /// Unread copy tasks of every recipient.
    pub async fn get_admin_copy_tasks(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>> {
        let all = CopyTaskQuery {
            user: None,
            ..query.clone()
        };
        self.ctx.copy_tasks.list_unread(&all, page).await
    }

    /// Read history of one reader.
    pub async fn get_user_reader_copy_tasks(
        &self,
        query: &CopyTaskQuery,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        if query.user.is_none() {
            return Err(DomainError::ValidationFailed("a reader query needs a user".into()));
        }
        self.ctx.copy_tasks.list_reads(query, page).await
    }

    /// Read history of every reader.
    pub async fn get_admin_user_reader_copy_tasks(
        &self,
        query: &CopyTaskQuery,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        let all = CopyTaskQuery {
            user: None,
            ..query.clone()
        };
        self.ctx.copy_tasks.list_reads(&all, page).await
    }

    pub async fn get_copy_task_read_users(
        &self,
        activity_instance_id: &str,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        self.ctx.copy_tasks.reads_for_activity(activity_instance_id, page).await
    }

    /// Reader display names of one activity instance, at most `limit` of them.
    ///
    /// `None` uses the configured default limit.
    pub async fn get_copy_task_read_user_names(
        &self,
        activity_instance_id: &str,
        limit: Option<usize>,
    ) -> DomainResult<ReadUserNames> {
        let limit = limit.unwrap_or(self.ctx.config.copy_tasks.read_names_limit);
        let size = u32::try_from(limit).unwrap_or(u32::MAX);
        let page = self
            .ctx
            .copy_tasks
            .reads_for_activity(activity_instance_id, PageRequest::first(size))
            .await?;
        Ok(ReadUserNames {
            names: page.items.into_iter().map(|read| read.reader_name).collect(),
            total: page.total,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{broadcast_definition, engine};

    fn query(user: &str) -> CopyTaskQuery {
        CopyTaskQuery::for_user(user)
    }

    #[tokio::test]
    async fn test_group_recipients_are_deduplicated() {
        let engine = engine(vec![broadcast_definition()]).await;
        let service = CopyTaskService::new(engine.ctx.clone());
        let broadcast = Broadcast {
            point: BroadcastPoint {
                activity_instance_id: "act-1".into(),
                node_key: "notify".into(),
                node_name: "Notify".into(),
                process_definition_key: "broadcast".into(),
                process_instance_id: "pi-1".into(),
                business_key: None,
            },
            users: vec!["kermit".into()],
            groups: vec!["reviewers".into()],
        };

        let broadcasts = [broadcast];
        assert_eq!(service.spawn_for(&broadcasts).await, 2);
        let copies = engine.ctx.copy_tasks.list_for_activity("act-1").await.unwrap();
        assert_eq!(copies.len(), 2);

        assert_eq!(service.spawn_for(&broadcasts).await, 0, "recipients already hold a copy");
        assert_eq!(engine.ctx.copy_tasks.list_for_activity("act-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent_and_unknown_is_not_found() {
        let engine = engine(vec![broadcast_definition()]).await;
        let service = CopyTaskService::new(engine.ctx.clone());
        let point = BroadcastPoint {
            activity_instance_id: "act-2".into(),
            node_key: "notify".into(),
            node_name: "Notify".into(),
            process_definition_key: "broadcast".into(),
            process_instance_id: "pi-2".into(),
            business_key: Some("order-7".into()),
        };
        let copy = CopyTask::for_recipient(&point, "gonzo");
        engine.ctx.copy_tasks.insert(&copy).await.unwrap();

        service.complete_copy_task(&copy.id, "gonzo").await.unwrap();
        service.complete_copy_task(&copy.id, "gonzo").await.unwrap();

        let names = service.get_copy_task_read_user_names("act-2", None).await.unwrap();
        assert_eq!(names.names, vec!["Gonzo".to_string()]);
        assert_eq!(names.total, 1);

        let err = service.complete_copy_task("missing", "gonzo").await.unwrap_err();
        assert!(matches!(err, DomainError::CopyTaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_user_queries_require_a_user() {
        let engine = engine(vec![broadcast_definition()]).await;
        let service = CopyTaskService::new(engine.ctx.clone());
        let anonymous = CopyTaskQuery::default();
        assert!(service
            .get_user_copy_tasks(&anonymous, PageRequest::first(10))
            .await
            .is_err());
        let page = service
            .get_admin_copy_tasks(&query("kermit"), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
