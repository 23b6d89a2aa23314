//! Task service facade.
//!
//! The API surface exposed to embedding applications. Lifecycle transitions,
//! backward routing and copy tasks are delegated to their services; variables,
//! identity links, comments and attachments are handled here.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Attachment, AttachmentSource, AuditEntry, Comment, CompleteOptions, CopyTask, CopyTaskQuery, CopyTaskRead,
    FlowNode, HistoricTask, Identity, IdentityLink, IdentityLinkType, Page, PageRequest, ReadUserNames, RejectOptions,
    RejectionTarget, RoutingOutcome, ScopeRef, Task, TaskFilter, VariableMap, VariableValue, WithdrawOptions,
};
use crate::domain::ports::ChangeSet;
use crate::services::context::EngineContext;
use crate::services::copy_task_service::CopyTaskService;
use crate::services::rejection_router::RejectionRouter;
use crate::services::scope_resolver::{select, ScopeChain};
use crate::services::task_lifecycle::TaskLifecycle;
use crate::services::token_driver::TransitionOutcome;

pub struct TaskService {
    ctx: EngineContext,
    lifecycle: TaskLifecycle,
    router: RejectionRouter,
    copies: CopyTaskService,
}

impl TaskService {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            lifecycle: TaskLifecycle::new(ctx.clone()),
            router: RejectionRouter::new(ctx.clone()),
            copies: CopyTaskService::new(ctx.clone()),
            ctx,
        }
    }

    async fn require(&self, task_id: &str) -> DomainResult<Task> {
        self.ctx
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    // Lifecycle

    pub fn new_task(&self, id: Option<String>) -> Task {
        self.lifecycle.new_task(id)
    }

    pub async fn save_task(&self, task: &Task) -> DomainResult<Task> {
        self.lifecycle.save_task(task).await
    }

    pub async fn get_task(&self, task_id: &str) -> DomainResult<Option<Task>> {
        self.ctx.tasks.get(task_id).await
    }

    /// History of a task, live or finished. Gone after a cascade delete.
    pub async fn get_historic_task(&self, task_id: &str) -> DomainResult<Option<HistoricTask>> {
        self.ctx.tasks.get_historic(task_id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>> {
        self.ctx.tasks.list(filter).await
    }

    /// Tasks assigned to `user_id` or offered to them directly or through their groups.
    pub async fn list_tasks_for_user(&self, user_id: &str) -> DomainResult<Vec<Task>> {
        let assigned = self
            .ctx
            .tasks
            .list(&TaskFilter {
                assignee: Some(user_id.to_string()),
                ..TaskFilter::default()
            })
            .await?;
        let offered = self
            .ctx
            .tasks
            .list(&TaskFilter {
                candidate_user: Some(user_id.to_string()),
                candidate_groups: self.ctx.identity.groups_of(user_id).await?,
                unassigned_only: true,
                ..TaskFilter::default()
            })
            .await?;

        let mut tasks = assigned;
        for task in offered {
            if !tasks.iter().any(|t| t.id == task.id) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    pub async fn get_sub_tasks(&self, parent_task_id: &str) -> DomainResult<Vec<Task>> {
        self.ctx.tasks.get_sub_tasks(parent_task_id).await
    }

    pub async fn claim(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        self.lifecycle.claim(task_id, user_id).await
    }

    pub async fn delegate_task(&self, task_id: &str, user_id: &str) -> DomainResult<Task> {
        self.lifecycle.delegate(task_id, user_id).await
    }

    pub async fn resolve_task(&self, task_id: &str) -> DomainResult<Task> {
        self.lifecycle.resolve(task_id).await
    }

    pub async fn complete(&self, task_id: &str, options: &CompleteOptions) -> DomainResult<TransitionOutcome> {
        self.lifecycle.complete(task_id, options).await
    }

    pub async fn delete_tasks(&self, task_ids: &[String], cascade: bool, reason: Option<&str>) -> DomainResult<usize> {
        self.lifecycle.delete(task_ids, cascade, reason).await
    }

    pub async fn set_assignee(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        self.lifecycle.set_assignee(task_id, user_id).await
    }

    pub async fn set_owner(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        self.lifecycle.set_owner(task_id, user_id).await
    }

    pub async fn set_priority(&self, task_id: &str, priority: i32) -> DomainResult<Task> {
        self.lifecycle.set_priority(task_id, priority).await
    }

    pub async fn set_due_date(
        &self,
        task_id: &str,
        due_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> DomainResult<Task> {
        self.lifecycle.set_due_date(task_id, due_date).await
    }

    // First node lookups

    pub async fn find_first_node_by_task(&self, task_id: &str) -> DomainResult<Option<FlowNode>> {
        let task = self.require(task_id).await?;
        match &task.process_definition_id {
            Some(definition_id) => self.ctx.graph.first_node(definition_id),
            None => Ok(None),
        }
    }

    pub fn find_first_node_by_definition_id(&self, definition_id: &str) -> DomainResult<Option<FlowNode>> {
        self.ctx.graph.first_node(definition_id)
    }

    pub fn find_first_node_by_definition_key(&self, key: &str) -> DomainResult<Option<FlowNode>> {
        let definition = self.ctx.graph.latest_definition(key)?;
        Ok(definition.first_user_task().cloned())
    }

    // Routing

    pub async fn find_rejected_node(&self, task_id: &str) -> DomainResult<RejectionTarget> {
        self.router.find_rejected_node(task_id).await
    }

    pub async fn reject_to_pre_task(&self, task_id: &str, options: &RejectOptions) -> DomainResult<RoutingOutcome> {
        self.router.reject_to_pre_task(task_id, options).await
    }

    pub async fn reject_to_task(&self, task_id: &str, options: &RejectOptions) -> DomainResult<RoutingOutcome> {
        self.router.reject_to_task(task_id, options).await
    }

    pub async fn withdraw_task(
        &self,
        task_id: &str,
        caller: &str,
        options: &WithdrawOptions,
    ) -> DomainResult<RoutingOutcome> {
        self.router.withdraw_task(task_id, caller, options).await
    }

    // Variables

    /// Scope chain of a task: the task scope, then its execution chain.
    async fn scope_chain(&self, task: &Task) -> DomainResult<ScopeChain> {
        let mut scopes = vec![ScopeRef::Task(task.id.clone())];
        let mut current = task.execution_id.clone();
        while let Some(id) = current {
            current = self
                .ctx
                .executions
                .get_execution(&id)
                .await?
                .and_then(|execution| execution.parent_id);
            scopes.push(ScopeRef::Execution(id));
        }
        ScopeChain::load(self.ctx.variables.as_ref(), scopes).await
    }

    async fn write_with<F>(&self, task_id: &str, apply: F) -> DomainResult<()>
    where
        F: FnOnce(&mut ScopeChain),
    {
        let task = self.require(task_id).await?;
        let mut chain = self.scope_chain(&task).await?;
        apply(&mut chain);
        let writes = chain.take_writes();
        if writes.is_empty() {
            return Ok(());
        }
        tracing::debug!(task_id, writes = writes.len(), "writing task variables");
        let mut changes = ChangeSet::new();
        changes.variables = writes;
        self.ctx.store.commit(changes).await
    }

    /// Write to the scope that already holds `name`, else the process instance.
    pub async fn set_variable(&self, task_id: &str, name: &str, value: VariableValue) -> DomainResult<()> {
        self.write_with(task_id, |chain| chain.write_default(name, value)).await
    }

    pub async fn set_variables(&self, task_id: &str, variables: &VariableMap) -> DomainResult<()> {
        self.write_with(task_id, |chain| chain.write_all_default(variables)).await
    }

    pub async fn set_variable_local(&self, task_id: &str, name: &str, value: VariableValue) -> DomainResult<()> {
        self.write_with(task_id, |chain| chain.write_local(name, value)).await
    }

    pub async fn set_variables_local(&self, task_id: &str, variables: &VariableMap) -> DomainResult<()> {
        self.write_with(task_id, |chain| {
            for (name, value) in variables {
                chain.write_local(name, value.clone());
            }
        })
        .await
    }

    pub async fn get_variable(&self, task_id: &str, name: &str) -> DomainResult<Option<VariableValue>> {
        let task = self.require(task_id).await?;
        Ok(self.scope_chain(&task).await?.get(name).cloned())
    }

    pub async fn get_variable_local(&self, task_id: &str, name: &str) -> DomainResult<Option<VariableValue>> {
        let task = self.require(task_id).await?;
        Ok(self.scope_chain(&task).await?.get_local(name).cloned())
    }

    pub async fn get_variables(&self, task_id: &str, names: Option<&[String]>) -> DomainResult<VariableMap> {
        let task = self.require(task_id).await?;
        Ok(select(self.scope_chain(&task).await?.all(), names))
    }

    pub async fn get_variables_local(&self, task_id: &str, names: Option<&[String]>) -> DomainResult<VariableMap> {
        let task = self.require(task_id).await?;
        Ok(select(self.scope_chain(&task).await?.local(), names))
    }

    pub async fn remove_variable(&self, task_id: &str, name: &str) -> DomainResult<()> {
        self.write_with(task_id, |chain| chain.remove(name)).await
    }

    pub async fn remove_variables(&self, task_id: &str, names: &[String]) -> DomainResult<()> {
        self.write_with(task_id, |chain| names.iter().for_each(|name| chain.remove(name)))
            .await
    }

    pub async fn remove_variable_local(&self, task_id: &str, name: &str) -> DomainResult<()> {
        self.write_with(task_id, |chain| chain.remove_local(name)).await
    }

    pub async fn remove_variables_local(&self, task_id: &str, names: &[String]) -> DomainResult<()> {
        self.write_with(task_id, |chain| names.iter().for_each(|name| chain.remove_local(name)))
            .await
    }

    // Identity links

    pub async fn get_identity_links_for_task(&self, task_id: &str) -> DomainResult<Vec<IdentityLink>> {
        self.ctx.identity_links.list_for_task(task_id).await
    }

    async fn add_link(&self, task_id: &str, identity: Identity, link_type: IdentityLinkType) -> DomainResult<()> {
        let task = self.require(task_id).await?;
        let link = IdentityLink::for_task(&task.id, identity, link_type);
        self.ctx.identity_links.add(&link).await?;
        tracing::debug!(task_id, link_type = link.link_type.as_str(), "identity link added");
        Ok(())
    }

    pub async fn add_candidate_user(&self, task_id: &str, user_id: &str) -> DomainResult<()> {
        self.add_link(task_id, Identity::User(user_id.to_string()), IdentityLinkType::Candidate)
            .await
    }

    pub async fn add_candidate_group(&self, task_id: &str, group_id: &str) -> DomainResult<()> {
        self.add_link(task_id, Identity::Group(group_id.to_string()), IdentityLinkType::Candidate)
            .await
    }

    pub async fn add_user_identity_link(
        &self,
        task_id: &str,
        user_id: &str,
        link_type: IdentityLinkType,
    ) -> DomainResult<()> {
        self.add_link(task_id, Identity::User(user_id.to_string()), link_type).await
    }

    pub async fn add_group_identity_link(
        &self,
        task_id: &str,
        group_id: &str,
        link_type: IdentityLinkType,
    ) -> DomainResult<()> {
        self.add_link(task_id, Identity::Group(group_id.to_string()), link_type).await
    }

    pub async fn delete_candidate_user(&self, task_id: &str, user_id: &str) -> DomainResult<u64> {
        self.ctx
            .identity_links
            .delete_for_task(task_id, &Identity::User(user_id.to_string()), &IdentityLinkType::Candidate)
            .await
    }

    pub async fn delete_candidate_group(&self, task_id: &str, group_id: &str) -> DomainResult<u64> {
        self.ctx
            .identity_links
            .delete_for_task(task_id, &Identity::Group(group_id.to_string()), &IdentityLinkType::Candidate)
            .await
    }

    pub async fn delete_user_identity_link(
        &self,
        task_id: &str,
        user_id: &str,
        link_type: &IdentityLinkType,
    ) -> DomainResult<u64> {
        self.ctx
            .identity_links
            .delete_for_task(task_id, &Identity::User(user_id.to_string()), link_type)
            .await
    }

    pub async fn delete_group_identity_link(
        &self,
        task_id: &str,
        group_id: &str,
        link_type: &IdentityLinkType,
    ) -> DomainResult<u64> {
        self.ctx
            .identity_links
            .delete_for_task(task_id, &Identity::Group(group_id.to_string()), link_type)
            .await
    }

    // Comments, events and attachments

    pub async fn add_comment(
        &self,
        task_id: Option<&str>,
        process_instance_id: Option<&str>,
        user_id: Option<&str>,
        message: &str,
    ) -> DomainResult<Comment> {
        if task_id.is_none() && process_instance_id.is_none() {
            return Err(DomainError::ValidationFailed(
                "a comment needs a task or a process instance".into(),
            ));
        }
        let mut comment = Comment::new(task_id, process_instance_id, message);
        comment.user_id = user_id.map(ToString::to_string);
        self.ctx.comments.add_comment(&comment).await?;
        Ok(comment)
    }

    pub async fn get_task_comments(&self, task_id: &str) -> DomainResult<Vec<Comment>> {
        self.ctx.comments.task_comments(task_id).await
    }

    pub async fn get_process_instance_comments(&self, process_instance_id: &str) -> DomainResult<Vec<Comment>> {
        self.ctx.comments.process_instance_comments(process_instance_id).await
    }

    pub async fn get_task_events(&self, task_id: &str) -> DomainResult<Vec<AuditEntry>> {
        self.ctx.audit.task_events(task_id).await
    }

    pub async fn create_attachment(
        &self,
        attachment_type: &str,
        task_id: Option<&str>,
        process_instance_id: Option<&str>,
        name: &str,
        description: Option<&str>,
        source: AttachmentSource,
    ) -> DomainResult<Attachment> {
        let mut attachment = Attachment::new(attachment_type, task_id, process_instance_id, name);
        attachment.description = description.map(ToString::to_string);
        let content = match source {
            AttachmentSource::Url(url) => {
                attachment.url = Some(url);
                None
            }
            AttachmentSource::Content(bytes) => Some(bytes),
        };
        self.ctx
            .comments
            .insert_attachment(&attachment, content.as_deref())
            .await?;
        Ok(attachment)
    }

    /// Update the name and description of an existing attachment.
    pub async fn save_attachment(&self, attachment: &Attachment) -> DomainResult<()> {
        if self.ctx.comments.update_attachment(attachment).await? {
            Ok(())
        } else {
            Err(DomainError::AttachmentNotFound(attachment.id.clone()))
        }
    }

    pub async fn get_attachment(&self, attachment_id: &str) -> DomainResult<Attachment> {
        self.ctx
            .comments
            .get_attachment(attachment_id)
            .await?
            .ok_or_else(|| DomainError::AttachmentNotFound(attachment_id.to_string()))
    }

    /// Stored bytes of an attachment; `None` for url attachments.
    pub async fn get_attachment_content(&self, attachment_id: &str) -> DomainResult<Option<Vec<u8>>> {
        self.get_attachment(attachment_id).await?;
        self.ctx.comments.get_attachment_content(attachment_id).await
    }

    pub async fn get_task_attachments(&self, task_id: &str) -> DomainResult<Vec<Attachment>> {
        self.ctx.comments.task_attachments(task_id).await
    }

    pub async fn get_process_instance_attachments(&self, process_instance_id: &str) -> DomainResult<Vec<Attachment>> {
        self.ctx.comments.process_instance_attachments(process_instance_id).await
    }

    pub async fn delete_attachment(&self, attachment_id: &str) -> DomainResult<()> {
        if self.ctx.comments.delete_attachment(attachment_id).await? {
            Ok(())
        } else {
            Err(DomainError::AttachmentNotFound(attachment_id.to_string()))
        }
    }

    // Copy tasks

    pub async fn create_copy_tasks(&self, execution_id: &str) -> DomainResult<usize> {
        self.copies.create_copy_tasks(execution_id).await
    }

    pub async fn complete_copy_task(&self, copy_task_id: &str, reader: &str) -> DomainResult<()> {
        self.copies.complete_copy_task(copy_task_id, reader).await
    }

    pub async fn get_user_copy_tasks(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>> {
        self.copies.get_user_copy_tasks(query, page).await
    }

    pub async fn get_admin_copy_tasks(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>> {
        self.copies.get_admin_copy_tasks(query, page).await
    }

    pub async fn get_user_reader_copy_tasks(
        &self,
        query: &CopyTaskQuery,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        self.copies.get_user_reader_copy_tasks(query, page).await
    }

    pub async fn get_admin_user_reader_copy_tasks(
        &self,
        query: &CopyTaskQuery,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        self.copies.get_admin_user_reader_copy_tasks(query, page).await
    }

    pub async fn get_copy_task_read_users(
        &self,
        activity_instance_id: &str,
        page: PageRequest,
    ) -> DomainResult<Page<CopyTaskRead>> {
        self.copies.get_copy_task_read_users(activity_instance_id, page).await
    }

    pub async fn get_copy_task_read_user_names(
        &self,
        activity_instance_id: &str,
        limit: Option<usize>,
    ) -> DomainResult<ReadUserNames> {
        self.copies.get_copy_task_read_user_names(activity_instance_id, limit).await
    }
}
