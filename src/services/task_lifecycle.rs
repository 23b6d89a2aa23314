//! Task lifecycle state machine.
//!
//! Every mutation is a compare-and-set on the task version. Conflicts are
//! retried from a fresh read, so racing claims settle into one winner and
//! one `AlreadyClaimed`.

use chrono::{DateTime, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AuditEntry, CompleteOptions, ScopeRef, Task, TaskAction, TaskOutcome, TransitionNote, VariableMap,
};
use crate::domain::ports::{ChangeSet, TaskClosure, TaskDeletion};
use crate::services::context::EngineContext;
use crate::services::copy_task_service::CopyTaskService;
use crate::services::rejection_router::original_performer;
use crate::services::retry::retry_on_conflict;
use crate::services::scope_resolver::ScopeChain;
use crate::services::token_driver::{Transition, TransitionOutcome};

pub struct TaskLifecycle {
    ctx: EngineContext,
}

impl TaskLifecycle {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn retries(&self) -> u32 {
        self.ctx.config.engine.max_transition_retries
    }

    async fn require(&self, task_id: &str) -> DomainResult<Task> {
        self.ctx
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    /// Read the task, apply `mutate` and write it back under its version.
    ///
    /// `mutate` returns the audit action to record, or `None` for a no-op.
    async fn update<F>(&self, task_id: &str, actor: Option<&str>, mutate: F) -> DomainResult<Task>
    where
        F: Fn(&mut Task) -> DomainResult<Option<TaskAction>>,
    {
        let mutate = &mutate;
        retry_on_conflict(self.retries(), || async move {
            let mut task = self.require(task_id).await?;
            let Some(action) = mutate(&mut task)? else {
                return Ok(task);
            };
            task.validate()?;

            let mut changes = ChangeSet::new();
            changes.updated_tasks.push(task.clone());
            changes
                .audit
                .push(AuditEntry::new(&task.id, task.process_instance_id.as_deref(), action).by(actor));
            self.ctx.store.commit(changes).await?;

            task.version += 1;
            Ok(task)
        })
        .await
    }

    /// Claim for `user_id`, or unclaim with `None`.
    pub async fn claim(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        let task = self
            .update(task_id, user_id, |task| {
                Ok(task.claim(user_id)?.then_some(if user_id.is_some() {
                    TaskAction::Claimed
                } else {
                    TaskAction::Unclaimed
                }))
            })
            .await?;
        tracing::info!(task_id, assignee = ?task.assignee, "task claim updated");
        Ok(task)
    }

    pub async fn delegate(&self, task_id: &str, user_id: &str) -> DomainResult<Task> {
        let task = self
            .update(task_id, None, |task| {
                task.delegate(user_id);
                Ok(Some(TaskAction::Delegated))
            })
            .await?;
        tracing::info!(task_id, delegate = user_id, owner = ?task.owner, "task delegated");
        Ok(task)
    }

    pub async fn resolve(&self, task_id: &str) -> DomainResult<Task> {
        let task = self
            .update(task_id, None, |task| {
                task.resolve()?;
                Ok(Some(TaskAction::Resolved))
            })
            .await?;
        tracing::info!(task_id, assignee = ?task.assignee, "task resolved");
        Ok(task)
    }

    pub async fn set_assignee(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        self.update(task_id, None, |task| {
            task.assignee = user_id.map(ToString::to_string);
            Ok(Some(TaskAction::Updated))
        })
        .await
    }

    pub async fn set_owner(&self, task_id: &str, user_id: Option<&str>) -> DomainResult<Task> {
        self.update(task_id, None, |task| {
            task.owner = user_id.map(ToString::to_string);
            Ok(Some(TaskAction::Updated))
        })
        .await
    }

    pub async fn set_priority(&self, task_id: &str, priority: i32) -> DomainResult<Task> {
        self.update(task_id, None, |task| {
            task.priority = priority;
            Ok(Some(TaskAction::Updated))
        })
        .await
    }

    pub async fn set_due_date(&self, task_id: &str, due_date: Option<DateTime<Utc>>) -> DomainResult<Task> {
        self.update(task_id, None, |task| {
            task.due_date = due_date;
            Ok(Some(TaskAction::Updated))
        })
        .await
    }

    /// A transient task; nothing is written until [`Self::save_task`].
    pub fn new_task(&self, id: Option<String>) -> Task {
        let mut task = Task::new(id);
        task.priority = self.ctx.config.engine.default_priority;
        task
    }

    /// Insert a new task or update an existing one under its version.
    pub async fn save_task(&self, task: &Task) -> DomainResult<Task> {
        task.validate()?;
        let mut changes = ChangeSet::new();
        let mut saved = task.clone();
        match self.ctx.tasks.get(&task.id).await? {
            Some(_) => {
                changes.updated_tasks.push(task.clone());
                changes
                    .audit
                    .push(AuditEntry::new(&task.id, task.process_instance_id.as_deref(), TaskAction::Updated));
                saved.version += 1;
            }
            None => {
                changes.new_tasks.push(task.clone());
                changes
                    .audit
                    .push(AuditEntry::new(&task.id, task.process_instance_id.as_deref(), TaskAction::Created));
            }
        }
        self.ctx.store.commit(changes).await?;
        tracing::debug!(task_id = %task.id, "task saved");
        Ok(saved)
    }

    /// Complete a task and move its process instance forward.
    pub async fn complete(&self, task_id: &str, options: &CompleteOptions) -> DomainResult<TransitionOutcome> {
        let task = self.require(task_id).await?;
        task.ensure_completable()?;

        let outcome = match &task.process_instance_id {
            Some(pi) if task.execution_id.is_some() => {
                retry_on_conflict(self.retries(), move || self.complete_in_process(pi, task_id, options)).await?
            }
            _ => {
                retry_on_conflict(self.retries(), move || self.complete_standalone(task_id, options)).await?
            }
        };

        tracing::info!(
            task_id,
            new_tasks = outcome.new_task_ids.len(),
            ended = outcome.ended,
            "task completed"
        );
        after_commit(&self.ctx, &outcome).await;
        Ok(outcome)
    }

    async fn complete_standalone(&self, task_id: &str, options: &CompleteOptions) -> DomainResult<TransitionOutcome> {
        let task = self.require(task_id).await?;
        task.ensure_completable()?;

        let mut chain = ScopeChain::load(self.ctx.variables.as_ref(), vec![ScopeRef::Task(task.id.clone())]).await?;
        chain.write_all_default(&options.variables);

        let outcome = options.op.map_or(TaskOutcome::Completed, |op| op.outcome());
        let mut changes = ChangeSet::new();
        changes.variables = chain.take_writes();
        changes.closed_tasks.push(TaskClosure {
            task_id: task.id.clone(),
            expected_version: task.version,
            outcome,
            reason: options.note.reason.clone(),
            ended_at: Utc::now(),
        });
        changes.audit.push(completion_entry(&task, options));
        self.ctx.store.commit(changes).await?;

        Ok(TransitionOutcome {
            process_instance_id: String::new(),
            ..TransitionOutcome::default()
        })
    }

    async fn complete_in_process(
        &self,
        process_instance_id: &str,
        task_id: &str,
        options: &CompleteOptions,
    ) -> DomainResult<TransitionOutcome> {
        let mut transition = Transition::load(&self.ctx, process_instance_id).await?;
        let task = transition
            .task(task_id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        task.ensure_completable()?;
        let execution_id = task
            .execution_id
            .clone()
            .ok_or_else(|| DomainError::invalid_state(task_id, "task is not bound to an execution"))?;

        let mut scopes = vec![ScopeRef::Task(task.id.clone())];
        scopes.extend(transition.scope_refs(&execution_id));
        let mut chain = ScopeChain::load(self.ctx.variables.as_ref(), scopes).await?;
        chain.write_all_default(&options.variables);

        let mut locals: VariableMap = chain.local();
        locals.extend(options.variables.clone());
        transition.set_completing_locals(locals);
        transition.write_variables(chain.take_writes());
        transition.audit(completion_entry(&task, options));

        let reason = options.note.reason.as_deref();
        if let Some(destination) = &options.destination_key {
            let outcome = options.op.map_or(TaskOutcome::Completed, |op| op.outcome());
            transition.jump(task_id, destination, outcome, reason, None, None)?;
        } else if let Some(return_to) = task.return_to.clone() {
            let outcome = options.op.map_or(TaskOutcome::ReturnedToRejected, |op| op.outcome());
            let assignee = original_performer(&self.ctx, process_instance_id, &return_to).await?;
            tracing::debug!(task_id, return_to = %return_to, "returning to the rejecting node");
            transition.jump(task_id, &return_to, outcome, reason, assignee, None)?;
        } else {
            let outcome = options.op.map_or(TaskOutcome::Completed, |op| op.outcome());
            transition.complete_forward(task_id, outcome, reason).await?;
        }

        transition.run().await?;
        transition.commit().await
    }

    /// Delete tasks that are not bound to a live execution.
    ///
    /// Missing ids are skipped. `cascade` also purges history, comments,
    /// attachments and task events.
    pub async fn delete(&self, task_ids: &[String], cascade: bool, reason: Option<&str>) -> DomainResult<usize> {
        let mut changes = ChangeSet::new();
        for task_id in task_ids {
            let Some(task) = self.ctx.tasks.get(task_id).await? else {
                if cascade && self.ctx.tasks.get_historic(task_id).await?.is_some() {
                    changes.deleted_tasks.push(TaskDeletion {
                        task_id: task_id.clone(),
                        cascade,
                        reason: reason.map(ToString::to_string),
                    });
                } else {
                    tracing::debug!(task_id = %task_id, "skipping delete of unknown task");
                }
                continue;
            };
            if let Some(execution_id) = &task.execution_id {
                if self.ctx.executions.get_execution(execution_id).await?.is_some() {
                    return Err(DomainError::invalid_state(
                        task_id,
                        "task belongs to a running execution and cannot be deleted",
                    ));
                }
            }
            changes.deleted_tasks.push(TaskDeletion {
                task_id: task_id.clone(),
                cascade,
                reason: reason.map(ToString::to_string),
            });
            if !cascade {
                changes.audit.push(
                    AuditEntry::new(task_id, task.process_instance_id.as_deref(), TaskAction::Deleted).with_reason(
                        reason,
                        None,
                        None,
                    ),
                );
            }
        }

        let count = changes.deleted_tasks.len();
        if count > 0 {
            self.ctx.store.commit(changes).await?;
            tracing::info!(count, cascade, "tasks deleted");
        }
        Ok(count)
    }
}

fn completion_entry(task: &Task, options: &CompleteOptions) -> AuditEntry {
    let TransitionNote {
        reason,
        business_op,
        business_remark,
    } = &options.note;
    AuditEntry::new(&task.id, task.process_instance_id.as_deref(), TaskAction::Completed)
        .by(options.actor.as_deref())
        .with_reason(reason.as_deref(), business_op.as_deref(), business_remark.as_deref())
}

/// Work that follows a committed transition and must not fail it.
pub(crate) async fn after_commit(ctx: &EngineContext, outcome: &TransitionOutcome) {
    if outcome.broadcasts.is_empty() {
        return;
    }
    CopyTaskService::new(ctx.clone()).spawn_for(&outcome.broadcasts).await;
}
