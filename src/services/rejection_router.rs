//! Backward routing: reject and withdraw.
//!
//! Targets are computed from the activity records of the instance, the path
//! that was actually executed, rather than from the static graph. A refused
//! move is reported through [`RoutingOutcome::Refused`], never as an error.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AuditEntry, NodeKind, RejectOptions, RejectType, RejectionTarget, RoutingFailure, RoutingOutcome, ScopeRef,
    Task, TaskAction, TaskOutcome, TransitionNote, VariableMap, WithdrawOptions,
};
use crate::domain::ports::WithdrawRequest;
use crate::services::context::EngineContext;
use crate::services::retry::retry_on_conflict;
use crate::services::scope_resolver::ScopeChain;
use crate::services::task_lifecycle::after_commit;
use crate::services::token_driver::{Transition, TransitionOutcome};

/// Assignee of the most recent task at `node_key` in the instance.
pub(crate) async fn original_performer(
    ctx: &EngineContext,
    process_instance_id: &str,
    node_key: &str,
) -> DomainResult<Option<String>> {
    let history = ctx.tasks.historic_at_node(process_instance_id, node_key).await?;
    Ok(history.into_iter().find_map(|task| task.assignee))
}

#[derive(Debug, Clone)]
enum Destination {
    PriorTask,
    PriorPath,
    Node(String),
}

/// One backward move, as requested by reject or withdraw.
struct BackwardMove<'a> {
    destination: Destination,
    outcome: TaskOutcome,
    action: TaskAction,
    variables: &'a VariableMap,
    note: &'a TransitionNote,
    actor: Option<&'a str>,
    return_to_reject: bool,
}

pub struct RejectionRouter {
    ctx: EngineContext,
}

impl RejectionRouter {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    async fn require(&self, task_id: &str) -> DomainResult<Task> {
        self.ctx
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    /// The two backward candidates of a task.
    ///
    /// The path node is absent when the activity was entered from several
    /// concurrent branches, or when walking back from it would cross a join.
    pub async fn find_rejected_node(&self, task_id: &str) -> DomainResult<RejectionTarget> {
        let task = self.require(task_id).await?;
        let (Some(process_instance_id), Some(record_id)) = (&task.process_instance_id, &task.activity_instance_id)
        else {
            return Ok(RejectionTarget::default());
        };
        let transition = Transition::load(&self.ctx, process_instance_id).await?;
        let Some(record) = transition.record(record_id) else {
            return Ok(RejectionTarget::default());
        };
        let prior_path_node = match record.from_records.as_slice() {
            [from] if self.walk_back(&transition, from).is_ok() => record.from_node_key.clone(),
            _ => None,
        };
        Ok(RejectionTarget {
            prior_task_node: record.previous_task_node.clone(),
            prior_path_node,
        })
    }

    /// Reject back to the prior task node (`PriorTask`) or the prior path node (`PriorPath`).
    pub async fn reject_to_pre_task(&self, task_id: &str, options: &RejectOptions) -> DomainResult<RoutingOutcome> {
        let destination = match options.reject_type {
            RejectType::PriorTask => Destination::PriorTask,
            RejectType::PriorPath => Destination::PriorPath,
        };
        self.route(
            task_id,
            &BackwardMove {
                destination,
                outcome: TaskOutcome::Rejected,
                action: TaskAction::Rejected,
                variables: &options.variables,
                note: &options.note,
                actor: options.actor.as_deref(),
                return_to_reject: false,
            },
        )
        .await
    }

    /// Reject to an explicit user-task node, optionally leaving a return address.
    pub async fn reject_to_task(&self, task_id: &str, options: &RejectOptions) -> DomainResult<RoutingOutcome> {
        let Some(destination) = options.destination_key.clone() else {
            return Ok(RoutingOutcome::Refused(RoutingFailure::UnknownDestination(String::new())));
        };
        self.route(
            task_id,
            &BackwardMove {
                destination: Destination::Node(destination),
                outcome: TaskOutcome::Rejected,
                action: TaskAction::Rejected,
                variables: &options.variables,
                note: &options.note,
                actor: options.actor.as_deref(),
                return_to_reject: options.return_to_reject,
            },
        )
        .await
    }

    /// Pull a forwarded task back. Without a destination the token returns
    /// to the node of the task that forwarded it.
    pub async fn withdraw_task(
        &self,
        task_id: &str,
        caller: &str,
        options: &WithdrawOptions,
    ) -> DomainResult<RoutingOutcome> {
        let task = self.require(task_id).await?;
        if task.process_instance_id.is_none() || task.execution_id.is_none() {
            return Ok(RoutingOutcome::Refused(RoutingFailure::StandaloneTask));
        }

        let previous_task_id = match &task.activity_instance_id {
            Some(record_id) => self
                .ctx
                .executions
                .get_record(record_id)
                .await?
                .and_then(|r| r.previous_task_id),
            None => None,
        };
        let previous_performer = match previous_task_id {
            Some(id) => self.ctx.tasks.get_historic(&id).await?.and_then(|h| h.assignee),
            None => None,
        };
        let request = WithdrawRequest {
            task_id,
            node_key: task.node_key.as_deref(),
            caller,
            previous_performer: previous_performer.as_deref(),
        };
        if !self.ctx.identity.is_authorized_withdrawer(&request).await? {
            tracing::warn!(task_id, caller, "withdraw refused");
            return Ok(RoutingOutcome::Refused(RoutingFailure::NotAuthorized));
        }

        let destination = options
            .destination_key
            .clone()
            .map_or(Destination::PriorTask, Destination::Node);
        self.route(
            task_id,
            &BackwardMove {
                destination,
                outcome: TaskOutcome::Withdrawn,
                action: TaskAction::Withdrawn,
                variables: &options.variables,
                note: &options.note,
                actor: Some(caller),
                return_to_reject: false,
            },
        )
        .await
    }

    async fn route(&self, task_id: &str, request: &BackwardMove<'_>) -> DomainResult<RoutingOutcome> {
        let (outcome, transition) =
            retry_on_conflict(self.ctx.config.engine.max_transition_retries, move || self.try_route(task_id, request))
                .await?;
        if let Some(transition) = transition {
            after_commit(&self.ctx, &transition).await;
        }
        match &outcome {
            RoutingOutcome::Moved {
                target_node,
                new_task_ids,
            } => tracing::info!(
                task_id,
                target_node = %target_node,
                new_tasks = new_task_ids.len(),
                action = request.action.as_str(),
                "task routed back"
            ),
            RoutingOutcome::Refused(failure) => tracing::info!(
                task_id,
                action = request.action.as_str(),
                reason = %failure.describe(),
                "backward move refused"
            ),
        }
        Ok(outcome)
    }

    async fn try_route(
        &self,
        task_id: &str,
        request: &BackwardMove<'_>,
    ) -> DomainResult<(RoutingOutcome, Option<TransitionOutcome>)> {
        let task = self.require(task_id).await?;
        let (Some(process_instance_id), Some(execution_id)) = (task.process_instance_id.clone(), task.execution_id.clone())
        else {
            return Ok((RoutingOutcome::Refused(RoutingFailure::StandaloneTask), None));
        };

        let mut transition = Transition::load(&self.ctx, &process_instance_id).await?;
        let task = transition
            .task(task_id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;

        let target = match self.target(&transition, &task, &request.destination) {
            Ok(target) => target,
            Err(failure) => return Ok((RoutingOutcome::Refused(failure), None)),
        };

        let mut scopes = vec![ScopeRef::Task(task.id.clone())];
        scopes.extend(transition.scope_refs(&execution_id));
        let mut chain = ScopeChain::load(self.ctx.variables.as_ref(), scopes).await?;
        chain.write_all_default(request.variables);
        let mut locals = chain.local();
        locals.extend(request.variables.clone());
        transition.set_completing_locals(locals);
        transition.write_variables(chain.take_writes());

        let TransitionNote {
            reason,
            business_op,
            business_remark,
        } = request.note;
        transition.audit(
            AuditEntry::new(&task.id, Some(process_instance_id.as_str()), request.action)
                .by(request.actor)
                .with_reason(reason.as_deref(), business_op.as_deref(), business_remark.as_deref()),
        );

        let assignee = original_performer(&self.ctx, &process_instance_id, &target).await?;
        let return_to = if request.return_to_reject {
            task.node_key.clone()
        } else {
            None
        };
        transition.jump(task_id, &target, request.outcome, reason.as_deref(), assignee, return_to)?;
        transition.run().await?;
        let committed = transition.commit().await?;

        let outcome = RoutingOutcome::Moved {
            target_node: target,
            new_task_ids: committed.new_task_ids.clone(),
        };
        Ok((outcome, Some(committed)))
    }

    fn target(
        &self,
        transition: &Transition,
        task: &Task,
        destination: &Destination,
    ) -> Result<String, RoutingFailure> {
        let record = task
            .activity_instance_id
            .as_deref()
            .and_then(|id| transition.record(id))
            .ok_or(RoutingFailure::NoPredecessor)?;

        match destination {
            Destination::Node(key) => match transition.definition().node(key) {
                Some(node) if node.is_user_task() => Ok(key.clone()),
                _ => Err(RoutingFailure::UnknownDestination(key.clone())),
            },
            Destination::PriorTask => {
                let node = record.previous_task_node.clone().ok_or(RoutingFailure::NoPredecessor)?;
                match transition.latest_record_at(&node) {
                    Some(prior) => self.walk_back(transition, &prior.id),
                    None => Err(RoutingFailure::NoPredecessor),
                }
            }
            Destination::PriorPath => match record.from_records.as_slice() {
                [] => Err(RoutingFailure::NoPredecessor),
                [from] => self.walk_back(transition, from),
                _ => Err(RoutingFailure::AmbiguousPath),
            },
        }
    }

    /// Follow the recorded path backward from `record_id` to the nearest user task.
    fn walk_back(&self, transition: &Transition, record_id: &str) -> Result<String, RoutingFailure> {
        let limit = self.ctx.config.engine.max_walk_depth.max(1);
        let mut current = transition.record(record_id).ok_or(RoutingFailure::NoPredecessor)?;
        for _ in 0..limit {
            if current.node_kind == NodeKind::UserTask {
                return Ok(current.node_key.clone());
            }
            current = match current.from_records.as_slice() {
                [] => return Err(RoutingFailure::ProcessStart),
                [from] => transition.record(from).ok_or(RoutingFailure::NoPredecessor)?,
                _ => return Err(RoutingFailure::AmbiguousPath),
            };
        }
        Err(RoutingFailure::NoPredecessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CompleteOptions;
    use crate::services::task_lifecycle::TaskLifecycle;
    use crate::services::test_support::{engine, linear_definition, merge_definition};

    #[tokio::test]
    async fn test_linear_path_has_equal_candidates() {
        let engine = engine(vec![linear_definition()]).await;
        let lifecycle = TaskLifecycle::new(engine.ctx.clone());
        let router = RejectionRouter::new(engine.ctx.clone());

        let started = engine.start("linear", None).await;
        let first = started.new_task_ids[0].clone();
        lifecycle.claim(&first, Some("kermit")).await.unwrap();
        let next = lifecycle.complete(&first, &CompleteOptions::new()).await.unwrap();

        let target = router.find_rejected_node(&next.new_task_ids[0]).await.unwrap();
        assert_eq!(target.prior_task_node.as_deref(), Some("a"));
        assert_eq!(target.prior_path_node.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_first_task_has_no_predecessor() {
        let engine = engine(vec![linear_definition()]).await;
        let router = RejectionRouter::new(engine.ctx.clone());
        let started = engine.start("linear", None).await;

        let outcome = router
            .reject_to_pre_task(&started.new_task_ids[0], &RejectOptions::new())
            .await
            .unwrap();
        assert_eq!(outcome, RoutingOutcome::Refused(RoutingFailure::NoPredecessor));

        let by_path = router
            .reject_to_pre_task(
                &started.new_task_ids[0],
                &RejectOptions::new().reject_type(RejectType::PriorPath),
            )
            .await
            .unwrap();
        assert_eq!(by_path, RoutingOutcome::Refused(RoutingFailure::ProcessStart));
    }

    #[tokio::test]
    async fn test_merge_gives_distinct_candidates() {
        let engine = engine(vec![merge_definition()]).await;
        let lifecycle = TaskLifecycle::new(engine.ctx.clone());
        let router = RejectionRouter::new(engine.ctx.clone());

        let started = engine.start("merge", None).await;
        let a = started.new_task_ids[0].clone();
        let b = lifecycle
            .complete(&a, &CompleteOptions::new().variable("approved", true))
            .await
            .unwrap()
            .new_task_ids[0]
            .clone();
        let d = lifecycle.complete(&b, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

        let target = router.find_rejected_node(&d).await.unwrap();
        assert_eq!(target.prior_task_node.as_deref(), Some("b"));
        assert_eq!(target.prior_path_node.as_deref(), Some("merge"));
    }

    #[tokio::test]
    async fn test_unknown_destination_is_refused() {
        let engine = engine(vec![linear_definition()]).await;
        let router = RejectionRouter::new(engine.ctx.clone());
        let started = engine.start("linear", None).await;

        let outcome = router
            .reject_to_task(&started.new_task_ids[0], &RejectOptions::new().destination("nowhere"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RoutingOutcome::Refused(RoutingFailure::UnknownDestination("nowhere".into()))
        );
    }

    #[tokio::test]
    async fn test_withdraw_requires_authorization() {
        let engine = engine(vec![linear_definition()]).await;
        let lifecycle = TaskLifecycle::new(engine.ctx.clone());
        let router = RejectionRouter::new(engine.ctx.clone());

        let started = engine.start("linear", None).await;
        let first = started.new_task_ids[0].clone();
        lifecycle.claim(&first, Some("kermit")).await.unwrap();
        let second = lifecycle.complete(&first, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

        let refused = router
            .withdraw_task(&second, "gonzo", &WithdrawOptions::new())
            .await
            .unwrap();
        assert_eq!(refused, RoutingOutcome::Refused(RoutingFailure::NotAuthorized));

        let moved = router
            .withdraw_task(&second, "kermit", &WithdrawOptions::new().reason("sent too early"))
            .await
            .unwrap();
        let RoutingOutcome::Moved { target_node, new_task_ids } = moved else {
            panic!("withdraw should move the token");
        };
        assert_eq!(target_node, "a");
        let back = engine.ctx.tasks.get(&new_task_ids[0]).await.unwrap().unwrap();
        assert_eq!(back.assignee.as_deref(), Some("kermit"));
        let history = engine.ctx.tasks.get_historic(&second).await.unwrap().unwrap();
        assert_eq!(history.outcome, Some(TaskOutcome::Withdrawn));
    }
}
