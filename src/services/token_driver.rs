//! Token driver: moves executions through a process definition.
//!
//! A [`Transition`] loads one process instance, applies the moves a task
//! operation asks for and runs the resulting tokens forward until every one
//! of them rests at a wait state (a user task, a parallel join, or the end).
//! All writes are collected into one [`ChangeSet`] and committed together,
//! guarded by the instance version.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    multi_instance_mode_variable, ActivityRecord, AuditEntry, BroadcastPoint, Execution, FlowNode,
    IdentityLink, IdentityLinkType, Identity, MultiInstanceMode, MultiInstanceSpec, MultiInstanceState,
    NodeKind, ProcessDefinition, ProcessInstance, ScopeRef, SequenceFlow, Task, TaskAction, TaskOutcome,
    VariableMap, VariableValue, VariableWrite, LOOP_COUNTER_VARIABLE, RETURN_TO_REJECT_VARIABLE,
};
use crate::domain::ports::{ChangeSet, InstanceWrite, TaskClosure};
use crate::services::condition::{evaluate_condition, resolve_identities, resolve_identity};
use crate::services::context::EngineContext;

/// How a token arrives at a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arrival {
    pub from_node: Option<String>,
    pub from_records: Vec<String>,
    /// Task whose completion moved the token, as `(task id, node key)`
    pub previous_task: Option<(String, String)>,
    /// Assignee for the task created at the node, instead of the node's own
    pub assignee: Option<String>,
    /// Return-to-reject address for the task created at the node
    pub return_to: Option<String>,
}

/// A broadcast node reached by a transition, with its recipients resolved
/// against the variables visible at that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub point: BroadcastPoint,
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

/// What a committed transition produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionOutcome {
    pub process_instance_id: String,
    pub new_task_ids: Vec<String>,
    pub broadcasts: Vec<Broadcast>,
    pub ended: bool,
}

pub struct Transition {
    ctx: EngineContext,
    instance: ProcessInstance,
    instance_is_new: bool,
    definition: Arc<ProcessDefinition>,
    executions: BTreeMap<String, Execution>,
    dirty_executions: BTreeSet<String>,
    removed_executions: Vec<String>,
    records: HashMap<String, ActivityRecord>,
    /// Record ids, oldest first
    record_order: Vec<String>,
    dirty_records: BTreeSet<String>,
    live_tasks: BTreeMap<String, Task>,
    changes: ChangeSet,
    var_cache: HashMap<ScopeRef, VariableMap>,
    pending_vars: Vec<VariableWrite>,
    /// Local variables of the completing task merged with its completion variables
    completing_locals: VariableMap,
    queue: VecDeque<(String, String, Arrival)>,
    broadcasts: Vec<Broadcast>,
    new_task_ids: Vec<String>,
    ended: bool,
}

impl Transition {
    /// Load the runtime state of a live process instance.
    pub async fn load(ctx: &EngineContext, process_instance_id: &str) -> DomainResult<Self> {
        let instance = ctx
            .executions
            .get_instance(process_instance_id)
            .await?
            .ok_or_else(|| DomainError::ProcessInstanceNotFound(process_instance_id.to_string()))?;
        let definition = ctx.graph.definition(&instance.definition_id)?;

        let executions = ctx
            .executions
            .list_executions(process_instance_id)
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut records = HashMap::new();
        let mut record_order = Vec::new();
        for record in ctx.executions.list_records(process_instance_id).await? {
            record_order.push(record.id.clone());
            records.insert(record.id.clone(), record);
        }

        let live_tasks = ctx
            .tasks
            .list_by_instance(process_instance_id)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        Ok(Self::assemble(ctx, instance, false, definition, executions, records, record_order, live_tasks))
    }

    /// Begin a new process instance of `definition`. Call [`Self::start_token`] to set it going.
    pub fn create(
        ctx: &EngineContext,
        definition: Arc<ProcessDefinition>,
        business_key: Option<String>,
        starter: Option<String>,
    ) -> Self {
        let instance = ProcessInstance {
            id: Uuid::new_v4().to_string(),
            definition_id: definition.id.clone(),
            definition_key: definition.key.clone(),
            business_key,
            starter,
            started_at: Utc::now(),
            ended_at: None,
            version: 0,
        };
        let root = Execution::root(&instance.id);
        let mut executions = BTreeMap::new();
        executions.insert(root.id.clone(), root);

        let mut transition = Self::assemble(
            ctx,
            instance,
            true,
            definition,
            executions,
            HashMap::new(),
            Vec::new(),
            BTreeMap::new(),
        );
        let root_id = transition.instance.id.clone();
        transition.dirty_executions.insert(root_id);
        transition
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        ctx: &EngineContext,
        instance: ProcessInstance,
        instance_is_new: bool,
        definition: Arc<ProcessDefinition>,
        executions: BTreeMap<String, Execution>,
        records: HashMap<String, ActivityRecord>,
        record_order: Vec<String>,
        live_tasks: BTreeMap<String, Task>,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            instance,
            instance_is_new,
            definition,
            executions,
            dirty_executions: BTreeSet::new(),
            removed_executions: Vec::new(),
            records,
            record_order,
            dirty_records: BTreeSet::new(),
            live_tasks,
            changes: ChangeSet::new(),
            var_cache: HashMap::new(),
            pending_vars: Vec::new(),
            completing_locals: VariableMap::new(),
            queue: VecDeque::new(),
            broadcasts: Vec::new(),
            new_task_ids: Vec::new(),
            ended: false,
        }
    }

    pub fn instance(&self) -> &ProcessInstance {
        &self.instance
    }

    pub fn definition(&self) -> &ProcessDefinition {
        &self.definition
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.live_tasks.get(task_id)
    }

    pub fn execution(&self, execution_id: &str) -> Option<&Execution> {
        self.executions.get(execution_id)
    }

    pub fn record(&self, record_id: &str) -> Option<&ActivityRecord> {
        self.records.get(record_id)
    }

    /// Most recent entry into `node_key`.
    pub fn latest_record_at(&self, node_key: &str) -> Option<&ActivityRecord> {
        self.record_order
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id))
            .find(|record| record.node_key == node_key)
    }

    fn require_execution(&self, execution_id: &str) -> DomainResult<&Execution> {
        self.executions
            .get(execution_id)
            .ok_or_else(|| DomainError::ExecutionNotFound(execution_id.to_string()))
    }

    fn execution_mut(&mut self, execution_id: &str) -> DomainResult<&mut Execution> {
        self.dirty_executions.insert(execution_id.to_string());
        self.executions
            .get_mut(execution_id)
            .ok_or_else(|| DomainError::ExecutionNotFound(execution_id.to_string()))
    }

    fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Execution> + 'a {
        self.executions
            .values()
            .filter(move |e| e.parent_id.as_deref() == Some(parent_id))
    }

    /// Executions below `execution_id`, excluding itself.
    fn descendants(&self, execution_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut frontier = vec![execution_id.to_string()];
        while let Some(current) = frontier.pop() {
            for child in self.children_of(&current) {
                out.push(child.id.clone());
                frontier.push(child.id.clone());
            }
        }
        out
    }

    /// Whether `ancestor` lies strictly above `execution_id`.
    pub fn is_strict_ancestor(&self, ancestor: &str, execution_id: &str) -> bool {
        let mut current = self.executions.get(execution_id).and_then(|e| e.parent_id.clone());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.executions.get(&id).and_then(|e| e.parent_id.clone());
        }
        false
    }

    /// Scope chain of an execution, innermost first.
    pub fn scope_refs(&self, execution_id: &str) -> Vec<ScopeRef> {
        let mut scopes = Vec::new();
        let mut current = Some(execution_id.to_string());
        while let Some(id) = current {
            current = self.executions.get(&id).and_then(|e| e.parent_id.clone());
            scopes.push(ScopeRef::Execution(id));
        }
        scopes
    }

    fn remove_execution(&mut self, execution_id: &str) {
        if self.executions.remove(execution_id).is_some() {
            self.dirty_executions.remove(execution_id);
            self.removed_executions.push(execution_id.to_string());
        }
    }

    // Variables

    async fn scope_vars(&mut self, scope: &ScopeRef) -> DomainResult<VariableMap> {
        if let Some(cached) = self.var_cache.get(scope) {
            return Ok(cached.clone());
        }
        let mut vars = self.ctx.variables.load(scope).await?;
        for write in self.pending_vars.iter().filter(|w| &w.scope == scope) {
            match &write.value {
                Some(value) => {
                    vars.insert(write.name.clone(), value.clone());
                }
                None => {
                    vars.remove(&write.name);
                }
            }
        }
        self.var_cache.insert(scope.clone(), vars.clone());
        Ok(vars)
    }

    /// Variables visible from an execution, pending writes included.
    pub async fn visible(&mut self, execution_id: &str) -> DomainResult<VariableMap> {
        let mut merged = VariableMap::new();
        for scope in self.scope_refs(execution_id).iter().rev() {
            merged.extend(self.scope_vars(scope).await?);
        }
        Ok(merged)
    }

    pub fn write_variable(&mut self, write: VariableWrite) {
        if let Some(vars) = self.var_cache.get_mut(&write.scope) {
            match &write.value {
                Some(value) => {
                    vars.insert(write.name.clone(), value.clone());
                }
                None => {
                    vars.remove(&write.name);
                }
            }
        }
        self.pending_vars.push(write);
    }

    pub fn write_variables(&mut self, writes: Vec<VariableWrite>) {
        for write in writes {
            self.write_variable(write);
        }
    }

    pub fn set_completing_locals(&mut self, locals: VariableMap) {
        self.completing_locals = locals;
    }

    // Task bookkeeping

    pub fn audit(&mut self, entry: AuditEntry) {
        self.changes.audit.push(entry);
    }

    pub fn add_identity_link(&mut self, link: IdentityLink) {
        self.changes.identity_links.push(link);
    }

    fn end_record(&mut self, record_id: &str) {
        if let Some(record) = self.records.get_mut(record_id) {
            if record.ended_at.is_none() {
                record.ended_at = Some(Utc::now());
                self.dirty_records.insert(record_id.to_string());
            }
        }
    }

    /// Close a live task of the instance; its history keeps `outcome`.
    pub fn close_task(&mut self, task_id: &str, outcome: TaskOutcome, reason: Option<&str>) -> DomainResult<()> {
        let task = self
            .live_tasks
            .remove(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        if let Some(record_id) = &task.activity_instance_id {
            self.end_record(record_id);
        }
        self.changes.closed_tasks.push(TaskClosure {
            task_id: task.id,
            expected_version: task.version,
            outcome,
            reason: reason.map(ToString::to_string),
            ended_at: Utc::now(),
        });
        Ok(())
    }

    // Moves requested by task operations

    /// Put the root token on the start event.
    pub fn start_token(&mut self) -> DomainResult<()> {
        let start = self.definition.start_node()?.key.clone();
        let root = self.instance.id.clone();
        self.queue.push_back((root, start, Arrival::default()));
        Ok(())
    }

    /// Complete a task and move its token along the outgoing flows.
    ///
    /// A multi-instance child only reports back to its scope; the scope leaves
    /// the node once every instance has completed.
    pub async fn complete_forward(&mut self, task_id: &str, outcome: TaskOutcome, reason: Option<&str>) -> DomainResult<()> {
        let task = self
            .live_tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        let (Some(execution_id), Some(node_key)) = (task.execution_id.clone(), task.node_key.clone()) else {
            return Err(DomainError::invalid_state(task_id, "task is not bound to an execution"));
        };
        self.close_task(task_id, outcome, reason)?;

        let execution = self.require_execution(&execution_id)?.clone();
        let previous = Some((task.id.clone(), node_key.clone()));

        if let Some(scope_id) = self.multi_instance_scope_of(&execution, &node_key) {
            let child_record = execution.activity_record_id.clone();
            self.remove_execution(&execution_id);
            return self.instance_completed(&scope_id, &node_key, child_record, previous).await;
        }

        let from_records = execution.activity_record_id.into_iter().collect();
        self.follow_outgoing(&execution_id, &node_key, from_records, previous)
    }

    fn multi_instance_scope_of(&self, execution: &Execution, node_key: &str) -> Option<String> {
        let parent = self.executions.get(execution.parent_id.as_deref()?)?;
        parent
            .multi_instance
            .as_ref()
            .filter(|state| state.node_key == node_key)
            .map(|_| parent.id.clone())
    }

    async fn instance_completed(
        &mut self,
        scope_id: &str,
        node_key: &str,
        child_record: Option<String>,
        previous: Option<(String, String)>,
    ) -> DomainResult<()> {
        let node = self.definition.require_node(node_key)?.clone();
        let scope = self.execution_mut(scope_id)?;
        let Some(state) = scope.multi_instance.as_mut() else {
            return Err(DomainError::ExecutionNotFound(scope_id.to_string()));
        };
        state.completed += 1;
        let (done, spawn_next, entry_record) = (
            state.is_done(),
            state.mode == MultiInstanceMode::Sequential && state.next_index < state.total(),
            state.entry_record_id.clone(),
        );

        if done {
            scope.multi_instance = None;
            scope.is_active = true;
            self.end_record(&entry_record);
            tracing::debug!(node_key, scope_id, "multi-instance node finished");
            return self.follow_outgoing(scope_id, node_key, child_record.into_iter().collect(), previous);
        }
        if spawn_next {
            self.spawn_instance(scope_id, &node).await?;
        }
        Ok(())
    }

    /// Take away the tokens a backward or jump move replaces, closing their tasks.
    ///
    /// Returns the execution that moves. A multi-instance child moves its whole
    /// scope. When `target_execution` is a live ancestor, the move collapses the
    /// branches below it.
    pub fn prepare_move(
        &mut self,
        task_id: &str,
        target_execution: Option<&str>,
        outcome: TaskOutcome,
        reason: Option<&str>,
    ) -> DomainResult<String> {
        let task = self
            .live_tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        let execution_id = task
            .execution_id
            .clone()
            .ok_or_else(|| DomainError::invalid_state(task_id, "task is not bound to an execution"))?;
        let execution = self.require_execution(&execution_id)?.clone();

        let mut moving = match (&task.node_key, &execution.parent_id) {
            (Some(node_key), Some(_)) => self
                .multi_instance_scope_of(&execution, node_key)
                .unwrap_or_else(|| execution_id.clone()),
            _ => execution_id.clone(),
        };
        if let Some(target) = target_execution {
            if self.executions.contains_key(target) && self.is_strict_ancestor(target, &moving) {
                moving = target.to_string();
            }
        }

        let below = self.descendants(&moving);
        let mut subtree: BTreeSet<String> = below.iter().cloned().collect();
        subtree.insert(moving.clone());
        let affected: Vec<String> = self
            .live_tasks
            .values()
            .filter(|t| t.execution_id.as_ref().is_some_and(|e| subtree.contains(e)))
            .map(|t| t.id.clone())
            .collect();
        for id in affected {
            self.close_task(&id, outcome, reason)?;
        }
        for id in below {
            if let Some(record_id) = self.executions.get(&id).and_then(|e| e.activity_record_id.clone()) {
                self.end_record(&record_id);
            }
            self.remove_execution(&id);
        }

        let record_id = {
            let exec = self.execution_mut(&moving)?;
            exec.multi_instance = None;
            exec.is_active = true;
            exec.activity_record_id.clone()
        };
        if let Some(record_id) = record_id {
            self.end_record(&record_id);
        }
        Ok(moving)
    }

    /// Arrival for a non-flow move into `target_node`.
    ///
    /// A node entered before keeps the path it was entered from; otherwise the
    /// move itself is the path.
    pub fn arrival_for_move(&self, target_node: &str, task: &Task) -> Arrival {
        match self.latest_record_at(target_node) {
            Some(prior) => Arrival {
                from_node: prior.from_node_key.clone(),
                from_records: prior.from_records.clone(),
                previous_task: prior
                    .previous_task_id
                    .clone()
                    .zip(prior.previous_task_node.clone()),
                ..Arrival::default()
            },
            None => Arrival {
                from_node: task.node_key.clone(),
                from_records: task.activity_instance_id.clone().into_iter().collect(),
                previous_task: task.node_key.clone().map(|node| (task.id.clone(), node)),
                ..Arrival::default()
            },
        }
    }

    /// Close `task_id` and send its token to `target_node` outside the flows.
    ///
    /// Used by rejection, withdrawal, destination overrides and return-to-reject.
    pub fn jump(
        &mut self,
        task_id: &str,
        target_node: &str,
        outcome: TaskOutcome,
        reason: Option<&str>,
        assignee: Option<String>,
        return_to: Option<String>,
    ) -> DomainResult<()> {
        self.definition.require_node(target_node)?;
        let task = self
            .live_tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        let mut arrival = self.arrival_for_move(target_node, &task);
        arrival.assignee = assignee;
        arrival.return_to = return_to;

        let target_execution = self.latest_record_at(target_node).map(|r| r.execution_id.clone());
        let moving = self.prepare_move(task_id, target_execution.as_deref(), outcome, reason)?;
        tracing::debug!(
            task_id,
            from = ?task.node_key,
            to = target_node,
            execution_id = %moving,
            outcome = outcome.as_str(),
            "moving token"
        );
        self.move_to(&moving, target_node, arrival)
    }

    pub fn move_to(&mut self, execution_id: &str, node_key: &str, arrival: Arrival) -> DomainResult<()> {
        self.definition.require_node(node_key)?;
        self.queue
            .push_back((execution_id.to_string(), node_key.to_string(), arrival));
        Ok(())
    }

    // Forward walk

    /// Drive queued tokens until all of them wait.
    pub async fn run(&mut self) -> DomainResult<()> {
        let limit = self.ctx.config.engine.max_walk_depth.max(1);
        let mut steps = 0u32;
        while let Some((execution_id, node_key, arrival)) = self.queue.pop_front() {
            steps += 1;
            if steps > limit {
                return Err(DomainError::ValidationFailed(format!(
                    "process {} did not reach a wait state within {limit} steps",
                    self.definition.id
                )));
            }
            self.enter(&execution_id, &node_key, arrival).await?;
        }
        Ok(())
    }

    fn open_record(&mut self, execution_id: &str, node: &FlowNode, arrival: &Arrival) -> String {
        let (previous_task_id, previous_task_node) = arrival.previous_task.clone().unzip();
        let record = ActivityRecord {
            id: Uuid::new_v4().to_string(),
            process_instance_id: self.instance.id.clone(),
            execution_id: execution_id.to_string(),
            node_key: node.key.clone(),
            node_kind: node.kind,
            from_node_key: arrival.from_node.clone(),
            from_records: arrival.from_records.clone(),
            previous_task_id,
            previous_task_node,
            started_at: Utc::now(),
            ended_at: None,
        };
        let id = record.id.clone();
        self.record_order.push(id.clone());
        self.dirty_records.insert(id.clone());
        self.records.insert(id.clone(), record);
        id
    }

    fn place(&mut self, execution_id: &str, node_key: &str, record_id: &str, active: bool) -> DomainResult<()> {
        let exec = self.execution_mut(execution_id)?;
        exec.node_key = Some(node_key.to_string());
        exec.activity_record_id = Some(record_id.to_string());
        exec.is_active = active;
        Ok(())
    }

    async fn enter(&mut self, execution_id: &str, node_key: &str, arrival: Arrival) -> DomainResult<()> {
        let node = self.definition.require_node(node_key)?.clone();
        tracing::trace!(execution_id, node_key, kind = node.kind.as_str(), "entering node");

        if node.kind == NodeKind::ParallelGateway {
            return self.enter_parallel_gateway(execution_id, &node, arrival);
        }

        let record_id = self.open_record(execution_id, &node, &arrival);
        self.place(execution_id, node_key, &record_id, true)?;
        if node.is_broadcast() {
            self.queue_broadcast(execution_id, &node, &record_id).await?;
        }

        match node.kind {
            NodeKind::StartEvent | NodeKind::ServiceTask => {
                self.end_record(&record_id);
                self.follow_outgoing(execution_id, node_key, vec![record_id], arrival.previous_task)
            }
            NodeKind::ExclusiveGateway => {
                let flow = self.select_flow(execution_id, &node).await?;
                self.end_record(&record_id);
                self.follow(execution_id, node_key, vec![flow], vec![record_id], arrival.previous_task)
            }
            NodeKind::UserTask => match node.multi_instance.clone() {
                Some(spec) => self.enter_multi_instance(execution_id, &node, &spec, &record_id, arrival).await,
                None => self
                    .create_task(execution_id, &node, &record_id, arrival.assignee, arrival.return_to)
                    .await
                    .map(|_| ()),
            },
            NodeKind::EndEvent => {
                self.end_record(&record_id);
                self.end_execution(execution_id)
            }
            NodeKind::ParallelGateway => Ok(()),
        }
    }

    async fn select_flow(&mut self, execution_id: &str, node: &FlowNode) -> DomainResult<SequenceFlow> {
        let vars = self.visible(execution_id).await?;
        let outgoing: Vec<SequenceFlow> = self.definition.outgoing(&node.key).into_iter().cloned().collect();
        for flow in outgoing.iter().filter(|f| !f.is_default) {
            let taken = match &flow.condition {
                None => true,
                Some(condition) => evaluate_condition(condition, &vars)?,
            };
            if taken {
                return Ok(flow.clone());
            }
        }
        outgoing
            .into_iter()
            .find(|f| f.is_default)
            .ok_or_else(|| DomainError::ValidationFailed(format!("no outgoing flow of gateway '{}' matched", node.key)))
    }

    fn follow_outgoing(
        &mut self,
        execution_id: &str,
        node_key: &str,
        from_records: Vec<String>,
        previous_task: Option<(String, String)>,
    ) -> DomainResult<()> {
        let flows: Vec<SequenceFlow> = self.definition.outgoing(node_key).into_iter().cloned().collect();
        self.follow(execution_id, node_key, flows, from_records, previous_task)
    }

    /// Send the token along `flows`; several flows fork concurrent children.
    fn follow(
        &mut self,
        execution_id: &str,
        node_key: &str,
        flows: Vec<SequenceFlow>,
        from_records: Vec<String>,
        previous_task: Option<(String, String)>,
    ) -> DomainResult<()> {
        let arrival = Arrival {
            from_node: Some(node_key.to_string()),
            from_records,
            previous_task,
            ..Arrival::default()
        };
        if flows.is_empty() {
            return Err(DomainError::ValidationFailed(format!("node '{node_key}' has no outgoing flow")));
        }
        if flows.len() == 1 {
            for flow in flows {
                self.queue.push_back((execution_id.to_string(), flow.target, arrival.clone()));
            }
            return Ok(());
        }
        let parent = {
            let exec = self.execution_mut(execution_id)?;
            exec.is_active = false;
            exec.clone()
        };
        for flow in flows {
            let child = Execution::child_of(&parent);
            let child_id = child.id.clone();
            self.dirty_executions.insert(child_id.clone());
            self.executions.insert(child_id.clone(), child);
            self.queue.push_back((child_id, flow.target, arrival.clone()));
        }
        Ok(())
    }

    fn enter_parallel_gateway(&mut self, execution_id: &str, node: &FlowNode, arrival: Arrival) -> DomainResult<()> {
        let incoming = self.definition.incoming(&node.key).len();
        let execution = self.require_execution(execution_id)?.clone();

        let record_id = self.open_record(execution_id, node, &arrival);
        self.end_record(&record_id);

        let parent_id = match (&execution.parent_id, execution.is_concurrent && incoming > 1) {
            (Some(parent_id), true) => parent_id.clone(),
            _ => {
                self.place(execution_id, &node.key, &record_id, true)?;
                return self.follow_outgoing(execution_id, &node.key, vec![record_id], arrival.previous_task);
            }
        };

        self.place(execution_id, &node.key, &record_id, false)?;
        let waiting: Vec<Execution> = self
            .children_of(&parent_id)
            .filter(|c| !c.is_active && c.node_key.as_deref() == Some(node.key.as_str()))
            .cloned()
            .collect();
        if waiting.len() < incoming {
            tracing::debug!(join = %node.key, waiting = waiting.len(), incoming, "waiting at join");
            return Ok(());
        }

        let mut from_records = Vec::new();
        for child in &waiting {
            if let Some(record) = child.activity_record_id.as_ref().and_then(|id| self.records.get(id)) {
                for id in &record.from_records {
                    if !from_records.contains(id) {
                        from_records.push(id.clone());
                    }
                }
            }
            self.remove_execution(&child.id);
        }
        let from_nodes: BTreeSet<String> = from_records
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|r| r.node_key.clone())
            .collect();
        let merged_arrival = Arrival {
            from_node: if from_nodes.len() == 1 { from_nodes.into_iter().next() } else { None },
            from_records,
            previous_task: arrival.previous_task.clone(),
            ..Arrival::default()
        };
        let merged = self.open_record(&parent_id, node, &merged_arrival);
        self.end_record(&merged);
        self.place(&parent_id, &node.key, &merged, true)?;
        tracing::debug!(join = %node.key, merged = waiting.len(), "join complete");
        self.follow_outgoing(&parent_id, &node.key, vec![merged], arrival.previous_task)
    }

    async fn resolve_mode(&mut self, execution_id: &str, node: &FlowNode, spec: &MultiInstanceSpec) -> DomainResult<MultiInstanceMode> {
        let name = multi_instance_mode_variable(&node.key);
        let raw = match self.completing_locals.get(&name) {
            Some(value) => Some(value.clone()),
            None => self.visible(execution_id).await?.get(&name).cloned(),
        };
        let Some(raw) = raw else {
            return Ok(spec.mode);
        };
        match raw.as_str().map(str::parse::<MultiInstanceMode>) {
            Some(Ok(mode)) => Ok(mode),
            _ => {
                tracing::warn!(
                    node_key = %node.key,
                    value = ?raw,
                    default = spec.mode.as_str(),
                    "invalid multi-instance mode, using the design default"
                );
                Ok(spec.mode)
            }
        }
    }

    async fn enter_multi_instance(
        &mut self,
        execution_id: &str,
        node: &FlowNode,
        spec: &MultiInstanceSpec,
        record_id: &str,
        arrival: Arrival,
    ) -> DomainResult<()> {
        let mode = self.resolve_mode(execution_id, node, spec).await?;
        let vars = self.visible(execution_id).await?;
        let collection = spec.collection.trim().trim_start_matches("${").trim_end_matches('}').trim();
        let elements = vars.get(collection).map(VariableValue::elements).unwrap_or_default();

        if elements.is_empty() {
            tracing::debug!(node_key = %node.key, collection, "empty multi-instance collection, skipping node");
            self.end_record(record_id);
            return self.follow_outgoing(execution_id, &node.key, vec![record_id.to_string()], arrival.previous_task);
        }

        let total = elements.len();
        let scope = self.execution_mut(execution_id)?;
        scope.is_active = false;
        scope.multi_instance = Some(MultiInstanceState {
            mode,
            node_key: node.key.clone(),
            elements,
            element_variable: spec.element_variable.clone(),
            next_index: 0,
            completed: 0,
            entry_record_id: record_id.to_string(),
        });

        let initial = match mode {
            MultiInstanceMode::Parallel => total,
            MultiInstanceMode::Sequential => 1,
        };
        tracing::debug!(node_key = %node.key, mode = mode.as_str(), total, "multi-instance node entered");
        for _ in 0..initial {
            self.spawn_instance(execution_id, node).await?;
        }
        Ok(())
    }

    async fn spawn_instance(&mut self, scope_id: &str, node: &FlowNode) -> DomainResult<()> {
        let (scope, state) = {
            let scope = self.execution_mut(scope_id)?;
            let Some(state) = scope.multi_instance.as_mut() else {
                return Err(DomainError::ExecutionNotFound(scope_id.to_string()));
            };
            let snapshot = state.clone();
            state.next_index += 1;
            (scope.clone(), snapshot)
        };
        let index = state.next_index;
        let element = state
            .elements
            .get(index as usize)
            .cloned()
            .unwrap_or(VariableValue::Null);

        let mut child = Execution::child_of(&scope);
        child.node_key = Some(node.key.clone());
        let child_id = child.id.clone();
        self.dirty_executions.insert(child_id.clone());
        self.executions.insert(child_id.clone(), child);

        let locals = ScopeRef::Execution(child_id.clone());
        self.write_variable(VariableWrite::set(locals.clone(), state.element_variable.as_str(), element));
        self.write_variable(VariableWrite::set(locals, LOOP_COUNTER_VARIABLE, i64::from(index).into()));

        let entry = self
            .records
            .get(&state.entry_record_id)
            .cloned()
            .ok_or_else(|| DomainError::ExecutionNotFound(state.entry_record_id.clone()))?;
        let arrival = Arrival {
            from_node: entry.from_node_key.clone(),
            from_records: entry.from_records.clone(),
            previous_task: entry.previous_task_id.clone().zip(entry.previous_task_node.clone()),
            ..Arrival::default()
        };
        let record_id = self.open_record(&child_id, node, &arrival);
        self.place(&child_id, &node.key, &record_id, true)?;
        self.create_task(&child_id, node, &record_id, None, None).await?;
        Ok(())
    }

    async fn create_task(
        &mut self,
        execution_id: &str,
        node: &FlowNode,
        record_id: &str,
        assignee: Option<String>,
        return_to: Option<String>,
    ) -> DomainResult<String> {
        let vars = self.visible(execution_id).await?;
        let assignee = assignee.or_else(|| node.assignee.as_deref().and_then(|a| resolve_identity(a, &vars)));

        let name = if node.name.is_empty() { node.key.clone() } else { node.name.clone() };
        let mut task = Task::new(None).with_name(name);
        task.assignee = assignee;
        task.priority = self.ctx.config.engine.default_priority;
        task.process_definition_id = Some(self.definition.id.clone());
        task.process_definition_key = Some(self.definition.key.clone());
        task.process_instance_id = Some(self.instance.id.clone());
        task.execution_id = Some(execution_id.to_string());
        task.node_key = Some(node.key.clone());
        task.activity_instance_id = Some(record_id.to_string());
        task.return_to = return_to.clone();

        for user in resolve_identities(&node.candidate_users, &vars) {
            self.add_identity_link(IdentityLink::for_task(&task.id, Identity::User(user), IdentityLinkType::Candidate));
        }
        for group in resolve_identities(&node.candidate_groups, &vars) {
            self.add_identity_link(IdentityLink::for_task(&task.id, Identity::Group(group), IdentityLinkType::Candidate));
        }
        if let Some(address) = return_to {
            self.write_variable(VariableWrite::set(
                ScopeRef::Task(task.id.clone()),
                RETURN_TO_REJECT_VARIABLE,
                VariableValue::String(address),
            ));
        }

        self.audit(AuditEntry::new(&task.id, Some(self.instance.id.as_str()), TaskAction::Created));
        tracing::debug!(
            task_id = %task.id,
            node_key = %node.key,
            assignee = ?task.assignee,
            "task created"
        );

        let id = task.id.clone();
        self.changes.new_tasks.push(task.clone());
        self.live_tasks.insert(id.clone(), task);
        self.new_task_ids.push(id.clone());
        Ok(id)
    }

    /// End a token; a concurrent parent ends with its last child, the root ends the instance.
    fn end_execution(&mut self, execution_id: &str) -> DomainResult<()> {
        let mut current = execution_id.to_string();
        loop {
            let execution = self.require_execution(&current)?.clone();
            let Some(parent_id) = execution.parent_id else {
                let below = self.descendants(&current);
                for id in below {
                    self.remove_execution(&id);
                }
                let root = self.execution_mut(&current)?;
                root.is_active = false;
                self.ended = true;
                tracing::info!(process_instance_id = %self.instance.id, "process instance ended");
                return Ok(());
            };
            self.remove_execution(&current);
            if self.children_of(&parent_id).next().is_some() {
                return Ok(());
            }
            current = parent_id;
        }
    }

    async fn queue_broadcast(&mut self, execution_id: &str, node: &FlowNode, record_id: &str) -> DomainResult<()> {
        let Some(spec) = node.copy_to.clone() else {
            return Ok(());
        };
        let vars = self.visible(execution_id).await?;
        self.broadcasts.push(Broadcast {
            point: BroadcastPoint {
                activity_instance_id: record_id.to_string(),
                node_key: node.key.clone(),
                node_name: node.name.clone(),
                process_definition_key: self.definition.key.clone(),
                process_instance_id: self.instance.id.clone(),
                business_key: self.instance.business_key.clone(),
            },
            users: resolve_identities(&spec.users, &vars),
            groups: resolve_identities(&spec.groups, &vars),
        });
        Ok(())
    }

    /// Commit every collected write in one transaction.
    pub async fn commit(mut self) -> DomainResult<TransitionOutcome> {
        let ended_at = self.ended.then(Utc::now);
        self.changes.instance = Some(if self.instance_is_new {
            let mut instance = self.instance.clone();
            instance.ended_at = ended_at;
            InstanceWrite::Insert(instance)
        } else {
            InstanceWrite::Touch {
                id: self.instance.id.clone(),
                expected_version: self.instance.version,
                ended_at,
            }
        });

        self.changes.executions = self
            .dirty_executions
            .iter()
            .filter_map(|id| self.executions.get(id).cloned())
            .collect();
        self.changes.removed_executions = std::mem::take(&mut self.removed_executions);
        self.changes.activity_records = self
            .dirty_records
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect();
        self.changes.variables = std::mem::take(&mut self.pending_vars);

        self.ctx.store.commit(self.changes).await?;
        Ok(TransitionOutcome {
            process_instance_id: self.instance.id,
            new_task_ids: self.new_task_ids,
            broadcasts: self.broadcasts,
            ended: self.ended,
        })
    }
}
