//! Task CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::cli::commands::parse_variables;
use crate::cli::display::{colorize_delegation, colorize_outcome, list_table, render_list};
use crate::cli::engine::Engine;
use crate::cli::output::{output, short_id, truncate, CommandOutput};
use crate::domain::models::{
    AuditEntry, Comment, CompleteOptions, HistoricTask, IdentityLink, RejectOptions, RejectType, RejectionTarget, RoutingOutcome,
    Task, TaskFilter, VariableMap, WithdrawOptions,
};
use crate::domain::errors::DomainError;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List live tasks
    List {
        /// Tasks assigned to, or claimable by, this user
        #[arg(short, long)]
        user: Option<String>,
        /// Tasks of one process instance
        #[arg(short, long)]
        instance: Option<String>,
        /// Only unassigned tasks
        #[arg(long)]
        unassigned: bool,
    },
    /// Show task details, variables, links, comments and events
    Show {
        /// Task ID
        id: String,
    },
    /// Show the history record of a task, including finished ones
    History {
        /// Task ID
        id: String,
    },
    /// Claim a task, or release it with --release
    Claim {
        id: String,
        /// Claiming user
        #[arg(short, long, required_unless_present = "release")]
        user: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Delegate a task to another user
    Delegate { id: String, user: String },
    /// Hand a delegated task back to its owner
    Resolve { id: String },
    /// Complete a task
    Complete {
        id: String,
        /// Variables (format: name=value)
        #[arg(short, long = "var")]
        vars: Vec<String>,
        /// Jump to this node instead of following the outgoing flows
        #[arg(short, long)]
        destination: Option<String>,
        #[arg(short, long)]
        reason: Option<String>,
        /// Acting user recorded in the audit trail
        #[arg(short, long)]
        actor: Option<String>,
    },
    /// Show the nodes a reject would route back to
    Targets { id: String },
    /// Reject a task back to a previous node
    Reject {
        id: String,
        /// Destination node; routes to the predecessor when omitted
        #[arg(short, long)]
        to: Option<String>,
        /// Route to the path predecessor instead of the prior task
        #[arg(long)]
        path: bool,
        /// The new task returns here when completed
        #[arg(long = "return")]
        return_to_reject: bool,
        #[arg(short, long)]
        reason: Option<String>,
        #[arg(short, long = "var")]
        vars: Vec<String>,
        #[arg(short, long)]
        actor: Option<String>,
    },
    /// Pull a forwarded task back
    Withdraw {
        id: String,
        /// Calling user
        #[arg(short, long)]
        caller: String,
        #[arg(short, long)]
        to: Option<String>,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Add a comment to a task
    Comment {
        id: String,
        message: String,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Set task variables
    SetVar {
        id: String,
        /// Variables (format: name=value)
        #[arg(required = true)]
        vars: Vec<String>,
        /// Write to the task's own scope
        #[arg(long)]
        local: bool,
    },
    /// Delete standalone tasks
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Also delete history, comments and attachments
        #[arg(long)]
        cascade: bool,
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<Task>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "node", "assignee", "delegation", "priority"]);
        for task in &self.tasks {
            table.add_row(vec![
                Cell::new(short_id(&task.id)),
                Cell::new(truncate(&task.name, 30)),
                Cell::new(task.node_key.as_deref().unwrap_or("-")),
                Cell::new(task.assignee.as_deref().unwrap_or("-")),
                Cell::new(colorize_delegation(task.delegation_state)),
                Cell::new(task.priority),
            ]);
        }
        render_list("task", &table, self.tasks.len() as u64)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskDetailOutput {
    pub task: Task,
    pub variables: VariableMap,
    pub identity_links: Vec<IdentityLink>,
    pub comments: Vec<Comment>,
    pub events: Vec<AuditEntry>,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let t = &self.task;
        let mut lines = vec![
            format!("Task {}", t.id),
            format!("  Name:       {}", t.name),
            format!("  Node:       {}", t.node_key.as_deref().unwrap_or("-")),
            format!("  Instance:   {}", t.process_instance_id.as_deref().unwrap_or("-")),
            format!("  Assignee:   {}", t.assignee.as_deref().unwrap_or("-")),
            format!("  Owner:      {}", t.owner.as_deref().unwrap_or("-")),
            format!("  Delegation: {}", colorize_delegation(t.delegation_state)),
            format!("  Priority:   {}", t.priority),
            format!("  Created:    {}", t.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ];
        if let Some(return_to) = &t.return_to {
            lines.push(format!("  Returns to: {return_to}"));
        }
        if !self.variables.is_empty() {
            lines.push("  Variables:".to_string());
            for (name, value) in &self.variables {
                let rendered = value.to_plain_string().unwrap_or_else(|| "null".to_string());
                lines.push(format!("    {name} = {}", truncate(&rendered, 60)));
            }
        }
        if !self.identity_links.is_empty() {
            lines.push("  Links:".to_string());
            for link in &self.identity_links {
                let who = link.user_id.as_deref().or(link.group_id.as_deref()).unwrap_or("-");
                lines.push(format!("    {} {who}", link.link_type.as_str()));
            }
        }
        for comment in &self.comments {
            lines.push(format!(
                "  Comment by {}: {}",
                comment.user_id.as_deref().unwrap_or("-"),
                comment.message
            ));
        }
        if !self.events.is_empty() {
            lines.push("  Events:".to_string());
            for event in &self.events {
                lines.push(format!(
                    "    {} {} {}",
                    event.created_at.format("%Y-%m-%d %H:%M:%S"),
                    event.action.as_str(),
                    event.actor_id.as_deref().unwrap_or("")
                ));
            }
        }
        lines.join("\n")
    }
}

impl CommandOutput for HistoricTask {
    fn to_human(&self) -> String {
        let state = match self.outcome {
            Some(outcome) => colorize_outcome(outcome).to_string(),
            None => "active".to_string(),
        };
        let mut lines = vec![
            format!("Task {} ({})", self.id, self.name),
            format!("  Node:     {}", self.node_key.as_deref().unwrap_or("-")),
            format!("  Assignee: {}", self.assignee.as_deref().unwrap_or("-")),
            format!("  Started:  {}", self.start_time.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("  State:    {state}"),
        ];
        if let Some(end) = self.end_time {
            lines.push(format!("  Ended:    {}", end.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let Some(reason) = &self.delete_reason {
            lines.push(format!("  Reason:   {reason}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskUpdateOutput {
    pub message: String,
    pub new_task_ids: Vec<String>,
}

impl CommandOutput for TaskUpdateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        for id in &self.new_task_ids {
            lines.push(format!("  new task {id}"));
        }
        lines.join("\n")
    }
}

impl CommandOutput for RejectionTarget {
    fn to_human(&self) -> String {
        format!(
            "Prior task node: {}\nPrior path node: {}",
            self.prior_task_node.as_deref().unwrap_or("-"),
            self.prior_path_node.as_deref().unwrap_or("(ambiguous or none)")
        )
    }
}

fn routed(outcome: RoutingOutcome, verb: &str) -> Result<TaskUpdateOutput> {
    match outcome {
        RoutingOutcome::Moved { target_node, new_task_ids } => Ok(TaskUpdateOutput {
            message: format!("{verb} to {target_node}"),
            new_task_ids,
        }),
        RoutingOutcome::Refused(failure) => anyhow::bail!("{verb} refused: {}", failure.describe()),
    }
}

fn updated(message: impl Into<String>) -> TaskUpdateOutput {
    TaskUpdateOutput {
        message: message.into(),
        new_task_ids: Vec::new(),
    }
}

pub async fn execute(args: TaskArgs, json_mode: bool) -> Result<()> {
    let engine = Engine::load().await?;
    let service = engine.tasks();

    match args.command {
        TaskCommands::List {
            user,
            instance,
            unassigned,
        } => {
            let tasks = match (user, instance) {
                (Some(user), None) if !unassigned => service.list_tasks_for_user(&user).await?,
                (user, instance) => {
                    let filter = TaskFilter {
                        candidate_user: user,
                        process_instance_id: instance,
                        unassigned_only: unassigned,
                        ..TaskFilter::default()
                    };
                    service.list_tasks(&filter).await?
                }
            };
            output(&TaskListOutput { tasks }, json_mode);
        }
        TaskCommands::Show { id } => {
            let task = service
                .get_task(&id)
                .await?
                .ok_or_else(|| DomainError::TaskNotFound(id.clone()))?;
            let detail = TaskDetailOutput {
                variables: service.get_variables(&id, None).await?,
                identity_links: service.get_identity_links_for_task(&id).await?,
                comments: service.get_task_comments(&id).await?,
                events: service.get_task_events(&id).await?,
                task,
            };
            output(&detail, json_mode);
        }
        TaskCommands::History { id } => {
            let history = service
                .get_historic_task(&id)
                .await?
                .ok_or_else(|| DomainError::TaskNotFound(id.clone()))?;
            output(&history, json_mode);
        }
        TaskCommands::Claim { id, user, release } => {
            let user = if release { None } else { user };
            let task = service.claim(&id, user.as_deref()).await?;
            let message = match &task.assignee {
                Some(assignee) => format!("Task {} claimed by {assignee}", task.id),
                None => format!("Task {} released", task.id),
            };
            output(&updated(message), json_mode);
        }
        TaskCommands::Delegate { id, user } => {
            service.delegate_task(&id, &user).await?;
            output(&updated(format!("Task {id} delegated to {user}")), json_mode);
        }
        TaskCommands::Resolve { id } => {
            service.resolve_task(&id).await?;
            output(&updated(format!("Task {id} resolved")), json_mode);
        }
        TaskCommands::Complete {
            id,
            vars,
            destination,
            reason,
            actor,
        } => {
            let mut options = CompleteOptions::new().variables(parse_variables(&vars)?);
            options.destination_key = destination;
            options.note.reason = reason;
            options.actor = actor;
            let outcome = service.complete(&id, &options).await?;
            let message = if outcome.ended {
                format!("Task {id} completed, process instance ended")
            } else {
                format!("Task {id} completed")
            };
            output(
                &TaskUpdateOutput {
                    message,
                    new_task_ids: outcome.new_task_ids,
                },
                json_mode,
            );
        }
        TaskCommands::Targets { id } => {
            output(&service.find_rejected_node(&id).await?, json_mode);
        }
        TaskCommands::Reject {
            id,
            to,
            path,
            return_to_reject,
            reason,
            vars,
            actor,
        } => {
            let mut options = RejectOptions::new().return_to_reject(return_to_reject);
            options.variables = parse_variables(&vars)?;
            options.note.reason = reason;
            options.actor = actor;
            if path {
                options = options.reject_type(RejectType::PriorPath);
            }
            let outcome = match to {
                Some(node) => service.reject_to_task(&id, &options.destination(node)).await?,
                None => service.reject_to_pre_task(&id, &options).await?,
            };
            output(&routed(outcome, "Rejected")?, json_mode);
        }
        TaskCommands::Withdraw { id, caller, to, reason } => {
            let mut options = WithdrawOptions::new();
            options.destination_key = to;
            options.note.reason = reason;
            let outcome = service.withdraw_task(&id, &caller, &options).await?;
            output(&routed(outcome, "Withdrawn")?, json_mode);
        }
        TaskCommands::Comment { id, message, user } => {
            let task = service
                .get_task(&id)
                .await?
                .ok_or_else(|| DomainError::TaskNotFound(id.clone()))?;
            let comment = service
                .add_comment(Some(&task.id), task.process_instance_id.as_deref(), user.as_deref(), &message)
                .await?;
            output(&updated(format!("Comment {} added", comment.id)), json_mode);
        }
        TaskCommands::SetVar { id, vars, local } => {
            let variables = parse_variables(&vars)?;
            if local {
                service.set_variables_local(&id, &variables).await?;
            } else {
                service.set_variables(&id, &variables).await?;
            }
            output(&updated(format!("{} variable(s) set", variables.len())), json_mode);
        }
        TaskCommands::Delete { ids, cascade, reason } => {
            let deleted = service.delete_tasks(&ids, cascade, reason.as_deref()).await?;
            output(&updated(format!("{deleted} task(s) deleted")), json_mode);
        }
    }
    Ok(())
}
