//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DelegationState, HistoricTask, Task, TaskFilter, TaskOutcome};
use crate::domain::ports::TaskRepository;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn get(&self, id: &str) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list(&self, filter: &TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT t.* FROM tasks t WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(assignee) = &filter.assignee {
            query.push_str(" AND t.assignee = ?");
            bindings.push(assignee.clone());
        }
        if let Some(user) = &filter.candidate_user {
            query.push_str(
                " AND t.assignee IS NULL AND EXISTS (SELECT 1 FROM identity_links l \
                 WHERE l.task_id = t.id AND l.link_type = 'candidate' AND (l.user_id = ?",
            );
            bindings.push(user.clone());
            for group in &filter.candidate_groups {
                query.push_str(" OR l.group_id = ?");
                bindings.push(group.clone());
            }
            query.push_str("))");
        }
        if let Some(instance) = &filter.process_instance_id {
            query.push_str(" AND t.process_instance_id = ?");
            bindings.push(instance.clone());
        }
        if let Some(node_key) = &filter.node_key {
            query.push_str(" AND t.node_key = ?");
            bindings.push(node_key.clone());
        }
        if let Some(parent) = &filter.parent_task_id {
            query.push_str(" AND t.parent_task_id = ?");
            bindings.push(parent.clone());
        }
        if filter.unassigned_only {
            query.push_str(" AND t.assignee IS NULL");
        }

        query.push_str(" ORDER BY t.priority DESC, t.created_at ASC, t.id ASC");

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_by_instance(&self, process_instance_id: &str) -> DomainResult<Vec<Task>> {
        self.list(&TaskFilter {
            process_instance_id: Some(process_instance_id.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn get_sub_tasks(&self, parent_task_id: &str) -> DomainResult<Vec<Task>> {
        self.list(&TaskFilter {
            parent_task_id: Some(parent_task_id.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn get_historic(&self, id: &str) -> DomainResult<Option<HistoricTask>> {
        let row: Option<HistoricTaskRow> = sqlx::query_as("SELECT * FROM historic_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(HistoricTask::try_from).transpose()
    }

    async fn historic_at_node(&self, process_instance_id: &str, node_key: &str) -> DomainResult<Vec<HistoricTask>> {
        let rows: Vec<HistoricTaskRow> = sqlx::query_as(
            r#"SELECT * FROM historic_tasks
               WHERE process_instance_id = ? AND node_key = ?
               ORDER BY start_time DESC, rowid DESC"#,
        )
        .bind(process_instance_id)
        .bind(node_key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoricTask::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    name: String,
    description: Option<String>,
    assignee: Option<String>,
    owner: Option<String>,
    delegation_state: String,
    priority: i64,
    created_at: String,
    due_date: Option<String>,
    parent_task_id: Option<String>,
    process_definition_id: Option<String>,
    process_definition_key: Option<String>,
    process_instance_id: Option<String>,
    execution_id: Option<String>,
    node_key: Option<String>,
    activity_instance_id: Option<String>,
    return_to: Option<String>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let delegation_state = DelegationState::from_str(&row.delegation_state).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid delegation state: {}", row.delegation_state))
        })?;
        let priority = i32::try_from(row.priority)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        Ok(Task {
            id: row.id,
            name: row.name,
            description: row.description,
            assignee: row.assignee,
            owner: row.owner,
            delegation_state,
            priority,
            created_at: parse_datetime(&row.created_at)?,
            due_date: parse_optional_datetime(row.due_date)?,
            parent_task_id: row.parent_task_id,
            process_definition_id: row.process_definition_id,
            process_definition_key: row.process_definition_key,
            process_instance_id: row.process_instance_id,
            execution_id: row.execution_id,
            node_key: row.node_key,
            activity_instance_id: row.activity_instance_id,
            return_to: row.return_to,
            version: u64::try_from(row.version).unwrap_or_default(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoricTaskRow {
    id: String,
    name: String,
    process_instance_id: Option<String>,
    execution_id: Option<String>,
    node_key: Option<String>,
    assignee: Option<String>,
    owner: Option<String>,
    start_time: String,
    end_time: Option<String>,
    outcome: Option<String>,
    delete_reason: Option<String>,
    activity_instance_id: Option<String>,
}

impl TryFrom<HistoricTaskRow> for HistoricTask {
    type Error = DomainError;

    fn try_from(row: HistoricTaskRow) -> Result<Self, Self::Error> {
        let outcome = row
            .outcome
            .map(|s| {
                TaskOutcome::from_str(&s)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid task outcome: {s}")))
            })
            .transpose()?;

        Ok(HistoricTask {
            id: row.id,
            name: row.name,
            process_instance_id: row.process_instance_id,
            execution_id: row.execution_id,
            node_key: row.node_key,
            assignee: row.assignee,
            owner: row.owner,
            start_time: parse_datetime(&row.start_time)?,
            end_time: parse_optional_datetime(row.end_time)?,
            outcome,
            delete_reason: row.delete_reason,
            activity_instance_id: row.activity_instance_id,
        })
    }
}
