//! Atomic commit of a transition's change set.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::adapters::sqlite::audit_sink::insert_entry;
use crate::adapters::sqlite::format_datetime;
use crate::adapters::sqlite::identity_link_repository::INSERT_IDENTITY_LINK;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityRecord, Execution, IdentityLink, Task, TaskOutcome, VariableWrite};
use crate::domain::ports::{ChangeSet, ChangeSetStore, InstanceWrite, TaskClosure, TaskDeletion};

#[derive(Clone)]
pub struct SqliteChangeSetStore {
    pool: SqlitePool,
}

impl SqliteChangeSetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeSetStore for SqliteChangeSetStore {
    async fn commit(&self, changes: ChangeSet) -> DomainResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        if let Some(instance) = &changes.instance {
            write_instance(&mut tx, instance).await?;
        }
        for execution in &changes.executions {
            upsert_execution(&mut tx, execution).await?;
        }
        for record in &changes.activity_records {
            upsert_record(&mut tx, record).await?;
        }
        for task in &changes.new_tasks {
            insert_task(&mut tx, task).await?;
        }
        for task in &changes.updated_tasks {
            update_task(&mut tx, task).await?;
        }
        for closure in &changes.closed_tasks {
            close_task(&mut tx, closure).await?;
        }
        for write in &changes.variables {
            write_variable(&mut tx, write).await?;
        }
        for execution_id in &changes.removed_executions {
            remove_execution(&mut tx, execution_id).await?;
        }
        for deletion in &changes.deleted_tasks {
            delete_task(&mut tx, deletion).await?;
        }
        for link in &changes.identity_links {
            insert_link(&mut tx, link).await?;
        }
        for entry in &changes.audit {
            insert_entry(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn write_instance(conn: &mut SqliteConnection, write: &InstanceWrite) -> DomainResult<()> {
    match write {
        InstanceWrite::Insert(instance) => {
            sqlx::query(
                r#"INSERT INTO process_instances
                   (id, definition_id, definition_key, business_key, starter, started_at, ended_at, version)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&instance.id)
            .bind(&instance.definition_id)
            .bind(&instance.definition_key)
            .bind(&instance.business_key)
            .bind(&instance.starter)
            .bind(format_datetime(&instance.started_at))
            .bind(instance.ended_at.as_ref().map(format_datetime))
            .bind(i64::try_from(instance.version).unwrap_or_default())
            .execute(&mut *conn)
            .await?;
        }
        InstanceWrite::Touch {
            id,
            expected_version,
            ended_at,
        } => {
            let result = sqlx::query(
                r#"UPDATE process_instances SET version = version + 1, ended_at = COALESCE(?, ended_at)
                   WHERE id = ? AND version = ?"#,
            )
            .bind(ended_at.as_ref().map(format_datetime))
            .bind(id)
            .bind(i64::try_from(*expected_version).unwrap_or_default())
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                if row_exists(conn, "process_instances", id).await? {
                    return Err(DomainError::conflict("process instance", id));
                }
                return Err(DomainError::ProcessInstanceNotFound(id.clone()));
            }
        }
    }
    Ok(())
}

async fn upsert_execution(conn: &mut SqliteConnection, execution: &Execution) -> DomainResult<()> {
    let multi_instance = execution
        .multi_instance
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(
        r#"INSERT OR REPLACE INTO executions
           (id, process_instance_id, parent_id, node_key, is_active, is_concurrent, multi_instance,
            activity_record_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&execution.id)
    .bind(&execution.process_instance_id)
    .bind(&execution.parent_id)
    .bind(&execution.node_key)
    .bind(execution.is_active)
    .bind(execution.is_concurrent)
    .bind(multi_instance)
    .bind(&execution.activity_record_id)
    .bind(format_datetime(&execution.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn remove_execution(conn: &mut SqliteConnection, execution_id: &str) -> DomainResult<()> {
    sqlx::query("DELETE FROM executions WHERE id = ?")
        .bind(execution_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM variables WHERE scope_type = 'execution' AND scope_id = ?")
        .bind(execution_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn upsert_record(conn: &mut SqliteConnection, record: &ActivityRecord) -> DomainResult<()> {
    sqlx::query(
        r#"INSERT OR REPLACE INTO activity_records
           (id, process_instance_id, execution_id, node_key, node_kind, from_node_key, from_records,
            previous_task_id, previous_task_node, started_at, ended_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&record.id)
    .bind(&record.process_instance_id)
    .bind(&record.execution_id)
    .bind(&record.node_key)
    .bind(record.node_kind.as_str())
    .bind(&record.from_node_key)
    .bind(serde_json::to_string(&record.from_records)?)
    .bind(&record.previous_task_id)
    .bind(&record.previous_task_node)
    .bind(format_datetime(&record.started_at))
    .bind(record.ended_at.as_ref().map(format_datetime))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_task(conn: &mut SqliteConnection, task: &Task) -> DomainResult<()> {
    task.validate()?;
    sqlx::query(
        r#"INSERT INTO tasks (id, name, description, assignee, owner, delegation_state, priority,
           created_at, due_date, parent_task_id, process_definition_id, process_definition_key,
           process_instance_id, execution_id, node_key, activity_instance_id, return_to, version)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&task.id)
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.assignee)
    .bind(&task.owner)
    .bind(task.delegation_state.as_str())
    .bind(task.priority)
    .bind(format_datetime(&task.created_at))
    .bind(task.due_date.as_ref().map(format_datetime))
    .bind(&task.parent_task_id)
    .bind(&task.process_definition_id)
    .bind(&task.process_definition_key)
    .bind(&task.process_instance_id)
    .bind(&task.execution_id)
    .bind(&task.node_key)
    .bind(&task.activity_instance_id)
    .bind(&task.return_to)
    .bind(i64::try_from(task.version).unwrap_or_default())
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"INSERT OR REPLACE INTO historic_tasks (id, name, process_instance_id, execution_id, node_key,
           assignee, owner, start_time, end_time, outcome, delete_reason, activity_instance_id)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, ?)"#,
    )
    .bind(&task.id)
    .bind(&task.name)
    .bind(&task.process_instance_id)
    .bind(&task.execution_id)
    .bind(&task.node_key)
    .bind(&task.assignee)
    .bind(&task.owner)
    .bind(format_datetime(&task.created_at))
    .bind(&task.activity_instance_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_task(conn: &mut SqliteConnection, task: &Task) -> DomainResult<()> {
    task.validate()?;
    let result = sqlx::query(
        r#"UPDATE tasks SET name = ?, description = ?, assignee = ?, owner = ?, delegation_state = ?,
           priority = ?, due_date = ?, parent_task_id = ?, return_to = ?, version = version + 1
           WHERE id = ? AND version = ?"#,
    )
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.assignee)
    .bind(&task.owner)
    .bind(task.delegation_state.as_str())
    .bind(task.priority)
    .bind(task.due_date.as_ref().map(format_datetime))
    .bind(&task.parent_task_id)
    .bind(&task.return_to)
    .bind(&task.id)
    .bind(i64::try_from(task.version).unwrap_or_default())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(stale_task(conn, &task.id).await?);
    }

    sqlx::query("UPDATE historic_tasks SET name = ?, assignee = ?, owner = ? WHERE id = ?")
        .bind(&task.name)
        .bind(&task.assignee)
        .bind(&task.owner)
        .bind(&task.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn close_task(conn: &mut SqliteConnection, closure: &TaskClosure) -> DomainResult<()> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND version = ?")
        .bind(&closure.task_id)
        .bind(i64::try_from(closure.expected_version).unwrap_or_default())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(stale_task(conn, &closure.task_id).await?);
    }

    sqlx::query("UPDATE historic_tasks SET end_time = ?, outcome = ?, delete_reason = ? WHERE id = ?")
        .bind(format_datetime(&closure.ended_at))
        .bind(closure.outcome.as_str())
        .bind(&closure.reason)
        .bind(&closure.task_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM identity_links WHERE task_id = ?")
        .bind(&closure.task_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn delete_task(conn: &mut SqliteConnection, deletion: &TaskDeletion) -> DomainResult<()> {
    let id = deletion.task_id.as_str();
    let removed = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    for sql in [
        "DELETE FROM identity_links WHERE task_id = ?",
        "DELETE FROM variables WHERE scope_type = 'task' AND scope_id = ?",
    ] {
        sqlx::query(sql).bind(id).execute(&mut *conn).await?;
    }

    if deletion.cascade {
        for sql in [
            "DELETE FROM historic_tasks WHERE id = ?",
            "DELETE FROM comments WHERE task_id = ?",
            "DELETE FROM attachments WHERE task_id = ?",
            "DELETE FROM task_events WHERE task_id = ?",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *conn).await?;
        }
    } else if removed > 0 {
        sqlx::query("UPDATE historic_tasks SET end_time = ?, outcome = ?, delete_reason = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(TaskOutcome::Deleted.as_str())
            .bind(&deletion.reason)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_variable(conn: &mut SqliteConnection, write: &VariableWrite) -> DomainResult<()> {
    match &write.value {
        Some(value) => {
            sqlx::query(
                r#"INSERT INTO variables (scope_type, scope_id, name, value, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(scope_type, scope_id, name)
                   DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
            )
            .bind(write.scope.scope_type())
            .bind(write.scope.id())
            .bind(&write.name)
            .bind(serde_json::to_string(value)?)
            .bind(format_datetime(&Utc::now()))
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM variables WHERE scope_type = ? AND scope_id = ? AND name = ?")
                .bind(write.scope.scope_type())
                .bind(write.scope.id())
                .bind(&write.name)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn insert_link(conn: &mut SqliteConnection, link: &IdentityLink) -> DomainResult<()> {
    link.validate()?;
    sqlx::query(INSERT_IDENTITY_LINK)
        .bind(&link.id)
        .bind(&link.task_id)
        .bind(&link.process_instance_id)
        .bind(&link.user_id)
        .bind(&link.group_id)
        .bind(link.link_type.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn row_exists(conn: &mut SqliteConnection, table: &str, id: &str) -> DomainResult<bool> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?");
    let (count,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Classify a failed compare-and-set on a task row.
async fn stale_task(conn: &mut SqliteConnection, task_id: &str) -> DomainResult<DomainError> {
    if row_exists(conn, "tasks", task_id).await? {
        Ok(DomainError::conflict("task", task_id))
    } else {
        Ok(DomainError::TaskNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::ports::TaskRepository;

    async fn setup() -> (SqliteChangeSetStore, SqliteTaskRepository) {
        let pool = create_migrated_test_pool().await.unwrap();
        (SqliteChangeSetStore::new(pool.clone()), SqliteTaskRepository::new(pool))
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict_and_rolls_back() {
        let (store, repo) = setup().await;
        let task = Task::new(Some("t1".into())).with_name("Review");
        store
            .commit(ChangeSet {
                new_tasks: vec![task.clone()],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let mut first = task.clone();
        first.assignee = Some("kermit".into());
        store
            .commit(ChangeSet {
                updated_tasks: vec![first],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let mut stale = task.clone();
        stale.assignee = Some("gonzo".into());
        let result = store
            .commit(ChangeSet {
                updated_tasks: vec![stale],
                variables: vec![VariableWrite::set(
                    crate::domain::models::ScopeRef::Task("t1".into()),
                    "leaked",
                    true.into(),
                )],
                ..ChangeSet::default()
            })
            .await;
        assert!(matches!(result, Err(DomainError::ConcurrencyConflict { .. })));

        let loaded = repo.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.assignee.as_deref(), Some("kermit"));
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_closure_keeps_history_with_outcome() {
        let (store, repo) = setup().await;
        let task = Task::new(Some("t1".into())).with_name("Review").with_assignee("kermit");
        store
            .commit(ChangeSet {
                new_tasks: vec![task],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        store
            .commit(ChangeSet {
                closed_tasks: vec![TaskClosure {
                    task_id: "t1".into(),
                    expected_version: 0,
                    outcome: TaskOutcome::Rejected,
                    reason: Some("missing receipts".into()),
                    ended_at: Utc::now(),
                }],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        assert!(repo.get("t1").await.unwrap().is_none());
        let historic = repo.get_historic("t1").await.unwrap().unwrap();
        assert_eq!(historic.outcome, Some(TaskOutcome::Rejected));
        assert_eq!(historic.assignee.as_deref(), Some("kermit"));
        assert!(historic.is_finished());
    }

    #[tokio::test]
    async fn test_closing_missing_task_is_not_found() {
        let (store, _) = setup().await;
        let result = store
            .commit(ChangeSet {
                closed_tasks: vec![TaskClosure {
                    task_id: "ghost".into(),
                    expected_version: 0,
                    outcome: TaskOutcome::Completed,
                    reason: None,
                    ended_at: Utc::now(),
                }],
                ..ChangeSet::default()
            })
            .await;
        assert!(matches!(result, Err(DomainError::TaskNotFound(_))));
    }
}
