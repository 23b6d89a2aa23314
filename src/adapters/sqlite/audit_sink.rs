//! SQLite audit sink backed by the `task_events` table.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool};

use crate::adapters::sqlite::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditEntry, TaskAction};
use crate::domain::ports::AuditSink;

#[derive(Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Insert an audit entry on any executor, so transitions can append inside their transaction.
pub(crate) async fn insert_entry<'e, E>(executor: E, entry: &AuditEntry) -> DomainResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO task_events
           (id, actor_id, task_id, process_instance_id, action, reason, business_op, business_remark, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&entry.id)
    .bind(&entry.actor_id)
    .bind(&entry.task_id)
    .bind(&entry.process_instance_id)
    .bind(entry.action.as_str())
    .bind(&entry.reason)
    .bind(&entry.business_op)
    .bind(&entry.business_remark)
    .bind(format_datetime(&entry.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, entry: &AuditEntry) -> DomainResult<()> {
        insert_entry(&self.pool, entry).await
    }

    async fn task_events(&self, task_id: &str) -> DomainResult<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as("SELECT * FROM task_events WHERE task_id = ? ORDER BY created_at, rowid")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    actor_id: Option<String>,
    task_id: String,
    process_instance_id: Option<String>,
    action: String,
    reason: Option<String>,
    business_op: Option<String>,
    business_remark: Option<String>,
    created_at: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DomainError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = TaskAction::from_str(&row.action)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid task action: {}", row.action)))?;
        Ok(AuditEntry {
            id: row.id,
            actor_id: row.actor_id,
            task_id: row.task_id,
            process_instance_id: row.process_instance_id,
            action,
            reason: row.reason,
            business_op: row.business_op,
            business_remark: row.business_remark,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_events_are_returned_in_order() {
        let sink = SqliteAuditSink::new(create_migrated_test_pool().await.unwrap());
        sink.record(&AuditEntry::new("t1", None, TaskAction::Claimed).by(Some("kermit")))
            .await
            .unwrap();
        sink.record(
            &AuditEntry::new("t1", None, TaskAction::Rejected).with_reason(Some("incomplete"), Some("back"), None),
        )
        .await
        .unwrap();

        let events = sink.task_events("t1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, TaskAction::Claimed);
        assert_eq!(events[1].reason.as_deref(), Some("incomplete"));
        assert!(sink.task_events("t2").await.unwrap().is_empty());
    }
}
