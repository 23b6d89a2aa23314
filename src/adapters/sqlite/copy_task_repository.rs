//! SQLite implementation of the CopyTaskRepository.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool};

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_datetime, to_offset, to_total};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CopyTask, CopyTaskQuery, CopyTaskRead, Page, PageRequest};
use crate::domain::ports::CopyTaskRepository;

const INSERT_COPY_TASK: &str = r#"INSERT OR IGNORE INTO copy_tasks
    (id, activity_instance_id, node_key, node_name, recipient, process_definition_key,
     process_instance_id, business_key, is_read, read_at, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

#[derive(Clone)]
pub struct SqliteCopyTaskRepository {
    pool: SqlitePool,
}

impl SqliteCopyTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn bind_copy_task<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    copy_task: &'q CopyTask,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&copy_task.id)
        .bind(&copy_task.activity_instance_id)
        .bind(&copy_task.node_key)
        .bind(&copy_task.node_name)
        .bind(&copy_task.recipient)
        .bind(&copy_task.process_definition_key)
        .bind(&copy_task.process_instance_id)
        .bind(&copy_task.business_key)
        .bind(copy_task.is_read)
        .bind(copy_task.read_at.as_ref().map(format_datetime))
        .bind(format_datetime(&copy_task.created_at))
}

/// Build the WHERE clause shared by the listing queries.
fn filter_clause(base: &str, user_column: &str, query: &CopyTaskQuery) -> (String, Vec<String>) {
    let mut clause = String::from(base);
    let mut bindings = Vec::new();
    if let Some(user) = &query.user {
        clause.push_str(&format!(" AND {user_column} = ?"));
        bindings.push(user.clone());
    }
    if let Some(key) = &query.process_definition_key {
        clause.push_str(" AND process_definition_key = ?");
        bindings.push(key.clone());
    }
    if let Some(business_key) = &query.business_key {
        clause.push_str(" AND business_key = ?");
        bindings.push(business_key.clone());
    }
    (clause, bindings)
}

impl SqliteCopyTaskRepository {
    async fn count(&self, sql: &str, bindings: &[String]) -> DomainResult<u64> {
        let mut q = sqlx::query_as::<_, (i64,)>(sql);
        for binding in bindings {
            q = q.bind(binding);
        }
        let (count,) = q.fetch_one(&self.pool).await?;
        Ok(to_total(count))
    }

    async fn page_of_reads(&self, where_clause: &str, bindings: &[String], page: PageRequest) -> DomainResult<Page<CopyTaskRead>> {
        let total = self
            .count(&format!("SELECT COUNT(*) FROM copy_task_reads WHERE {where_clause}"), bindings)
            .await?;
        let sql = format!("SELECT * FROM copy_task_reads WHERE {where_clause} ORDER BY read_at ASC, rowid ASC LIMIT ? OFFSET ?");
        let mut q = sqlx::query_as::<_, CopyTaskReadRow>(&sql);
        for binding in bindings {
            q = q.bind(binding);
        }
        let rows = q
            .bind(i64::from(page.size))
            .bind(to_offset(page.offset))
            .fetch_all(&self.pool)
            .await?;
        let items = rows.into_iter().map(CopyTaskRead::try_from).collect::<DomainResult<Vec<_>>>()?;
        Ok(Page { items, total })
    }
}

#[async_trait]
impl CopyTaskRepository for SqliteCopyTaskRepository {
    async fn insert_batch(&self, copy_tasks: &[CopyTask]) -> DomainResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for copy_task in copy_tasks {
            inserted += bind_copy_task(sqlx::query(INSERT_COPY_TASK), copy_task)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert(&self, copy_task: &CopyTask) -> DomainResult<bool> {
        let result = bind_copy_task(sqlx::query(INSERT_COPY_TASK), copy_task)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: &str) -> DomainResult<Option<CopyTask>> {
        let row: Option<CopyTaskRow> = sqlx::query_as("SELECT * FROM copy_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CopyTask::try_from).transpose()
    }

    async fn mark_read(&self, read: &CopyTaskRead) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let read_at = format_datetime(&read.read_at);

        let result = sqlx::query("UPDATE copy_tasks SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0")
            .bind(&read_at)
            .bind(&read.copy_task_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"INSERT INTO copy_task_reads
               (id, copy_task_id, activity_instance_id, reader, reader_name, node_key, node_name,
                process_definition_key, process_instance_id, business_key, read_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&read.id)
        .bind(&read.copy_task_id)
        .bind(&read.activity_instance_id)
        .bind(&read.reader)
        .bind(&read.reader_name)
        .bind(&read.node_key)
        .bind(&read.node_name)
        .bind(&read.process_definition_key)
        .bind(&read.process_instance_id)
        .bind(&read.business_key)
        .bind(&read_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_unread(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTask>> {
        let (where_clause, bindings) = filter_clause("is_read = 0", "recipient", query);
        let total = self
            .count(&format!("SELECT COUNT(*) FROM copy_tasks WHERE {where_clause}"), &bindings)
            .await?;

        let sql = format!(
            "SELECT * FROM copy_tasks WHERE {where_clause} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        );
        let mut q = sqlx::query_as::<_, CopyTaskRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q
            .bind(i64::from(page.size))
            .bind(to_offset(page.offset))
            .fetch_all(&self.pool)
            .await?;
        let items = rows.into_iter().map(CopyTask::try_from).collect::<DomainResult<Vec<_>>>()?;
        Ok(Page { items, total })
    }

    async fn list_reads(&self, query: &CopyTaskQuery, page: PageRequest) -> DomainResult<Page<CopyTaskRead>> {
        let (where_clause, bindings) = filter_clause("1=1", "reader", query);
        self.page_of_reads(&where_clause, &bindings, page).await
    }

    async fn reads_for_activity(&self, activity_instance_id: &str, page: PageRequest) -> DomainResult<Page<CopyTaskRead>> {
        self.page_of_reads("activity_instance_id = ?", &[activity_instance_id.to_string()], page)
            .await
    }

    async fn list_for_activity(&self, activity_instance_id: &str) -> DomainResult<Vec<CopyTask>> {
        let rows: Vec<CopyTaskRow> =
            sqlx::query_as("SELECT * FROM copy_tasks WHERE activity_instance_id = ? ORDER BY recipient")
                .bind(activity_instance_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(CopyTask::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CopyTaskRow {
    id: String,
    activity_instance_id: String,
    node_key: String,
    node_name: String,
    recipient: String,
    process_definition_key: String,
    process_instance_id: String,
    business_key: Option<String>,
    is_read: bool,
    read_at: Option<String>,
    created_at: String,
}

impl TryFrom<CopyTaskRow> for CopyTask {
    type Error = DomainError;

    fn try_from(row: CopyTaskRow) -> Result<Self, Self::Error> {
        Ok(CopyTask {
            id: row.id,
            activity_instance_id: row.activity_instance_id,
            node_key: row.node_key,
            node_name: row.node_name,
            recipient: row.recipient,
            process_definition_key: row.process_definition_key,
            process_instance_id: row.process_instance_id,
            business_key: row.business_key,
            is_read: row.is_read,
            read_at: parse_optional_datetime(row.read_at)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CopyTaskReadRow {
    id: String,
    copy_task_id: String,
    activity_instance_id: String,
    reader: String,
    reader_name: String,
    node_key: String,
    node_name: String,
    process_definition_key: String,
    process_instance_id: String,
    business_key: Option<String>,
    read_at: String,
}

impl TryFrom<CopyTaskReadRow> for CopyTaskRead {
    type Error = DomainError;

    fn try_from(row: CopyTaskReadRow) -> Result<Self, Self::Error> {
        Ok(CopyTaskRead {
            id: row.id,
            copy_task_id: row.copy_task_id,
            activity_instance_id: row.activity_instance_id,
            reader: row.reader,
            reader_name: row.reader_name,
            node_key: row.node_key,
            node_name: row.node_name,
            process_definition_key: row.process_definition_key,
            process_instance_id: row.process_instance_id,
            business_key: row.business_key,
            read_at: parse_datetime(&row.read_at)?,
        })
    }
}
