//! SQLite implementation of the IdentityLinkRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Identity, IdentityLink, IdentityLinkType};
use crate::domain::ports::IdentityLinkRepository;

#[derive(Clone)]
pub struct SqliteIdentityLinkRepository {
    pool: SqlitePool,
}

impl SqliteIdentityLinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) const INSERT_IDENTITY_LINK: &str = r#"INSERT INTO identity_links
    (id, task_id, process_instance_id, user_id, group_id, link_type)
    VALUES (?, ?, ?, ?, ?, ?)"#;

#[async_trait]
impl IdentityLinkRepository for SqliteIdentityLinkRepository {
    async fn add(&self, link: &IdentityLink) -> DomainResult<()> {
        link.validate()?;
        sqlx::query(INSERT_IDENTITY_LINK)
            .bind(&link.id)
            .bind(&link.task_id)
            .bind(&link.process_instance_id)
            .bind(&link.user_id)
            .bind(&link.group_id)
            .bind(link.link_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_task(&self, task_id: &str, identity: &Identity, link_type: &IdentityLinkType) -> DomainResult<u64> {
        let (column, value) = match identity {
            Identity::User(user) => ("user_id", user),
            Identity::Group(group) => ("group_id", group),
        };
        let sql = format!("DELETE FROM identity_links WHERE task_id = ? AND {column} = ? AND link_type = ?");
        let result = sqlx::query(&sql)
            .bind(task_id)
            .bind(value)
            .bind(link_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_task(&self, task_id: &str) -> DomainResult<Vec<IdentityLink>> {
        let rows: Vec<IdentityLinkRow> = sqlx::query_as("SELECT * FROM identity_links WHERE task_id = ? ORDER BY rowid")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(IdentityLink::from).collect())
    }

    async fn list_for_process_instance(&self, process_instance_id: &str) -> DomainResult<Vec<IdentityLink>> {
        let rows: Vec<IdentityLinkRow> =
            sqlx::query_as("SELECT * FROM identity_links WHERE process_instance_id = ? ORDER BY rowid")
                .bind(process_instance_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(IdentityLink::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct IdentityLinkRow {
    id: String,
    task_id: Option<String>,
    process_instance_id: Option<String>,
    user_id: Option<String>,
    group_id: Option<String>,
    link_type: String,
}

impl From<IdentityLinkRow> for IdentityLink {
    fn from(row: IdentityLinkRow) -> Self {
        IdentityLink {
            id: row.id,
            task_id: row.task_id,
            process_instance_id: row.process_instance_id,
            user_id: row.user_id,
            group_id: row.group_id,
            link_type: IdentityLinkType::parse(&row.link_type),
        }
    }
}
