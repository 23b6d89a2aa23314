//! SQLite implementation of the CommentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Attachment, Comment};
use crate::domain::ports::CommentRepository;

#[derive(Clone)]
pub struct SqliteCommentRepository {
    pool: SqlitePool,
}

impl SqliteCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn comments_where(&self, column: &str, value: &str) -> DomainResult<Vec<Comment>> {
        let sql = format!("SELECT * FROM comments WHERE {column} = ? ORDER BY created_at, rowid");
        let rows: Vec<CommentRow> = sqlx::query_as(&sql).bind(value).fetch_all(&self.pool).await?;
        rows.into_iter().map(Comment::try_from).collect()
    }

    async fn attachments_where(&self, column: &str, value: &str) -> DomainResult<Vec<Attachment>> {
        let sql = format!(
            "SELECT id, attachment_type, task_id, process_instance_id, name, description, url, created_at \
             FROM attachments WHERE {column} = ? ORDER BY created_at, rowid"
        );
        let rows: Vec<AttachmentRow> = sqlx::query_as(&sql).bind(value).fetch_all(&self.pool).await?;
        rows.into_iter().map(Attachment::try_from).collect()
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn add_comment(&self, comment: &Comment) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, task_id, process_instance_id, user_id, message, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.task_id)
        .bind(&comment.process_instance_id)
        .bind(&comment.user_id)
        .bind(&comment.message)
        .bind(format_datetime(&comment.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn task_comments(&self, task_id: &str) -> DomainResult<Vec<Comment>> {
        self.comments_where("task_id", task_id).await
    }

    async fn process_instance_comments(&self, process_instance_id: &str) -> DomainResult<Vec<Comment>> {
        self.comments_where("process_instance_id", process_instance_id).await
    }

    async fn insert_attachment(&self, attachment: &Attachment, content: Option<&[u8]>) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO attachments
               (id, attachment_type, task_id, process_instance_id, name, description, url, content, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&attachment.id)
        .bind(&attachment.attachment_type)
        .bind(&attachment.task_id)
        .bind(&attachment.process_instance_id)
        .bind(&attachment.name)
        .bind(&attachment.description)
        .bind(&attachment.url)
        .bind(content)
        .bind(format_datetime(&attachment.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_attachment(&self, attachment: &Attachment) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE attachments SET name = ?, description = ? WHERE id = ?")
            .bind(&attachment.name)
            .bind(&attachment.description)
            .bind(&attachment.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_attachment(&self, id: &str) -> DomainResult<Option<Attachment>> {
        let row: Option<AttachmentRow> = sqlx::query_as(
            "SELECT id, attachment_type, task_id, process_instance_id, name, description, url, created_at \
             FROM attachments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attachment::try_from).transpose()
    }

    async fn get_attachment_content(&self, id: &str) -> DomainResult<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as("SELECT content FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(content,)| content))
    }

    async fn task_attachments(&self, task_id: &str) -> DomainResult<Vec<Attachment>> {
        self.attachments_where("task_id", task_id).await
    }

    async fn process_instance_attachments(&self, process_instance_id: &str) -> DomainResult<Vec<Attachment>> {
        self.attachments_where("process_instance_id", process_instance_id).await
    }

    async fn delete_attachment(&self, id: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    task_id: Option<String>,
    process_instance_id: Option<String>,
    user_id: Option<String>,
    message: String,
    created_at: String,
}

impl TryFrom<CommentRow> for Comment {
    type Error = DomainError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: row.id,
            task_id: row.task_id,
            process_instance_id: row.process_instance_id,
            user_id: row.user_id,
            message: row.message,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: String,
    attachment_type: String,
    task_id: Option<String>,
    process_instance_id: Option<String>,
    name: String,
    description: Option<String>,
    url: Option<String>,
    created_at: String,
}

impl TryFrom<AttachmentRow> for Attachment {
    type Error = DomainError;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        Ok(Attachment {
            id: row.id,
            attachment_type: row.attachment_type,
            task_id: row.task_id,
            process_instance_id: row.process_instance_id,
            name: row.name,
            description: row.description,
            url: row.url,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
