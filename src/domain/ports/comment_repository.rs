use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Attachment, Comment};

/// Comments and attachments kept alongside tasks.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn add_comment(&self, comment: &Comment) -> DomainResult<()>;

    async fn task_comments(&self, task_id: &str) -> DomainResult<Vec<Comment>>;

    async fn process_instance_comments(&self, process_instance_id: &str) -> DomainResult<Vec<Comment>>;

    async fn insert_attachment(&self, attachment: &Attachment, content: Option<&[u8]>) -> DomainResult<()>;

    /// Update name and description; returns `false` when the attachment is unknown
    async fn update_attachment(&self, attachment: &Attachment) -> DomainResult<bool>;

    async fn get_attachment(&self, id: &str) -> DomainResult<Option<Attachment>>;

    async fn get_attachment_content(&self, id: &str) -> DomainResult<Option<Vec<u8>>>;

    async fn task_attachments(&self, task_id: &str) -> DomainResult<Vec<Attachment>>;

    async fn process_instance_attachments(&self, process_instance_id: &str) -> DomainResult<Vec<Attachment>>;

    async fn delete_attachment(&self, id: &str) -> DomainResult<bool>;
}
