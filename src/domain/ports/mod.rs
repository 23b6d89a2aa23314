//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these traits:
//! - repositories: read access to tasks, executions, variables, copy tasks, links and comments
//! - `ChangeSetStore`: the single atomic write path of a transition
//! - `ProcessGraph`: deployed process definitions
//! - `IdentityDirectory` and `AuditSink`: identity lookups and the audit trail

pub mod audit_sink;
pub mod change_set;
pub mod comment_repository;
pub mod copy_task_repository;
pub mod execution_repository;
pub mod identity;
pub mod identity_link_repository;
pub mod process_graph;
pub mod task_repository;
pub mod variable_repository;

pub use audit_sink::AuditSink;
pub use change_set::{ChangeSet, ChangeSetStore, InstanceWrite, TaskClosure, TaskDeletion};
pub use comment_repository::CommentRepository;
pub use copy_task_repository::CopyTaskRepository;
pub use execution_repository::ExecutionRepository;
pub use identity::{IdentityDirectory, WithdrawRequest};
pub use identity_link_repository::IdentityLinkRepository;
pub use process_graph::ProcessGraph;
pub use task_repository::TaskRepository;
pub use variable_repository::VariableRepository;
