pub mod audit;
pub mod config;
pub mod copy_task;
pub mod execution;
pub mod identity_link;
pub mod options;
pub mod page;
pub mod process;
pub mod task;
pub mod variable;

pub use audit::{Attachment, AttachmentSource, AuditEntry, Comment, TaskAction};
pub use config::{Config, CopyTaskConfig, DatabaseConfig, EngineConfig, LoggingConfig, ProcessesConfig};
pub use copy_task::{BroadcastPoint, CopyTask, CopyTaskQuery, CopyTaskRead, ReadUserNames};
pub use execution::{ActivityRecord, Execution, MultiInstanceState, ProcessInstance};
pub use identity_link::{Identity, IdentityLink, IdentityLinkType};
pub use options::{
    CompleteOptions, RejectOptions, RejectType, RejectionTarget, RoutingFailure, RoutingOutcome,
    TransitionNote, WithdrawOptions,
};
pub use page::{Page, PageRequest};
pub use process::{
    CopySpec, FlowNode, MultiInstanceSpec, NodeKind, ProcessDefinition, ProcessDefinitionBuilder,
    SequenceFlow,
};
pub use task::{
    CompletionOp, DelegationState, HistoricTask, Task, TaskFilter, TaskOutcome, DEFAULT_PRIORITY,
};
pub use variable::{
    multi_instance_mode_variable, MultiInstanceMode, ScopeRef, VariableMap, VariableValue,
    VariableWrite, LOOP_COUNTER_VARIABLE, RETURN_TO_REJECT_VARIABLE,
};
