//! Engine services.
//!
//! Every service works over an [`EngineContext`]; writes of one operation are
//! collected and committed through the change-set store.

pub mod condition;
pub mod context;
pub mod copy_task_service;
pub mod rejection_router;
pub mod retry;
pub mod runtime_service;
pub mod scope_resolver;
pub mod task_lifecycle;
pub mod task_service;
pub mod token_driver;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::EngineContext;
pub use copy_task_service::CopyTaskService;
pub use rejection_router::RejectionRouter;
pub use runtime_service::RuntimeService;
pub use scope_resolver::ScopeChain;
pub use task_lifecycle::TaskLifecycle;
pub use task_service::TaskService;
pub use token_driver::{Broadcast, Transition, TransitionOutcome};
