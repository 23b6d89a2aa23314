//! Fixtures shared by the service unit tests.

use std::sync::Arc;

use crate::adapters::memory::{InMemoryProcessRegistry, StaticIdentityDirectory};
use crate::adapters::sqlite::create_migrated_test_pool;
use crate::domain::models::{Config, MultiInstanceMode, ProcessDefinition, ProcessDefinitionBuilder, VariableMap};
use crate::services::context::EngineContext;
use crate::services::runtime_service::RuntimeService;
use crate::services::token_driver::TransitionOutcome;

pub struct TestEngine {
    pub ctx: EngineContext,
}

impl TestEngine {
    pub async fn start(&self, key: &str, business_key: Option<&str>) -> TransitionOutcome {
        self.start_with(key, business_key, &VariableMap::new()).await
    }

    pub async fn start_with(&self, key: &str, business_key: Option<&str>, variables: &VariableMap) -> TransitionOutcome {
        RuntimeService::new(self.ctx.clone())
            .start_process_instance_by_key(key, business_key, variables, Some("kermit"))
            .await
            .unwrap()
    }
}

pub fn directory() -> StaticIdentityDirectory {
    StaticIdentityDirectory::new()
        .user("kermit", "Kermit")
        .user("piggy", "Miss Piggy")
        .user("gonzo", "Gonzo")
        .user("fozzie", "Fozzie")
        .group("reviewers", &["kermit", "piggy"])
        .admin("admin")
}

pub async fn engine(definitions: Vec<ProcessDefinition>) -> TestEngine {
    let pool = create_migrated_test_pool().await.unwrap();
    let registry = Arc::new(InMemoryProcessRegistry::new());
    for definition in definitions {
        registry.deploy(definition).unwrap();
    }
    let ctx = EngineContext::sqlite(pool, registry, Arc::new(directory()), Config::default());
    TestEngine { ctx }
}

/// start -> a -> b -> c -> end
pub fn linear_definition() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("linear")
        .start_event("start")
        .user_task("a", "A")
        .user_task("b", "B")
        .user_task("c", "C")
        .end_event("end")
        .flow("start", "a")
        .flow("a", "b")
        .flow("b", "c")
        .flow("c", "end")
        .build()
        .unwrap()
}

/// a, then b only when `approved`, joined again before d.
pub fn merge_definition() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("merge")
        .start_event("start")
        .user_task("a", "A")
        .exclusive_gateway("split")
        .user_task("b", "B")
        .exclusive_gateway("merge")
        .user_task("d", "D")
        .end_event("end")
        .flow("start", "a")
        .flow("a", "split")
        .conditional_flow("split", "b", "${approved}")
        .default_flow("split", "merge")
        .flow("b", "merge")
        .flow("merge", "d")
        .flow("d", "end")
        .build()
        .unwrap()
}

/// a, then a copy to gonzo and the reviewers group at `notify`.
pub fn broadcast_definition() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("broadcast")
        .start_event("start")
        .user_task("a", "A")
        .user_task("notify", "Notify")
        .copy_to(&["gonzo"], &["reviewers"])
        .end_event("end")
        .flow("start", "a")
        .flow("a", "notify")
        .flow("notify", "end")
        .build()
        .unwrap()
}

/// a, then b and c in parallel, joined before d.
pub fn parallel_definition() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("parallel")
        .start_event("start")
        .user_task("a", "A")
        .parallel_gateway("fork")
        .user_task("b", "B")
        .user_task("c", "C")
        .parallel_gateway("join")
        .user_task("d", "D")
        .end_event("end")
        .flow("start", "a")
        .flow("a", "fork")
        .flow("fork", "b")
        .flow("fork", "c")
        .flow("b", "join")
        .flow("c", "join")
        .flow("join", "d")
        .flow("d", "end")
        .build()
        .unwrap()
}

/// One `review` task per element of `reviewers`, then `summary`.
pub fn multi_instance_definition(mode: MultiInstanceMode) -> ProcessDefinition {
    ProcessDefinitionBuilder::new("review")
        .start_event("start")
        .user_task("review", "Review")
        .assignee("${reviewer}")
        .multi_instance(mode, "reviewers", "reviewer")
        .user_task("summary", "Summary")
        .end_event("end")
        .flow("start", "review")
        .flow("review", "summary")
        .flow("summary", "end")
        .build()
        .unwrap()
}

/// `prepare`, then the `review` fan-out of [`multi_instance_definition`].
pub fn prepared_review_definition(mode: MultiInstanceMode) -> ProcessDefinition {
    ProcessDefinitionBuilder::new("prepared-review")
        .start_event("start")
        .user_task("prepare", "Prepare")
        .user_task("review", "Review")
        .assignee("${reviewer}")
        .multi_instance(mode, "reviewers", "reviewer")
        .user_task("summary", "Summary")
        .end_event("end")
        .flow("start", "prepare")
        .flow("prepare", "review")
        .flow("review", "summary")
        .flow("summary", "end")
        .build()
        .unwrap()
}
