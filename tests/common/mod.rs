//! Common test utilities for integration tests
//!
//! Provides a migrated in-memory engine with a small identity directory and
//! the process definitions the scenarios run against.

#![allow(dead_code)]

use std::sync::Arc;

use procflow::adapters::memory::{InMemoryProcessRegistry, StaticIdentityDirectory};
use procflow::adapters::sqlite::create_migrated_test_pool;
use procflow::domain::models::{
    Config, MultiInstanceMode, ProcessDefinition, ProcessDefinitionBuilder, Task, TaskFilter, VariableMap,
};
use procflow::services::{EngineContext, RuntimeService, TaskService};

/// Engine wired against an in-memory SQLite database.
pub struct TestEngine {
    pub ctx: EngineContext,
    pub tasks: TaskService,
    pub runtime: RuntimeService,
}

impl TestEngine {
    /// Start `key` as kermit and return the id of its first task.
    pub async fn start(&self, key: &str, business_key: Option<&str>) -> (String, String) {
        self.start_with(key, business_key, &VariableMap::new()).await
    }

    pub async fn start_with(&self, key: &str, business_key: Option<&str>, variables: &VariableMap) -> (String, String) {
        let outcome = self
            .runtime
            .start_process_instance_by_key(key, business_key, variables, Some("kermit"))
            .await
            .expect("process should start");
        let first = outcome.new_task_ids.first().cloned().expect("process should create a task");
        (outcome.process_instance_id, first)
    }

    /// Live tasks of an instance.
    pub async fn live_tasks(&self, process_instance_id: &str) -> Vec<Task> {
        self.tasks
            .list_tasks(&TaskFilter {
                process_instance_id: Some(process_instance_id.to_string()),
                ..TaskFilter::default()
            })
            .await
            .expect("task query should succeed")
    }

    /// The single live task of an instance at `node_key`.
    pub async fn task_at(&self, process_instance_id: &str, node_key: &str) -> Task {
        let tasks: Vec<Task> = self
            .live_tasks(process_instance_id)
            .await
            .into_iter()
            .filter(|task| task.node_key.as_deref() == Some(node_key))
            .collect();
        assert_eq!(tasks.len(), 1, "expected one live task at {node_key}");
        tasks.into_iter().next().expect("checked above")
    }
}

pub fn directory() -> StaticIdentityDirectory {
    StaticIdentityDirectory::new()
        .user("kermit", "Kermit")
        .user("piggy", "Miss Piggy")
        .user("gonzo", "Gonzo")
        .user("fozzie", "Fozzie")
        .user("animal", "Animal")
        .group("reviewers", &["kermit", "piggy"])
        .group("band", &["animal", "fozzie", "gonzo"])
        .admin("admin")
}

/// Build an engine with `definitions` deployed.
pub async fn engine(definitions: Vec<ProcessDefinition>) -> TestEngine {
    let pool = create_migrated_test_pool().await.expect("test pool should migrate");
    let registry = Arc::new(InMemoryProcessRegistry::new());
    for definition in definitions {
        registry.deploy(definition).expect("definition should deploy");
    }
    let ctx = EngineContext::sqlite(pool, registry, Arc::new(directory()), Config::default());
    TestEngine {
        tasks: TaskService::new(ctx.clone()),
        runtime: RuntimeService::new(ctx.clone()),
        ctx,
    }
}

/// start -> a -> b -> c -> end
pub fn linear() -> ProcessDefinition {
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
        .expect("linear definition is valid")
}

/// a, then b only when `approved`; both branches meet at `merge` before d.
pub fn merge() -> ProcessDefinition {
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
        .expect("merge definition is valid")
}

/// a, then a notification copied to the band, then review.
pub fn announce() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("announce")
        .start_event("start")
        .user_task("a", "A")
        .user_task("notify", "Notify")
        .copy_to(&[], &["band"])
        .user_task("review", "Review")
        .end_event("end")
        .flow("start", "a")
        .flow("a", "notify")
        .flow("notify", "review")
        .flow("review", "end")
        .build()
        .expect("announce definition is valid")
}

/// a, then b and c in parallel, joined before d.
pub fn parallel() -> ProcessDefinition {
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
        .expect("parallel definition is valid")
}

/// prepare, then one review per element of `reviewers`, then summary.
pub fn review() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("review")
        .start_event("start")
        .user_task("prepare", "Prepare")
        .user_task("review", "Review")
        .assignee("${reviewer}")
        .multi_instance(MultiInstanceMode::Parallel, "reviewers", "reviewer")
        .user_task("summary", "Summary")
        .end_event("end")
        .flow("start", "prepare")
        .flow("prepare", "review")
        .flow("review", "summary")
        .flow("summary", "end")
        .build()
        .expect("review definition is valid")
}
