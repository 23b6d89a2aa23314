//! An initialized on-disk project driven through the CLI engine wiring.

use procflow::cli::engine::Engine;
use procflow::domain::models::{CompleteOptions, Config, CopyTaskQuery, PageRequest, VariableMap, VariableValue};
use procflow::infrastructure::setup::{initialize_project, SetupPaths};
use tempfile::TempDir;

fn project_config(paths: &SetupPaths) -> Config {
    let mut config = Config::default();
    config.database.path = paths.database_file.to_string_lossy().to_string();
    config.processes.definitions_dir = paths.processes_dir.to_string_lossy().to_string();
    config.processes.identity_file = paths.identity_file.to_string_lossy().to_string();
    config
}

#[tokio::test]
async fn test_sample_leave_process_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let paths = SetupPaths::new(dir.path());
    initialize_project(&paths, false).await.unwrap();

    let engine = Engine::open(project_config(&paths)).await.unwrap();
    let mut variables = VariableMap::new();
    variables.insert("starter".into(), VariableValue::String("kermit".into()));
    let started = engine
        .runtime()
        .start_process_instance_by_key("leave", Some("leave-1"), &variables, Some("kermit"))
        .await
        .unwrap();
    let request = engine.tasks().get_task(&started.new_task_ids[0]).await.unwrap().unwrap();
    assert_eq!(request.assignee.as_deref(), Some("kermit"));

    let approve_id = engine
        .tasks()
        .complete(&request.id, &CompleteOptions::new())
        .await
        .unwrap()
        .new_task_ids[0]
        .clone();
    drop(engine);

    let reopened = Engine::open(project_config(&paths)).await.unwrap();
    let offered = reopened.tasks().list_tasks_for_user("piggy").await.unwrap();
    assert!(offered.iter().any(|t| t.id == approve_id), "managers should see the approval");

    reopened.tasks().claim(&approve_id, Some("piggy")).await.unwrap();
    let archived = reopened
        .tasks()
        .complete(&approve_id, &CompleteOptions::new().variable("approved", true))
        .await
        .unwrap();
    assert_eq!(archived.broadcasts.len(), 1);

    let copies = reopened
        .copies()
        .get_admin_copy_tasks(&CopyTaskQuery::default().business_key("leave-1"), PageRequest::first(10))
        .await
        .unwrap();
    let mut recipients: Vec<String> = copies.items.into_iter().map(|c| c.recipient).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["fozzie", "kermit"]);
}

#[tokio::test]
async fn test_open_without_definitions_uses_an_empty_registry() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("bare.db").to_string_lossy().to_string();
    config.processes.definitions_dir = dir.path().join("missing").to_string_lossy().to_string();
    config.processes.identity_file = dir.path().join("missing.yaml").to_string_lossy().to_string();

    let engine = Engine::open(config).await.unwrap();
    assert!(engine.registry.keys().is_empty());
    assert!(engine
        .runtime()
        .start_process_instance_by_key("leave", None, &VariableMap::new(), None)
        .await
        .is_err());
}
