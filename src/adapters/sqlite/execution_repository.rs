//! SQLite implementation of the ExecutionRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{parse_datetime, parse_json_or_default, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityRecord, Execution, MultiInstanceState, NodeKind, ProcessInstance};
use crate::domain::ports::ExecutionRepository;

#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn get_instance(&self, id: &str) -> DomainResult<Option<ProcessInstance>> {
        let row: Option<InstanceRow> = sqlx::query_as("SELECT * FROM process_instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProcessInstance::try_from).transpose()
    }

    async fn get_execution(&self, id: &str) -> DomainResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Execution::try_from).transpose()
    }

    async fn list_executions(&self, process_instance_id: &str) -> DomainResult<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"SELECT * FROM executions WHERE process_instance_id = ?
               ORDER BY parent_id IS NOT NULL, created_at, id"#,
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Execution::try_from).collect()
    }

    async fn get_record(&self, id: &str) -> DomainResult<Option<ActivityRecord>> {
        let row: Option<RecordRow> = sqlx::query_as("SELECT * FROM activity_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ActivityRecord::try_from).transpose()
    }

    async fn list_records(&self, process_instance_id: &str) -> DomainResult<Vec<ActivityRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT * FROM activity_records WHERE process_instance_id = ? ORDER BY started_at, rowid",
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ActivityRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    definition_id: String,
    definition_key: String,
    business_key: Option<String>,
    starter: Option<String>,
    started_at: String,
    ended_at: Option<String>,
    version: i64,
}

impl TryFrom<InstanceRow> for ProcessInstance {
    type Error = DomainError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(ProcessInstance {
            id: row.id,
            definition_id: row.definition_id,
            definition_key: row.definition_key,
            business_key: row.business_key,
            starter: row.starter,
            started_at: parse_datetime(&row.started_at)?,
            ended_at: parse_optional_datetime(row.ended_at)?,
            version: u64::try_from(row.version).unwrap_or_default(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    process_instance_id: String,
    parent_id: Option<String>,
    node_key: Option<String>,
    is_active: bool,
    is_concurrent: bool,
    multi_instance: Option<String>,
    activity_record_id: Option<String>,
    created_at: String,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = DomainError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let multi_instance: Option<MultiInstanceState> = parse_json_or_default(row.multi_instance)?;
        Ok(Execution {
            id: row.id,
            process_instance_id: row.process_instance_id,
            parent_id: row.parent_id,
            node_key: row.node_key,
            is_active: row.is_active,
            is_concurrent: row.is_concurrent,
            multi_instance,
            activity_record_id: row.activity_record_id,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    process_instance_id: String,
    execution_id: String,
    node_key: String,
    node_kind: String,
    from_node_key: Option<String>,
    from_records: String,
    previous_task_id: Option<String>,
    previous_task_node: Option<String>,
    started_at: String,
    ended_at: Option<String>,
}

impl TryFrom<RecordRow> for ActivityRecord {
    type Error = DomainError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let node_kind = NodeKind::from_str(&row.node_kind)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid node kind: {}", row.node_kind)))?;
        Ok(ActivityRecord {
            id: row.id,
            process_instance_id: row.process_instance_id,
            execution_id: row.execution_id,
            node_key: row.node_key,
            node_kind,
            from_node_key: row.from_node_key,
            from_records: serde_json::from_str(&row.from_records)?,
            previous_task_id: row.previous_task_id,
            previous_task_node: row.previous_task_node,
            started_at: parse_datetime(&row.started_at)?,
            ended_at: parse_optional_datetime(row.ended_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteChangeSetStore};
    use crate::domain::models::MultiInstanceMode;
    use crate::domain::ports::{ChangeSet, ChangeSetStore, InstanceWrite};
    use chrono::Utc;

    fn instance(id: &str) -> ProcessInstance {
        ProcessInstance {
            id: id.to_string(),
            definition_id: "leave:1".into(),
            definition_key: "leave".into(),
            business_key: Some("LR-7".into()),
            starter: Some("kermit".into()),
            started_at: Utc::now(),
            ended_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_round_trip_of_runtime_state() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());
        let store = SqliteChangeSetStore::new(pool);

        let root = Execution::root("pi-1");
        let mut scope = Execution::child_of(&root);
        scope.multi_instance = Some(MultiInstanceState {
            mode: MultiInstanceMode::Parallel,
            node_key: "review".into(),
            elements: vec!["a".into(), "b".into()],
            element_variable: "reviewer".into(),
            next_index: 2,
            completed: 0,
            entry_record_id: "r1".into(),
        });
        let record = ActivityRecord {
            id: "r1".into(),
            process_instance_id: "pi-1".into(),
            execution_id: scope.id.clone(),
            node_key: "review".into(),
            node_kind: NodeKind::UserTask,
            from_node_key: Some("start".into()),
            from_records: vec!["r0".into()],
            previous_task_id: None,
            previous_task_node: None,
            started_at: Utc::now(),
            ended_at: None,
        };

        store
            .commit(ChangeSet {
                instance: Some(InstanceWrite::Insert(instance("pi-1"))),
                executions: vec![root.clone(), scope.clone()],
                activity_records: vec![record.clone()],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let loaded = repo.get_instance("pi-1").await.unwrap().unwrap();
        assert_eq!(loaded.business_key.as_deref(), Some("LR-7"));

        let executions = repo.list_executions("pi-1").await.unwrap();
        assert_eq!(executions.len(), 2);
        assert!(executions[0].is_root());
        assert_eq!(executions[1].multi_instance, scope.multi_instance);

        let loaded_record = repo.get_record("r1").await.unwrap().unwrap();
        assert_eq!(loaded_record.from_records, vec!["r0".to_string()]);
        assert_eq!(loaded_record.node_kind, NodeKind::UserTask);
    }
}
