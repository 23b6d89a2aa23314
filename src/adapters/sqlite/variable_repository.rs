//! SQLite implementation of the VariableRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ScopeRef, VariableMap, VariableValue};
use crate::domain::ports::VariableRepository;

#[derive(Clone)]
pub struct SqliteVariableRepository {
    pool: SqlitePool,
}

impl SqliteVariableRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariableRepository for SqliteVariableRepository {
    async fn load(&self, scope: &ScopeRef) -> DomainResult<VariableMap> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, value FROM variables WHERE scope_type = ? AND scope_id = ?")
                .bind(scope.scope_type())
                .bind(scope.id())
                .fetch_all(&self.pool)
                .await?;

        let mut variables = VariableMap::new();
        for (name, value) in rows {
            let value: VariableValue = serde_json::from_str(&value)?;
            variables.insert(name, value);
        }
        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteChangeSetStore};
    use crate::domain::models::VariableWrite;
    use crate::domain::ports::{ChangeSet, ChangeSetStore};

    #[tokio::test]
    async fn test_writes_and_removals_are_scoped() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteVariableRepository::new(pool.clone());
        let store = SqliteChangeSetStore::new(pool);

        let exec = ScopeRef::Execution("e1".into());
        let task = ScopeRef::Task("e1".into());
        store
            .commit(ChangeSet {
                variables: vec![
                    VariableWrite::set(exec.clone(), "amount", 300.into()),
                    VariableWrite::set(exec.clone(), "approved", true.into()),
                    VariableWrite::set(task.clone(), "amount", 1.into()),
                ],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let vars = repo.load(&exec).await.unwrap();
        assert_eq!(vars.get("amount"), Some(&VariableValue::Integer(300)));
        assert_eq!(repo.load(&task).await.unwrap().len(), 1);

        store
            .commit(ChangeSet {
                variables: vec![
                    VariableWrite::remove(exec.clone(), "approved"),
                    VariableWrite::remove(exec.clone(), "never-set"),
                ],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        assert!(!repo.load(&exec).await.unwrap().contains_key("approved"));
    }
}
