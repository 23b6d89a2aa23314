//! Registry of deployed process definitions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ProcessDefinition;
use crate::domain::ports::ProcessGraph;

/// Process definitions keyed by id, with every version of a key retained.
///
/// Deployment assigns the next version of the key and the id `key:version`.
#[derive(Default)]
pub struct InMemoryProcessRegistry {
    definitions: RwLock<HashMap<String, Arc<ProcessDefinition>>>,
    latest: RwLock<HashMap<String, u32>>,
}

impl InMemoryProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&self, mut definition: ProcessDefinition) -> DomainResult<Arc<ProcessDefinition>> {
        definition.validate()?;

        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        let version = latest.get(&definition.key).copied().unwrap_or(0) + 1;
        definition.version = version;
        definition.id = format!("{}:{}", definition.key, version);

        let definition = Arc::new(definition);
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.id.clone(), Arc::clone(&definition));
        latest.insert(definition.key.clone(), version);

        tracing::info!(
            definition_id = %definition.id,
            nodes = definition.nodes.len(),
            "process definition deployed"
        );
        Ok(definition)
    }

    pub fn deploy_yaml(&self, yaml: &str) -> DomainResult<Arc<ProcessDefinition>> {
        let definition: ProcessDefinition =
            serde_yaml::from_str(yaml).map_err(|e| DomainError::SerializationError(e.to_string()))?;
        self.deploy(definition)
    }

    pub fn deploy_file(&self, path: &Path) -> DomainResult<Arc<ProcessDefinition>> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DomainError::ValidationFailed(format!("cannot read {}: {e}", path.display())))?;
        self.deploy_yaml(&yaml)
    }

    /// Deploy every `.yaml`/`.yml` file of a directory, in file name order.
    pub fn deploy_dir(&self, dir: &Path) -> DomainResult<Vec<Arc<ProcessDefinition>>> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| DomainError::ValidationFailed(format!("cannot read {}: {e}", dir.display())))?;
        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();
        paths.iter().map(|path| self.deploy_file(path)).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = latest.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ProcessGraph for InMemoryProcessRegistry {
    fn definition(&self, definition_id: &str) -> DomainResult<Arc<ProcessDefinition>> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(definition_id)
            .cloned()
            .ok_or_else(|| DomainError::ProcessDefinitionNotFound(definition_id.to_string()))
    }

    fn latest_definition(&self, key: &str) -> DomainResult<Arc<ProcessDefinition>> {
        let version = self
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .ok_or_else(|| DomainError::ProcessDefinitionNotFound(key.to_string()))?;
        self.definition(&format!("{key}:{version}"))
    }
}
