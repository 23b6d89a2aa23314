use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FlowNode, ProcessDefinition, SequenceFlow};

/// Read-only access to deployed process definitions.
///
/// Lookups are synchronous: definitions are immutable after deployment.
pub trait ProcessGraph: Send + Sync {
    /// Definition by id (`key:version`)
    fn definition(&self, definition_id: &str) -> DomainResult<Arc<ProcessDefinition>>;

    /// Latest deployed version of a key
    fn latest_definition(&self, key: &str) -> DomainResult<Arc<ProcessDefinition>>;

    fn node_by_key(&self, definition_id: &str, node_key: &str) -> DomainResult<FlowNode> {
        let definition = self.definition(definition_id)?;
        definition.require_node(node_key).cloned()
    }

    /// First user-task node reachable from the start event
    fn first_node(&self, definition_id: &str) -> DomainResult<Option<FlowNode>> {
        Ok(self.definition(definition_id)?.first_user_task().cloned())
    }

    fn predecessor_task_nodes(&self, definition_id: &str, node_key: &str) -> DomainResult<Vec<String>> {
        let definition = self.definition(definition_id)?;
        definition.require_node(node_key)?;
        Ok(definition.predecessor_task_nodes(node_key))
    }

    fn predecessor_path_nodes(&self, definition_id: &str, node_key: &str) -> DomainResult<Vec<String>> {
        let definition = self.definition(definition_id)?;
        definition.require_node(node_key)?;
        Ok(definition.predecessor_path_nodes(node_key))
    }

    fn outgoing(&self, definition_id: &str, node_key: &str) -> DomainResult<Vec<SequenceFlow>> {
        let definition = self.definition(definition_id)?;
        Ok(definition.outgoing(node_key).into_iter().cloned().collect())
    }

    fn incoming(&self, definition_id: &str, node_key: &str) -> DomainResult<Vec<SequenceFlow>> {
        let definition = self.definition(definition_id)?;
        Ok(definition.incoming(node_key).into_iter().cloned().collect())
    }
}
