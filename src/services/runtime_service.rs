//! Starting and inspecting process instances.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Execution, IdentityLink, IdentityLinkType, ProcessInstance, ScopeRef, VariableMap, VariableWrite,
};
use crate::services::context::EngineContext;
use crate::services::task_lifecycle::after_commit;
use crate::services::token_driver::{Transition, TransitionOutcome};

pub struct RuntimeService {
    ctx: EngineContext,
}

impl RuntimeService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Start the latest deployed version of `key` and drive it to its first wait states.
    pub async fn start_process_instance_by_key(
        &self,
        key: &str,
        business_key: Option<&str>,
        variables: &VariableMap,
        starter: Option<&str>,
    ) -> DomainResult<TransitionOutcome> {
        let definition = self.ctx.graph.latest_definition(key)?;
        let mut transition = Transition::create(
            &self.ctx,
            definition.clone(),
            business_key.map(ToString::to_string),
            starter.map(ToString::to_string),
        );
        let root = ScopeRef::Execution(transition.instance().id.clone());
        for (name, value) in variables {
            transition.write_variable(VariableWrite::set(root.clone(), name.as_str(), value.clone()));
        }
        if let Some(user) = starter {
            let link = IdentityLink::for_process_instance(&transition.instance().id, user, IdentityLinkType::Starter);
            transition.add_identity_link(link);
        }

        transition.start_token()?;
        transition.run().await?;
        let outcome = transition.commit().await?;

        tracing::info!(
            process_instance_id = %outcome.process_instance_id,
            definition_id = %definition.id,
            business_key = ?business_key,
            tasks = outcome.new_task_ids.len(),
            "process instance started"
        );
        after_commit(&self.ctx, &outcome).await;
        Ok(outcome)
    }

    pub async fn get_process_instance(&self, id: &str) -> DomainResult<ProcessInstance> {
        self.ctx
            .executions
            .get_instance(id)
            .await?
            .ok_or_else(|| DomainError::ProcessInstanceNotFound(id.to_string()))
    }

    /// Executions of an instance currently holding a token.
    pub async fn list_active_executions(&self, process_instance_id: &str) -> DomainResult<Vec<Execution>> {
        self.get_process_instance(process_instance_id).await?;
        Ok(self
            .ctx
            .executions
            .list_executions(process_instance_id)
            .await?
            .into_iter()
            .filter(|e| e.is_active)
            .collect())
    }
}
