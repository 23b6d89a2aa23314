use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ScopeRef, VariableMap};

/// Read side of variable storage.
#[async_trait]
pub trait VariableRepository: Send + Sync {
    /// All variables attached directly to a scope
    async fn load(&self, scope: &ScopeRef) -> DomainResult<VariableMap>;
}
