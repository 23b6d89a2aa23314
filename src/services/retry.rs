//! Re-evaluation of transitions that lost an optimistic-lock race.

use std::future::Future;

use crate::domain::errors::{DomainError, DomainResult};

/// Run `attempt` until it succeeds, fails with something other than a
/// version conflict, or `max_retries` re-evaluations are used up.
pub async fn retry_on_conflict<T, F, Fut>(max_retries: u32, mut attempt: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(DomainError::ConcurrencyConflict { entity, id }) if retries < max_retries => {
                retries += 1;
                tracing::debug!(entity = %entity, id = %id, retries, "version conflict, re-evaluating");
            }
            other => return other,
        }
    }
}
