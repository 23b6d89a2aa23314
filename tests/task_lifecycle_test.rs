//! Task lifecycle scenarios through the public service API.

mod common;

use common::{engine, linear};
use procflow::domain::models::{CompleteOptions, CompletionOp, IdentityLinkType, TaskOutcome, VariableValue};
use procflow::DomainError;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_linear_process_runs_to_the_end() {
    let engine = engine(vec![linear()]).await;
    let (pi, first) = engine.start("linear", Some("order-1")).await;

    let mut current = first;
    for expected in ["a", "b", "c"] {
        let task = engine.tasks.get_task(&current).await.unwrap().unwrap();
        assert_eq!(task.node_key.as_deref(), Some(expected));
        engine.tasks.claim(&current, Some("kermit")).await.unwrap();
        let outcome = engine.tasks.complete(&current, &CompleteOptions::new()).await.unwrap();
        if expected == "c" {
            assert!(outcome.ended);
            assert!(outcome.new_task_ids.is_empty());
        } else {
            current = outcome.new_task_ids[0].clone();
        }
    }

    let instance = engine.runtime.get_process_instance(&pi).await.unwrap();
    assert!(instance.is_ended());
    assert!(engine.live_tasks(&pi).await.is_empty());
}

#[tokio::test]
async fn test_claim_conflict_and_release() {
    let engine = engine(vec![linear()]).await;
    let (_, task_id) = engine.start("linear", None).await;

    engine.tasks.claim(&task_id, Some("kermit")).await.unwrap();
    let err = engine.tasks.claim(&task_id, Some("piggy")).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyClaimed { .. }));

    let released = assert_ok!(engine.tasks.claim(&task_id, None).await);
    assert_eq!(released.assignee, None);
    let claimed = engine.tasks.claim(&task_id, Some("piggy")).await.unwrap();
    assert_eq!(claimed.assignee.as_deref(), Some("piggy"));
}

#[tokio::test]
async fn test_delegated_task_cannot_complete_until_resolved() {
    let engine = engine(vec![linear()]).await;
    let (_, task_id) = engine.start("linear", None).await;

    engine.tasks.claim(&task_id, Some("kermit")).await.unwrap();
    engine.tasks.delegate_task(&task_id, "fozzie").await.unwrap();
    let err = assert_err!(engine.tasks.complete(&task_id, &CompleteOptions::new()).await);
    assert!(matches!(err, DomainError::InvalidState { .. }));

    let resolved = engine.tasks.resolve_task(&task_id).await.unwrap();
    assert_eq!(resolved.assignee.as_deref(), Some("kermit"));
    engine.tasks.complete(&task_id, &CompleteOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_complete_with_destination_skips_nodes() {
    let engine = engine(vec![linear()]).await;
    let (pi, a) = engine.start("linear", None).await;

    let outcome = engine
        .tasks
        .complete(
            &a,
            &CompleteOptions::new()
                .destination("c")
                .op(CompletionOp::Jump)
                .reason("fast track"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.new_task_ids.len(), 1);
    let c = engine.task_at(&pi, "c").await;
    assert_eq!(c.id, outcome.new_task_ids[0]);

    let history = engine.ctx.tasks.get_historic(&a).await.unwrap().unwrap();
    assert_eq!(history.outcome, Some(TaskOutcome::Jumped));
}

#[tokio::test]
async fn test_candidate_group_makes_task_visible_to_members() {
    let engine = engine(vec![linear()]).await;
    let (_, task_id) = engine.start("linear", None).await;
    engine.tasks.add_candidate_group(&task_id, "reviewers").await.unwrap();

    let for_piggy = engine.tasks.list_tasks_for_user("piggy").await.unwrap();
    assert!(for_piggy.iter().any(|t| t.id == task_id));
    let for_gonzo = engine.tasks.list_tasks_for_user("gonzo").await.unwrap();
    assert!(for_gonzo.iter().all(|t| t.id != task_id));

    engine.tasks.claim(&task_id, Some("kermit")).await.unwrap();
    let for_piggy = engine.tasks.list_tasks_for_user("piggy").await.unwrap();
    assert!(for_piggy.iter().all(|t| t.id != task_id), "claimed tasks are no longer offered");

    let removed = engine.tasks.delete_candidate_group(&task_id, "reviewers").await.unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_identity_links_are_dropped_when_the_task_closes() {
    let engine = engine(vec![linear()]).await;
    let (_, task_id) = engine.start("linear", None).await;
    engine
        .tasks
        .add_user_identity_link(&task_id, "gonzo", IdentityLinkType::Participant)
        .await
        .unwrap();
    assert_eq!(engine.tasks.get_identity_links_for_task(&task_id).await.unwrap().len(), 1);

    engine.tasks.complete(&task_id, &CompleteOptions::new()).await.unwrap();
    assert!(engine.tasks.get_identity_links_for_task(&task_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_delete_keeps_comments_and_cascade_removes_them() {
    let engine = engine(vec![linear()]).await;

    let kept = engine.tasks.save_task(&engine.tasks.new_task(None)).await.unwrap();
    engine
        .tasks
        .add_comment(Some(&kept.id), None, Some("kermit"), "keep me")
        .await
        .unwrap();
    engine.tasks.delete_tasks(&[kept.id.clone()], false, Some("obsolete")).await.unwrap();
    assert!(engine.tasks.get_task(&kept.id).await.unwrap().is_none());
    assert_eq!(engine.tasks.get_task_comments(&kept.id).await.unwrap().len(), 1);

    let purged = engine.tasks.save_task(&engine.tasks.new_task(None)).await.unwrap();
    engine
        .tasks
        .add_comment(Some(&purged.id), None, Some("kermit"), "gone soon")
        .await
        .unwrap();
    engine.tasks.delete_tasks(&[purged.id.clone()], true, None).await.unwrap();
    assert!(engine.tasks.get_task_comments(&purged.id).await.unwrap().is_empty());
    assert!(engine.ctx.tasks.get_historic(&purged.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_comment_needs_an_anchor() {
    let engine = engine(vec![linear()]).await;
    let err = engine.tasks.add_comment(None, None, Some("kermit"), "floating").await.unwrap_err();
    assert!(matches!(err, DomainError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_completion_variables_reach_the_next_task() {
    let engine = engine(vec![linear()]).await;
    let (_, a) = engine.start("linear", None).await;

    let outcome = engine
        .tasks
        .complete(&a, &CompleteOptions::new().variable("amount", 120_i64))
        .await
        .unwrap();
    let b = &outcome.new_task_ids[0];
    assert_eq!(
        engine.tasks.get_variable(b, "amount").await.unwrap(),
        Some(VariableValue::Integer(120))
    );
    assert_eq!(engine.tasks.get_variable_local(b, "amount").await.unwrap(), None);
}
