//! Backward routing: reject, return-to-reject and withdraw.

mod common;

use common::{engine, linear, merge, parallel, review};
use procflow::domain::models::{
    CompleteOptions, RejectOptions, RejectType, RoutingFailure, RoutingOutcome, TaskOutcome, VariableValue,
    WithdrawOptions, RETURN_TO_REJECT_VARIABLE,
};

fn moved_to(outcome: &RoutingOutcome) -> (&str, &[String]) {
    match outcome {
        RoutingOutcome::Moved {
            target_node,
            new_task_ids,
        } => (target_node.as_str(), new_task_ids.as_slice()),
        RoutingOutcome::Refused(failure) => panic!("expected a move, got {}", failure.describe()),
    }
}

#[tokio::test]
async fn test_reject_returns_to_the_original_performer() {
    let engine = engine(vec![linear()]).await;
    let (pi, a) = engine.start("linear", None).await;

    engine.tasks.claim(&a, Some("kermit")).await.unwrap();
    let b = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();
    engine.tasks.claim(&b, Some("piggy")).await.unwrap();

    let outcome = engine
        .tasks
        .reject_to_pre_task(&b, &RejectOptions::new().reason("missing receipts").actor("piggy"))
        .await
        .unwrap();
    let (target, new_ids) = moved_to(&outcome);
    assert_eq!(target, "a");
    assert_eq!(new_ids.len(), 1);

    let for_kermit = engine.tasks.list_tasks_for_user("kermit").await.unwrap();
    let at_a: Vec<_> = for_kermit.iter().filter(|t| t.node_key.as_deref() == Some("a")).collect();
    assert_eq!(at_a.len(), 1);
    assert_eq!(at_a[0].id, new_ids[0]);
    assert!(engine
        .live_tasks(&pi)
        .await
        .iter()
        .all(|t| t.node_key.as_deref() != Some("b")));

    let history = engine.ctx.tasks.get_historic(&b).await.unwrap().unwrap();
    assert_eq!(history.outcome, Some(TaskOutcome::Rejected));
    assert_eq!(history.delete_reason.as_deref(), Some("missing receipts"));
}

#[tokio::test]
async fn test_prior_path_reject_after_merge_walks_back_to_the_branch_task() {
    let engine = engine(vec![merge()]).await;
    let (pi, a) = engine.start("merge", None).await;

    let b = engine
        .tasks
        .complete(&a, &CompleteOptions::new().variable("approved", true))
        .await
        .unwrap()
        .new_task_ids[0]
        .clone();
    engine.tasks.claim(&b, Some("gonzo")).await.unwrap();
    let d = engine.tasks.complete(&b, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

    let target = engine.tasks.find_rejected_node(&d).await.unwrap();
    assert_eq!(target.prior_task_node.as_deref(), Some("b"));
    assert_eq!(target.prior_path_node.as_deref(), Some("merge"));

    let outcome = engine
        .tasks
        .reject_to_pre_task(&d, &RejectOptions::new().reject_type(RejectType::PriorPath))
        .await
        .unwrap();
    assert_eq!(moved_to(&outcome).0, "b");
    let back = engine.task_at(&pi, "b").await;
    assert_eq!(back.assignee.as_deref(), Some("gonzo"));
}

#[tokio::test]
async fn test_prior_path_through_default_branch_reaches_the_first_task() {
    let engine = engine(vec![merge()]).await;
    let (pi, a) = engine.start("merge", None).await;
    let d = engine
        .tasks
        .complete(&a, &CompleteOptions::new().variable("approved", false))
        .await
        .unwrap()
        .new_task_ids[0]
        .clone();
    assert_eq!(engine.task_at(&pi, "d").await.id, d);

    let outcome = engine
        .tasks
        .reject_to_pre_task(&d, &RejectOptions::new().reject_type(RejectType::PriorPath))
        .await
        .unwrap();
    assert_eq!(moved_to(&outcome).0, "a");
}

#[tokio::test]
async fn test_return_to_reject_skips_intermediate_nodes() {
    let engine = engine(vec![linear()]).await;
    let (pi, a) = engine.start("linear", None).await;
    let b = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();
    let c = engine.tasks.complete(&b, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();
    engine.tasks.claim(&c, Some("fozzie")).await.unwrap();

    let outcome = engine
        .tasks
        .reject_to_task(&c, &RejectOptions::new().destination("a").return_to_reject(true))
        .await
        .unwrap();
    let (target, new_ids) = moved_to(&outcome);
    assert_eq!(target, "a");
    let rework = new_ids[0].clone();
    assert_eq!(
        engine.tasks.get_variable_local(&rework, RETURN_TO_REJECT_VARIABLE).await.unwrap(),
        Some(VariableValue::String("c".into()))
    );

    let returned = engine.tasks.complete(&rework, &CompleteOptions::new()).await.unwrap();
    assert_eq!(returned.new_task_ids.len(), 1);
    let back_at_c = engine.task_at(&pi, "c").await;
    assert_eq!(back_at_c.assignee.as_deref(), Some("fozzie"));
    assert!(engine
        .live_tasks(&pi)
        .await
        .iter()
        .all(|t| t.node_key.as_deref() != Some("b")));

    let history = engine.ctx.tasks.get_historic(&rework).await.unwrap().unwrap();
    assert_eq!(history.outcome, Some(TaskOutcome::ReturnedToRejected));
}

#[tokio::test]
async fn test_reject_to_task_without_destination_is_refused() {
    let engine = engine(vec![linear()]).await;
    let (_, a) = engine.start("linear", None).await;
    let b = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

    let outcome = engine.tasks.reject_to_task(&b, &RejectOptions::new()).await.unwrap();
    assert!(!outcome.succeeded());
    assert_eq!(
        outcome.failure(),
        Some(&RoutingFailure::UnknownDestination(String::new()))
    );
    assert!(engine.tasks.get_task(&b).await.unwrap().is_some(), "a refused reject leaves the task alone");
}

#[tokio::test]
async fn test_standalone_task_cannot_be_rejected() {
    let engine = engine(vec![linear()]).await;
    let task = engine.tasks.save_task(&engine.tasks.new_task(None)).await.unwrap();
    let outcome = engine.tasks.reject_to_pre_task(&task.id, &RejectOptions::new()).await.unwrap();
    assert_eq!(outcome, RoutingOutcome::Refused(RoutingFailure::StandaloneTask));
}

#[tokio::test]
async fn test_admin_may_withdraw_to_an_explicit_node() {
    let engine = engine(vec![linear()]).await;
    let (pi, a) = engine.start("linear", None).await;
    let b = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();
    let c = engine.tasks.complete(&b, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

    let outcome = engine
        .tasks
        .withdraw_task(&c, "admin", &WithdrawOptions::new().destination("a").reason("restart"))
        .await
        .unwrap();
    assert_eq!(moved_to(&outcome).0, "a");
    assert_eq!(engine.live_tasks(&pi).await.len(), 1);
    let history = engine.ctx.tasks.get_historic(&c).await.unwrap().unwrap();
    assert_eq!(history.outcome, Some(TaskOutcome::Withdrawn));
}

#[tokio::test]
async fn test_prior_path_after_a_parallel_join_is_ambiguous() {
    let engine = engine(vec![parallel()]).await;
    let (pi, a) = engine.start("parallel", None).await;
    let branches = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids;
    assert_eq!(branches.len(), 2);
    engine.tasks.complete(&branches[0], &CompleteOptions::new()).await.unwrap();
    let d = engine.tasks.complete(&branches[1], &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

    let target = engine.tasks.find_rejected_node(&d).await.unwrap();
    assert!(target.prior_task_node.is_some());
    assert_eq!(target.prior_path_node, None);

    let outcome = engine
        .tasks
        .reject_to_pre_task(&d, &RejectOptions::new().reject_type(RejectType::PriorPath))
        .await
        .unwrap();
    assert_eq!(outcome, RoutingOutcome::Refused(RoutingFailure::AmbiguousPath));
    assert_eq!(engine.task_at(&pi, "d").await.id, d);
}

#[tokio::test]
async fn test_reject_from_a_branch_collapses_the_fork() {
    let engine = engine(vec![parallel()]).await;
    let (pi, a) = engine.start("parallel", None).await;
    engine.tasks.claim(&a, Some("kermit")).await.unwrap();
    engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap();
    let b = engine.task_at(&pi, "b").await;
    let c = engine.task_at(&pi, "c").await;

    let outcome = engine.tasks.reject_to_pre_task(&b.id, &RejectOptions::new()).await.unwrap();
    assert_eq!(moved_to(&outcome).0, "a");

    let live = engine.live_tasks(&pi).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].node_key.as_deref(), Some("a"));
    assert_eq!(live[0].assignee.as_deref(), Some("kermit"));
    assert!(engine.tasks.get_task(&c.id).await.unwrap().is_none());

    let reforked = engine.tasks.complete(&live[0].id, &CompleteOptions::new()).await.unwrap().new_task_ids;
    assert_eq!(reforked.len(), 2);
    let first = engine.tasks.complete(&reforked[0], &CompleteOptions::new()).await.unwrap();
    assert!(first.new_task_ids.is_empty(), "the join waits for the other branch");
    let joined = engine.tasks.complete(&reforked[1], &CompleteOptions::new()).await.unwrap();
    assert_eq!(joined.new_task_ids.len(), 1);
    assert_eq!(engine.task_at(&pi, "d").await.id, joined.new_task_ids[0]);
}

#[tokio::test]
async fn test_reject_from_a_multi_instance_child_closes_its_siblings() {
    let engine = engine(vec![review()]).await;
    let mut vars = procflow::VariableMap::new();
    vars.insert(
        "reviewers".into(),
        VariableValue::Json(serde_json::json!(["piggy", "gonzo", "fozzie"])),
    );
    let (pi, prepare) = engine.start_with("review", None, &vars).await;
    engine.tasks.claim(&prepare, Some("kermit")).await.unwrap();
    let children = engine.tasks.complete(&prepare, &CompleteOptions::new()).await.unwrap().new_task_ids;
    assert_eq!(children.len(), 3);

    let outcome = engine
        .tasks
        .reject_to_pre_task(&children[1], &RejectOptions::new().reason("wrong scope"))
        .await
        .unwrap();
    assert_eq!(moved_to(&outcome).0, "prepare");

    let live = engine.live_tasks(&pi).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].node_key.as_deref(), Some("prepare"));
    for child in &children {
        assert!(engine.tasks.get_task(child).await.unwrap().is_none());
    }
    let rejected = engine.ctx.tasks.get_historic(&children[1]).await.unwrap().unwrap();
    assert_eq!(rejected.outcome, Some(TaskOutcome::Rejected));
}
