//! Copy tasks fanned out at broadcast nodes.

mod common;

use common::{announce, engine};
use procflow::domain::models::{CompleteOptions, CopyTaskQuery, PageRequest};

#[tokio::test]
async fn test_recipients_share_one_activity_and_read_independently() {
    let engine = engine(vec![announce()]).await;
    let (pi, a) = engine.start("announce", Some("gig-42")).await;
    let outcome = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap();
    assert_eq!(outcome.broadcasts.len(), 1);
    let activity = outcome.broadcasts[0].point.activity_instance_id.clone();

    let admin_view = engine
        .tasks
        .get_admin_copy_tasks(&CopyTaskQuery::default(), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(admin_view.total, 3);
    assert!(admin_view.items.iter().all(|c| c.activity_instance_id == activity));
    assert!(admin_view.items.iter().all(|c| c.process_instance_id == pi));

    let gonzo = engine
        .tasks
        .get_user_copy_tasks(&CopyTaskQuery::for_user("gonzo"), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(gonzo.total, 1);
    assert_eq!(gonzo.items[0].business_key.as_deref(), Some("gig-42"));
    engine.tasks.complete_copy_task(&gonzo.items[0].id, "gonzo").await.unwrap();

    let gonzo_after = engine
        .tasks
        .get_user_copy_tasks(&CopyTaskQuery::for_user("gonzo"), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(gonzo_after.total, 0);
    for other in ["animal", "fozzie"] {
        let unread = engine
            .tasks
            .get_user_copy_tasks(&CopyTaskQuery::for_user(other), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(unread.total, 1, "{other} should still have an unread copy");
    }

    let reads = engine
        .tasks
        .get_user_reader_copy_tasks(&CopyTaskQuery::for_user("gonzo"), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(reads.total, 1);
    assert_eq!(reads.items[0].reader_name, "Gonzo");
}

#[tokio::test]
async fn test_copies_do_not_block_the_process() {
    let engine = engine(vec![announce()]).await;
    let (pi, a) = engine.start("announce", None).await;
    let notify = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap().new_task_ids[0].clone();

    let review = engine.tasks.complete(&notify, &CompleteOptions::new()).await.unwrap();
    assert_eq!(review.new_task_ids.len(), 1);
    assert_eq!(engine.task_at(&pi, "review").await.id, review.new_task_ids[0]);

    let unread = engine
        .tasks
        .get_admin_copy_tasks(&CopyTaskQuery::default(), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(unread.total, 3, "copies stay unread after the node is left");
}

#[tokio::test]
async fn test_read_user_names_are_truncated() {
    let engine = engine(vec![announce()]).await;
    let (_, a) = engine.start("announce", None).await;
    let outcome = engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap();
    let activity = outcome.broadcasts[0].point.activity_instance_id.clone();

    let copies = engine
        .tasks
        .get_admin_copy_tasks(&CopyTaskQuery::default(), PageRequest::first(10))
        .await
        .unwrap();
    for copy in &copies.items {
        engine.tasks.complete_copy_task(&copy.id, &copy.recipient).await.unwrap();
    }

    let names = engine.tasks.get_copy_task_read_user_names(&activity, Some(2)).await.unwrap();
    assert_eq!(names.names.len(), 2);
    assert_eq!(names.total, 3);
    assert!(names.has_more());
    assert!(names.summary().ends_with("and 1 more"));

    let page = engine
        .tasks
        .get_copy_task_read_users(&activity, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_reader_queries_need_a_user() {
    let engine = engine(vec![announce()]).await;
    assert!(engine
        .tasks
        .get_user_reader_copy_tasks(&CopyTaskQuery::default(), PageRequest::first(5))
        .await
        .is_err());
}

#[tokio::test]
async fn test_recreating_copies_for_the_same_activity_adds_none() {
    let engine = engine(vec![announce()]).await;
    let (pi, a) = engine.start("announce", None).await;
    engine.tasks.complete(&a, &CompleteOptions::new()).await.unwrap();
    let notify = engine.task_at(&pi, "notify").await;
    let execution_id = notify.execution_id.clone().expect("notify runs in an execution");

    let created = engine.tasks.create_copy_tasks(&execution_id).await.unwrap();
    assert_eq!(created, 0);
    let all = engine
        .tasks
        .get_admin_copy_tasks(&CopyTaskQuery::default(), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(all.total, 3);
}
