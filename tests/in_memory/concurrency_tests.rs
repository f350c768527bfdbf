//! Racing submissions, approvals, and passes.

use super::helpers::{Engine, engine};
use std::collections::BTreeSet;
use std::sync::Arc;
use steward::task::{
    domain::{ActionDescriptor, TaskState},
    services::{ApprovalError, PassStatus, SubmitRequest},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_distinct_submissions_all_land_once(engine: Engine) {
    let mut tasks = JoinSet::new();
    for index in 0..32 {
        let submission = engine.submission.clone();
        tasks.spawn(async move {
            submission
                .submit(SubmitRequest::new("file_drop", format!("scan-{index}.pdf")))
                .await
        });
    }

    let mut ids = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let id = joined.expect("task should not panic").expect("submission");
        assert!(ids.insert(id), "identifier issued twice");
    }

    assert_eq!(ids.len(), 32);
    for id in &ids {
        assert_eq!(engine.state_of(id), TaskState::NeedsAction);
    }
}

#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identical_submissions_yield_exactly_one_record(engine: Engine) {
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let submission = engine.submission.clone();
        tasks.spawn(async move {
            let request = SubmitRequest::new("mail", "same message")
                .with_action(ActionDescriptor::new("reply").expect("valid action"));
            submission.submit(request).await
        });
    }

    let mut accepted = 0;
    let mut duplicates = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task should not panic") {
            Ok(_) => accepted += 1,
            Err(err) if err.duplicate_id().is_some() => duplicates += 1,
            Err(err) => panic!("unexpected submission error: {err}"),
        }
    }

    assert_eq!((accepted, duplicates), (1, 7));
    assert_eq!(
        engine
            .store
            .keys(TaskState::NeedsAction)
            .expect("available")
            .len(),
        1
    );
}

#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn racing_decisions_on_one_record_have_one_winner(engine: Engine) {
    let id = engine.submit("book flights", Some("reply")).await;
    engine.pass().await;

    let approve = engine.approval.clone();
    let reject = engine.approval.clone();
    let (approve_id, reject_id) = (id.clone(), id.clone());
    let (approved, rejected) = tokio::join!(
        tokio::spawn(async move { approve.approve(&approve_id).await }),
        tokio::spawn(async move { reject.reject(&reject_id).await }),
    );
    let outcomes = [
        approved.expect("approve task"),
        rejected.expect("reject task"),
    ];

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        Ok(_) | Err(ApprovalError::Conflict(_) | ApprovalError::NotPending { .. })
    )));
    let holding = engine.partitions_holding(&id);
    assert!(
        holding == vec![TaskState::Approved] || holding == vec![TaskState::Rejected],
        "record held by {holding:?}"
    );
}

#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn overlapping_passes_never_execute_twice(engine: Engine) {
    let mut ids = Vec::new();
    for index in 0..10 {
        ids.push(
            engine
                .submit(&format!("categorize upload {index}"), Some("categorize"))
                .await,
        );
    }

    let mut passes = JoinSet::new();
    for _ in 0..4 {
        let reconciler = Arc::clone(&engine.reconciler);
        passes.spawn(async move { reconciler.run_pass(&CancellationToken::new()).await });
    }
    let mut completed = 0;
    while let Some(joined) = passes.join_next().await {
        let report = joined.expect("task should not panic").expect("pass");
        if report.status == PassStatus::Completed {
            completed += 1;
        }
    }
    engine.pass().await;

    assert!(completed >= 1);
    for id in &ids {
        assert_eq!(engine.state_of(id), TaskState::Done);
        assert_eq!(engine.executor.calls_for(id), 1);
    }
}

#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn submissions_during_a_pass_are_picked_up_later(engine: Engine) {
    let early = engine.submit("acknowledge delivery", Some("acknowledge")).await;
    let reconciler = Arc::clone(&engine.reconciler);
    let pass = tokio::spawn(async move { reconciler.run_pass(&CancellationToken::new()).await });
    let late = engine.submit("acknowledge invoice", Some("acknowledge")).await;
    pass.await.expect("pass task").expect("pass");

    engine.pass().await;

    assert_eq!(engine.state_of(&early), TaskState::Done);
    assert_eq!(engine.state_of(&late), TaskState::Done);
    assert_eq!(engine.executor.total(), 2);
}
