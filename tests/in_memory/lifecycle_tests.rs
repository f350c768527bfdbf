//! End-to-end lifecycle flows over the in-memory adapters.

use super::helpers::{Engine, engine};
use crate::test_helpers::epoch;
use chrono::TimeDelta;
use mockable::Clock;
use rstest::rstest;
use steward::task::{
    domain::{ActionDescriptor, BottleneckReason, Priority, TaskState},
    ports::ActionEvent,
    services::{MetricsPolicy, SubmitRequest, collect_snapshot},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sensitive_action_waits_for_approval_then_completes(engine: Engine) {
    let id = engine
        .submit_with("invoice overdue", Some("reply"), Priority::High)
        .await;

    engine.pass().await;
    assert_eq!(engine.state_of(&id), TaskState::PendingApproval);
    assert_eq!(engine.executor.calls_for(&id), 0);
    let done_before = engine
        .sink
        .latest()
        .expect("first pass published")
        .snapshot
        .count(TaskState::Done);

    let approved = engine.approval.approve(&id).await.expect("approve");
    assert_eq!(approved.state(), TaskState::Approved);

    let report = engine.pass().await;
    assert_eq!(report.executed, 1);
    assert_eq!(engine.state_of(&id), TaskState::Done);
    assert_eq!(engine.executor.calls_for(&id), 1);
    let done_after = engine
        .sink
        .latest()
        .expect("second pass published")
        .snapshot
        .count(TaskState::Done);
    assert_eq!(done_after, done_before + 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn safe_action_completes_in_a_single_pass(engine: Engine) {
    let id = engine.submit("Weekly newsletter", Some("archive")).await;

    let report = engine.pass().await;

    assert_eq!((report.executed, report.moved), (1, 1));
    assert_eq!(engine.state_of(&id), TaskState::Done);
    assert_eq!(
        engine.log.events_for(id.as_str()).last(),
        Some(&ActionEvent::Moved {
            from: TaskState::NeedsAction,
            to: TaskState::Done,
        })
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_item_is_archived_and_never_executed(engine: Engine) {
    let id = engine.submit("Pay supplier 1200 EUR", Some("pay")).await;
    engine.pass().await;

    let rejected = engine.approval.reject(&id).await.expect("reject");
    assert_eq!(rejected.state(), TaskState::Rejected);
    engine.pass().await;

    assert_eq!(engine.state_of(&id), TaskState::RejectedArchive);
    assert_eq!(engine.executor.calls_for(&id), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn item_without_action_descriptor_requires_approval(engine: Engine) {
    let id = engine.submit("Unclear request from a new contact", None).await;

    engine.pass().await;

    assert_eq!(engine.state_of(&id), TaskState::PendingApproval);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn high_priority_never_bypasses_approval(engine: Engine) {
    let id = engine
        .submit_with("Wire transfer today", Some("send_payment"), Priority::High)
        .await;

    engine.pass().await;

    assert_eq!(engine.state_of(&id), TaskState::PendingApproval);
    let snapshot = engine.reconciler.snapshot().expect("snapshot");
    assert_eq!(snapshot.snapshot.high_priority_unresolved, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_lists_records_oldest_first(engine: Engine) {
    let first = engine.submit("first request", Some("reply")).await;
    engine.clock.advance(TimeDelta::minutes(1));
    let second = engine.submit("second request", Some("reply")).await;
    engine.pass().await;

    let pending = engine.approval.pending().await.expect("pending");

    let ids: Vec<_> = pending.iter().map(|record| record.id().clone()).collect();
    assert_eq!(ids, vec![first, second]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unrouted_needs_action_becomes_stale(engine: Engine) {
    let waiting = engine.submit("Quarterly report", Some("summarize")).await;
    engine.clock.advance(TimeDelta::days(5));

    let snapshot = collect_snapshot(&*engine.store, engine.clock.utc(), &MetricsPolicy::default())
        .await
        .expect("store is available");

    let reasons: Vec<_> = snapshot
        .bottlenecks_for(waiting.as_str())
        .map(|bottleneck| bottleneck.reason.clone())
        .collect();
    assert_eq!(reasons, vec![BottleneckReason::Stale { age_days: 5 }]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approval_past_its_deadline_is_flagged(engine: Engine) {
    let deadline = epoch() + TimeDelta::hours(1);
    let request = SubmitRequest::new("calendar", "Confirm Thursday meeting")
        .with_action(ActionDescriptor::new("reply").expect("valid action"))
        .with_expires_at(deadline);
    let id = engine.submission.submit(request).await.expect("submit");
    engine.pass().await;
    engine.clock.advance(TimeDelta::hours(2));

    let report = engine.pass().await;

    assert!(report.is_noop());
    assert_eq!(engine.state_of(&id), TaskState::PendingApproval);
    let snapshot = engine.reconciler.snapshot().expect("snapshot");
    assert!(snapshot.snapshot.bottlenecks_for(id.as_str()).any(|bottleneck| {
        bottleneck.reason == BottleneckReason::ApprovalExpired { expired_at: deadline }
    }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn snapshot_counts_every_record_exactly_once(engine: Engine) {
    engine.submit("archive me", Some("archive")).await;
    engine.submit("reply to me", Some("reply")).await;
    let rejected = engine.submit("delete everything", Some("delete")).await;
    engine.pass().await;
    engine.approval.reject(&rejected).await.expect("reject");

    engine.pass().await;

    let snapshot = engine.sink.latest().expect("published snapshot");
    assert_eq!(snapshot.snapshot.total(), 3);
    assert_eq!(snapshot.snapshot.count(TaskState::Done), 1);
    assert_eq!(snapshot.snapshot.count(TaskState::PendingApproval), 1);
    assert_eq!(snapshot.snapshot.count(TaskState::RejectedArchive), 1);
    assert_eq!(snapshot.snapshot.completed_in_window, 1);
}
