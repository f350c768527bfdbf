//! Action log and snapshot files.

use super::helpers::{TempVault, vault};
use crate::test_helpers::epoch;
use chrono::TimeDelta;
use rstest::rstest;
use steward::task::{
    adapters::filesystem::FileActionLog,
    domain::{AggregateSnapshot, Priority, PublishedSnapshot, TaskState},
    ports::{ActionEvent, ActionLog, ActionLogEntry, SnapshotSink},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn action_log_appends_one_json_line_per_entry(vault: TempVault) {
    let log = vault.action_log();
    let entries = vec![
        ActionLogEntry::new(
            epoch(),
            "rec-1",
            ActionEvent::Submitted {
                kind: "mail".to_owned(),
                priority: Priority::High,
            },
        ),
        ActionLogEntry::new(
            epoch() + TimeDelta::minutes(1),
            "rec-1",
            ActionEvent::Moved {
                from: TaskState::NeedsAction,
                to: TaskState::PendingApproval,
            },
        ),
    ];

    for entry in &entries {
        log.append(entry).await.expect("append");
    }

    let day = epoch().date_naive();
    let path = vault.root().join("Logs").join(FileActionLog::file_name(day));
    let text = std::fs::read_to_string(&path).expect("log file");
    assert_eq!(text.lines().count(), 2);
    let first: serde_json::Value =
        serde_json::from_str(text.lines().next().expect("first line")).expect("json line");
    assert_eq!(first["event"], "submitted");
    assert_eq!(first["key"], "rec-1");
    assert_eq!(log.read_day(day).await.expect("read back"), entries);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn action_log_splits_files_by_utc_day(vault: TempVault) {
    let log = vault.action_log();
    let today = ActionLogEntry::new(epoch(), "rec-2", ActionEvent::Executed { action: None });
    let tomorrow = ActionLogEntry::new(
        epoch() + TimeDelta::days(1),
        "rec-2",
        ActionEvent::Stalled {
            consecutive_failures: 3,
        },
    );

    log.append(&today).await.expect("append");
    log.append(&tomorrow).await.expect("append");

    assert_eq!(
        log.read_day(epoch().date_naive()).await.expect("read"),
        vec![today]
    );
    assert_eq!(
        log.read_day((epoch() + TimeDelta::days(1)).date_naive())
            .await
            .expect("read"),
        vec![tomorrow]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reading_a_day_without_entries_is_empty(vault: TempVault) {
    let entries = vault
        .action_log()
        .read_day(epoch().date_naive())
        .await
        .expect("read");
    assert!(entries.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn snapshot_file_holds_the_latest_publication(vault: TempVault) {
    let sink = vault.snapshot_sink();
    assert_eq!(sink.load().await.expect("load"), None);

    let mut snapshot = AggregateSnapshot::default();
    snapshot.counts.insert(TaskState::Done, 4);
    let first = PublishedSnapshot {
        pass: 1,
        as_of: epoch(),
        snapshot: AggregateSnapshot::default(),
    };
    let second = PublishedSnapshot {
        pass: 2,
        as_of: epoch() + TimeDelta::seconds(30),
        snapshot,
    };
    sink.publish(&first).await.expect("publish");
    sink.publish(&second).await.expect("publish");

    assert_eq!(sink.load().await.expect("load"), Some(second));
    let leftovers: Vec<_> = std::fs::read_dir(vault.root())
        .expect("read vault root")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left behind");
}
