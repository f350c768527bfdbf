//! File-system task store semantics.

use super::helpers::{TempVault, vault};
use crate::test_helpers::epoch;
use chrono::TimeDelta;
use rstest::rstest;
use std::io::Write;
use steward::task::{
    codec,
    domain::{BottleneckReason, TaskState},
    ports::{MoveOutcome, RecordAnnotation, RecordHandle, TaskStore, TaskStoreError},
    services::{MetricsPolicy, collect_snapshot},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn opening_a_vault_creates_every_partition_folder(vault: TempVault) {
    for state in TaskState::ALL {
        assert!(
            vault.layout.partition_path(state).is_dir(),
            "missing folder for {state}"
        );
    }
    assert!(vault.root().join("Logs").is_dir());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_record_is_listed_and_read_back(vault: TempVault) {
    let record = vault.record("Invoice overdue", Some("reply"));

    let handle = vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    let listed = vault.store.list(TaskState::NeedsAction).await.expect("list");
    let read = vault.store.read(&handle).await.expect("read");

    assert_eq!(listed, vec![handle.clone()]);
    assert_eq!(read, record);
    assert_eq!(
        vault.file_names(TaskState::NeedsAction),
        vec![format!("{}.md", record.id())]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn creating_an_existing_id_anywhere_is_a_duplicate(vault: TempVault) {
    let record = vault.record("Invoice overdue", None);
    let handle = vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    vault
        .store
        .move_record(&handle, TaskState::PendingApproval, record.created_at())
        .await
        .expect("move");

    let result = vault.store.create(TaskState::NeedsAction, &record).await;

    assert!(matches!(result, Err(TaskStoreError::DuplicateId(id)) if id == *record.id()));
    assert!(vault.file_names(TaskState::NeedsAction).is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn move_relocates_the_file_and_stamps_the_transition(vault: TempVault) {
    let mut record = vault.record("Reply to accountant", Some("reply"));
    let handle = vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    vault.clock.advance(TimeDelta::minutes(10));
    record
        .transition_to(TaskState::PendingApproval, &*vault.clock)
        .expect("legal transition");

    let outcome = vault
        .store
        .move_record(&handle, TaskState::PendingApproval, record.last_transitioned_at())
        .await
        .expect("move");
    let moved = vault
        .store
        .read(&RecordHandle::new(TaskState::PendingApproval, handle.key()))
        .await
        .expect("read moved record");

    assert_eq!(outcome, MoveOutcome::Moved);
    assert!(vault.file_names(TaskState::NeedsAction).is_empty());
    assert_eq!(moved.state(), TaskState::PendingApproval);
    assert_eq!(moved.created_at(), record.created_at());
    assert_eq!(moved.last_transitioned_at(), record.last_transitioned_at());
    let text = std::fs::read_to_string(
        vault
            .layout
            .partition_path(TaskState::PendingApproval)
            .join(format!("{}.md", record.id())),
    )
    .expect("moved file");
    let stamp = codec::format_timestamp(record.last_transitioned_at());
    assert!(text.contains(&format!("last_transitioned_at: {stamp}\n")));
    assert!(text.ends_with("Reply to accountant"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn editing_a_record_is_not_a_transition(vault: TempVault) {
    let record = vault.record("Quarterly VAT return", None);
    let handle = vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    let path = vault
        .layout
        .partition_path(TaskState::NeedsAction)
        .join(format!("{}.md", record.id()));
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("open record for editing");
    file.write_all(b"\nnote: waiting on the accountant\n")
        .expect("append note");
    drop(file);

    let edited = vault.store.read(&handle).await.expect("read edited record");
    let now = epoch() + TimeDelta::days(4);
    let snapshot = collect_snapshot(&*vault.store, now, &MetricsPolicy::default())
        .await
        .expect("snapshot");

    assert_eq!(edited.last_transitioned_at(), record.created_at());
    assert!(edited.body().ends_with("waiting on the accountant\n"));
    assert!(snapshot
        .bottlenecks_for(record.id().as_str())
        .any(|bottleneck| matches!(bottleneck.reason, BottleneckReason::Stale { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn move_rewrites_a_hand_written_stamp_of_another_width(vault: TempVault) {
    vault.write_file(
        TaskState::NeedsAction,
        "hand-written.md",
        "---\nid: hand-written\nkind: mail\ncreated_at: 2026-03-02T08:00:00Z\n\
         last_transitioned_at: 2026-03-02T08:00:00Z\n---\nChase the plumber\n",
    );
    let handle = RecordHandle::new(TaskState::NeedsAction, "hand-written");
    let transitioned_at = epoch() + TimeDelta::hours(2);

    let outcome = vault
        .store
        .move_record(&handle, TaskState::PendingApproval, transitioned_at)
        .await
        .expect("move");
    let moved = vault
        .store
        .read(&RecordHandle::new(TaskState::PendingApproval, "hand-written"))
        .await
        .expect("read moved record");

    assert_eq!(outcome, MoveOutcome::Moved);
    assert_eq!(moved.last_transitioned_at(), transitioned_at);
    assert_eq!(moved.created_at(), epoch());
    assert_eq!(moved.body(), "Chase the plumber\n");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn moving_a_record_twice_reports_a_conflict(vault: TempVault) {
    let record = vault.record("Tag receipts", Some("tag"));
    let handle = vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    let at = record.created_at();

    let first = vault.store.move_record(&handle, TaskState::Done, at).await;
    let second = vault.store.move_record(&handle, TaskState::Done, at).await;

    assert!(matches!(first, Ok(MoveOutcome::Moved)));
    assert!(matches!(second, Ok(MoveOutcome::Conflict)));
    assert_eq!(vault.file_names(TaskState::Done).len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn move_never_overwrites_an_occupied_target(vault: TempVault) {
    let record = vault.record("Archive statement", Some("archive"));
    let handle = vault
        .store
        .create(TaskState::Approved, &record)
        .await
        .expect("create");
    let name = format!("{}.md", record.id());
    vault.write_file(TaskState::Done, &name, "occupied\n");

    let outcome = vault
        .store
        .move_record(&handle, TaskState::Done, record.created_at())
        .await
        .expect("move");

    assert_eq!(outcome, MoveOutcome::Conflict);
    assert_eq!(vault.file_names(TaskState::Approved), vec![name]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dot_files_and_foreign_extensions_are_not_records(vault: TempVault) {
    let record = vault.record("Real record", None);
    vault
        .store
        .create(TaskState::NeedsAction, &record)
        .await
        .expect("create");
    vault.write_file(TaskState::NeedsAction, ".draft.md", "---\n---\n");
    vault.write_file(TaskState::NeedsAction, "notes.txt", "scratch");

    let listed = vault.store.list(TaskState::NeedsAction).await.expect("list");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed.first().map(RecordHandle::key), Some(record.id().as_str()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unparsable_file_is_reported_as_corrupt(vault: TempVault) {
    vault.write_file(TaskState::NeedsAction, "broken.md", "just some prose\n");
    let handle = RecordHandle::new(TaskState::NeedsAction, "broken");

    let result = vault.store.read(&handle).await;

    assert!(matches!(
        result,
        Err(TaskStoreError::CorruptRecord { handle: corrupt, .. }) if corrupt == handle
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn header_id_must_match_file_name(vault: TempVault) {
    let record = vault.record("Mismatched", None);
    vault.write_file(TaskState::Done, "other-name.md", &codec::encode(&record));

    let result = vault
        .store
        .read(&RecordHandle::new(TaskState::Done, "other-name"))
        .await;

    assert!(matches!(result, Err(TaskStoreError::CorruptRecord { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reading_a_missing_record_is_not_found(vault: TempVault) {
    let result = vault
        .store
        .read(&RecordHandle::new(TaskState::Approved, "gone"))
        .await;

    assert!(matches!(result, Err(TaskStoreError::NotFound(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn find_locates_the_partition_holding_an_id(vault: TempVault) {
    let record = vault.record("Find me", None);
    vault
        .store
        .create(TaskState::Rejected, &record)
        .await
        .expect("create");

    let found = vault.store.find(record.id()).await.expect("find");

    assert_eq!(found, Some(RecordHandle::new(TaskState::Rejected, record.id().as_str())));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn annotations_round_trip_and_clear(vault: TempVault) {
    let annotation = RecordAnnotation {
        consecutive_failures: 2,
        last_failure: Some("smtp refused".to_owned()),
        ..RecordAnnotation::default()
    };

    vault
        .store
        .annotate("rec-1", &annotation)
        .await
        .expect("annotate");
    let stored = vault.store.annotation("rec-1").await.expect("annotation");
    vault.store.clear_annotation("rec-1").await.expect("clear");
    let cleared = vault.store.annotation("rec-1").await.expect("annotation");
    vault
        .store
        .clear_annotation("rec-1")
        .await
        .expect("clearing twice is harmless");

    assert_eq!(stored, Some(annotation));
    assert_eq!(cleared, None);
}
