mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use clinic_records::{
    MemoryRecordStore, Namespace, Record, RecordError, RecordFilter, RecordId, RecordPatch,
    RecordResult, RecordStore, SessionOutcome, SessionState, SortField, StagingKind,
};
use tracing_test::traced_test;

use common::{ctx, harness, harness_with_store, record_with_attachment, upload, CLINIC_A};

#[tokio::test]
async fn add_then_rollback_deletes_the_upload() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let added = session.stage_add(0, upload("lab.pdf")).await.unwrap();
    assert!(h.blobs.contains(&added.remote_id));
    assert!(added.remote_id.as_str().starts_with("Happy_Clinic/HN0001/"));
    assert_eq!(session.view()[0].attachments.len(), 2);

    let report = session.rollback().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::RolledBack);
    assert_eq!(report.deleted, 1);
    assert!(!h.blobs.contains(&added.remote_id));
    assert!(h.blobs.contains(&existing.remote_id));
    assert_eq!(session.view(), record.history.as_slice());
    assert_eq!(h.records.get_record(&ctx(CLINIC_A), &record.id).await.unwrap(), record);
}

#[tokio::test]
async fn add_then_commit_keeps_and_persists_the_upload() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let entry = session.open_entry(Utc::now(), Some("follow-up".to_string())).unwrap();
    let added = session.stage_add(entry, upload("xray.png")).await.unwrap();

    let report = session.commit().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Committed);
    assert_eq!(report.deleted, 0);
    assert!(h.blobs.contains(&added.remote_id));
    assert!(h.blobs.contains(&existing.remote_id));

    let stored = h.records.get_record(&ctx(CLINIC_A), &record.id).await.unwrap();
    assert_eq!(stored.history.len(), 2);
    assert_eq!(stored.history[1].note.as_deref(), Some("follow-up"));
    assert_eq!(stored.history[1].attachments, vec![added]);
    assert!(stored.last_activity > record.last_activity);
    assert_eq!(report.record, stored);
}

#[tokio::test]
async fn removing_existing_attachment_then_rollback_keeps_it() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let removed = session.stage_remove_single(0, 0).unwrap();
    assert_eq!(removed, existing);
    assert!(session.view()[0].attachments.is_empty());
    assert!(!session.operations()[0].created_in_this_session);
    // nothing is deleted while staged
    assert!(h.blobs.contains(&existing.remote_id));

    let report = session.rollback().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert!(h.blobs.delete_calls().is_empty());
    assert!(h.blobs.contains(&existing.remote_id));
    assert_eq!(session.view()[0].attachments, vec![existing]);
}

#[tokio::test]
async fn removing_existing_attachment_then_commit_deletes_it() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.stage_remove_single(0, 0).unwrap();
    let report = session.commit().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert!(!h.blobs.contains(&existing.remote_id));
    let stored = h.records.get_record(&ctx(CLINIC_A), &record.id).await.unwrap();
    assert_eq!(stored.attachment_count(), 0);
}

#[tokio::test]
async fn upload_removed_again_is_deleted_on_commit() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let added = session.stage_add(0, upload("wrong-file.pdf")).await.unwrap();
    session.stage_remove_single(0, 1).unwrap();
    assert!(session.operations()[1].created_in_this_session);
    assert!(session.has_pending(&added.remote_id));

    let report = session.commit().await.unwrap();

    assert_eq!(report.operations, 2);
    assert_eq!(report.deleted, 1);
    assert!(!h.blobs.contains(&added.remote_id));
    assert!(h.blobs.contains(&existing.remote_id));
    // view ended up equal to the baseline, so the record was not rewritten
    assert_eq!(report.record.last_activity, record.last_activity);
}

#[tokio::test]
async fn entry_marked_for_deletion_is_dropped_on_commit() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let added = session.stage_add(0, upload("extra.pdf")).await.unwrap();
    let affected = session.stage_remove_entry(0).unwrap();

    assert_eq!(affected.len(), 2);
    assert!(session.is_entry_marked_for_deletion(0));
    // marked entries stay visible until commit
    assert_eq!(session.view().len(), 1);
    assert_eq!(session.operations()[1].kind, StagingKind::RemoveEntry);

    let report = session.commit().await.unwrap();

    assert_eq!(report.deleted, 2);
    assert!(!h.blobs.contains(&existing.remote_id));
    assert!(!h.blobs.contains(&added.remote_id));
    assert!(report.record.history.is_empty());
}

#[tokio::test]
async fn entry_marked_for_deletion_then_rollback_deletes_only_the_upload() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let added = session.stage_add(0, upload("extra.pdf")).await.unwrap();
    session.stage_remove_entry(0).unwrap();

    let report = session.rollback().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::RolledBack);
    assert_eq!(report.operations, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(h.blobs.delete_calls(), vec![added.remote_id.clone()]);
    assert!(!h.blobs.contains(&added.remote_id));
    assert!(h.blobs.contains(&existing.remote_id));
    assert!(!session.is_entry_marked_for_deletion(0));
    assert_eq!(session.view(), record.history.as_slice());
    assert_eq!(h.records.get_record(&ctx(CLINIC_A), &record.id).await.unwrap(), record);
}

#[tokio::test]
async fn undone_entry_deletion_keeps_everything() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.stage_remove_entry(0).unwrap();
    assert!(session.undo_entry_deletion(0).unwrap());
    assert!(!session.is_entry_marked_for_deletion(0));

    let report = session.commit().await.unwrap();

    assert_eq!(report.operations, 0);
    assert!(h.blobs.delete_calls().is_empty());
    assert!(h.blobs.contains(&existing.remote_id));
    assert_eq!(report.record.history, record.history);
}

#[tokio::test]
async fn second_commit_and_second_rollback_do_nothing() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;

    let mut committed = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    committed.stage_remove_single(0, 0).unwrap();
    committed.commit().await.unwrap();
    let calls = h.blobs.delete_calls().len();

    let again = committed.commit().await.unwrap();
    assert_eq!(again.outcome, SessionOutcome::AlreadyClosed);
    assert_eq!((again.operations, again.deleted, again.failed), (0, 0, 0));
    let late = committed.rollback().await.unwrap();
    assert_eq!(late.outcome, SessionOutcome::AlreadyClosed);
    assert_eq!(h.blobs.delete_calls().len(), calls);

    let mut rolled = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    rolled.stage_add(0, upload("a.pdf")).await.unwrap();
    rolled.rollback().await.unwrap();
    let calls = h.blobs.delete_calls().len();

    let again = rolled.rollback().await.unwrap();
    assert_eq!(again.outcome, SessionOutcome::AlreadyClosed);
    assert_eq!(h.blobs.delete_calls().len(), calls);
    assert_eq!(rolled.state(), SessionState::RolledBack);
}

#[tokio::test]
async fn closed_session_refuses_new_operations() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.commit().await.unwrap();

    assert!(matches!(
        session.stage_add(0, upload("late.pdf")).await,
        Err(RecordError::SessionClosed)
    ));
    assert!(matches!(session.stage_remove_entry(0), Err(RecordError::SessionClosed)));
    assert_eq!(h.blobs.len(), 1);
}

#[tokio::test]
async fn failed_upload_leaves_no_trace() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;
    h.blobs.set_fail_uploads(true);

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let err = session.stage_add(0, upload("scan.png")).await.unwrap_err();

    assert!(matches!(err, RecordError::UploadFailed { .. }));
    assert!(session.operations().is_empty());
    assert_eq!(session.view(), record.history.as_slice());
}

#[tokio::test]
async fn empty_upload_is_a_validation_error() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let err = session
        .stage_add(0, clinic_records::AttachmentUpload::new("empty.pdf", Vec::<u8>::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, RecordError::Validation { .. }));
    assert!(session.operations().is_empty());
}

#[tokio::test]
async fn commit_reports_delete_failures_but_still_persists() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;
    h.blobs.fail_deletes_for(&existing.remote_id);

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.stage_remove_single(0, 0).unwrap();
    let report = session.commit().await.unwrap();

    assert_eq!((report.deleted, report.failed), (0, 1));
    assert_eq!(report.failures[0].id, existing.remote_id);
    assert!(!report.is_clean());
    assert_eq!(report.record.attachment_count(), 0);
    assert!(session.operations().is_empty());
}

#[tokio::test]
async fn only_one_session_per_record() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;
    let ctx = ctx(CLINIC_A);

    let mut first = h.records.open_session(&ctx, &record.id).await.unwrap();
    let err = h.records.open_session(&ctx, &record.id).await.err().unwrap();
    assert!(matches!(err, RecordError::SessionAlreadyOpen { .. }));

    first.rollback().await.unwrap();
    let second = h.records.open_session(&ctx, &record.id).await.unwrap();
    drop(second);
    h.records.open_session(&ctx, &record.id).await.unwrap();
}

#[tokio::test]
async fn opening_a_missing_record_releases_the_slot() {
    let h = harness();
    let missing = RecordId::from("missing");

    let err = h.records.open_session(&ctx(CLINIC_A), &missing).await.err().unwrap();

    assert!(matches!(err, RecordError::NotFound { .. }));
    assert_eq!(h.records.sessions().open_count(), 0);
}

#[tokio::test]
#[traced_test]
async fn dropping_a_session_with_staged_changes_warns() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.stage_add(0, upload("left-behind.pdf")).await.unwrap();
    drop(session);

    assert!(logs_contain("may be orphaned"));
    assert_eq!(h.records.sessions().open_count(), 0);
}

/// Record store whose updates always fail
struct ReadOnlyStore {
    inner: MemoryRecordStore,
}

#[async_trait]
impl RecordStore for ReadOnlyStore {
    async fn find_max(&self, ns: &Namespace, field: SortField) -> RecordResult<Option<Record>> {
        self.inner.find_max(ns, field).await
    }

    async fn find_one(&self, ns: &Namespace, filter: &RecordFilter) -> RecordResult<Option<Record>> {
        self.inner.find_one(ns, filter).await
    }

    async fn find_all(&self, ns: &Namespace) -> RecordResult<Vec<Record>> {
        self.inner.find_all(ns).await
    }

    async fn insert(&self, ns: &Namespace, record: Record) -> RecordResult<Record> {
        self.inner.insert(ns, record).await
    }

    async fn update(&self, _ns: &Namespace, _id: &RecordId, _patch: RecordPatch) -> RecordResult<Record> {
        Err(RecordError::store("database is read-only"))
    }

    async fn delete(&self, ns: &Namespace, id: &RecordId) -> RecordResult<()> {
        self.inner.delete(ns, id).await
    }
}

#[tokio::test]
async fn failed_persist_deletes_nothing_and_keeps_the_session_open() {
    let store = MemoryRecordStore::new();
    let h = harness_with_store(
        store.clone(),
        Arc::new(ReadOnlyStore { inner: store }),
    );
    let (record, existing) = record_with_attachment(&h).await;

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    session.stage_remove_single(0, 0).unwrap();

    let err = session.commit().await.unwrap_err();
    assert!(matches!(err, RecordError::Store { .. }));
    assert!(h.blobs.contains(&existing.remote_id));
    assert!(session.is_open());
    assert_eq!(session.operations().len(), 1);

    // the user can still back out cleanly
    let report = session.rollback().await.unwrap();
    assert_eq!(report.deleted, 0);
    assert!(h.blobs.contains(&existing.remote_id));
}
