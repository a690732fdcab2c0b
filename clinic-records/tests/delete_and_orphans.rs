mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use clinic_blob::{
    BatchDeleteResult, BlobId, BlobListing, BlobMetadata, BlobResult, BlobStore, MemoryBlobStore,
    StoreCapabilities, StoredBlob,
};
use clinic_records::{
    HistoryEntry, MemoryRecordStore, Namespace, NewRecord, Record, RecordError, RecordFilter, RecordId,
    RecordPatch, RecordResult, RecordStore, SessionOutcome, SortField,
};
use tokio::sync::Notify;

use common::{
    ctx, harness, harness_with_blob_store, harness_with_store, record_with_attachment, seed_attachment,
    upload, Harness, CLINIC_A, CLINIC_B,
};

async fn record_with_two_attachments(h: &Harness) -> clinic_records::Record {
    let first = seed_attachment(&h.blobs, CLINIC_A, "Happy_Clinic/HN0001/first");
    let second = seed_attachment(&h.blobs, CLINIC_A, "Happy_Clinic/HN0001/second");
    h.records
        .create_record(
            &ctx(CLINIC_A),
            NewRecord::new("Somchai").with_history(vec![
                HistoryEntry::new(Utc::now()).with_attachment(first),
                HistoryEntry::new(Utc::now()).with_attachment(second),
            ]),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn delete_removes_record_and_all_attachments() {
    let h = harness();
    let record = record_with_two_attachments(&h).await;

    let report = h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, false)
        .await
        .unwrap();

    assert!(report.record_deleted);
    assert_eq!(report.deletions.deleted_count(), 2);
    assert!(h.blobs.is_empty());
    assert!(matches!(
        h.records.get_record(&ctx(CLINIC_A), &record.id).await,
        Err(RecordError::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_without_force_keeps_record_when_a_blob_survives() {
    let h = harness();
    let record = record_with_two_attachments(&h).await;
    let stubborn = record.history[1].attachments[0].remote_id.clone();
    h.blobs.fail_deletes_for(&stubborn);

    let report = h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, false)
        .await
        .unwrap();

    assert!(!report.record_deleted);
    assert_eq!(report.deletions.failed_count(), 1);
    assert_eq!(report.deletions.failed[0].id, stubborn);
    assert!(h.records.get_record(&ctx(CLINIC_A), &record.id).await.is_ok());

    // retry once storage recovers; the blob already deleted is not an error
    h.blobs.clear_delete_failures();
    let retry = h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, false)
        .await
        .unwrap();
    assert!(retry.record_deleted);
    assert!(retry.deletions.is_clean());
}

#[tokio::test]
async fn forced_delete_proceeds_and_reports_failures() {
    let h = harness();
    let record = record_with_two_attachments(&h).await;
    let stubborn = record.history[0].attachments[0].remote_id.clone();
    h.blobs.fail_deletes_for(&stubborn);

    let report = h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, true)
        .await
        .unwrap();

    assert!(report.record_deleted);
    assert!(report.forced);
    assert_eq!(report.deletions.deleted_count(), 1);
    assert_eq!(report.deletions.failed_count(), 1);
    assert!(h.blobs.contains(&stubborn));
    assert!(h.records.get_record(&ctx(CLINIC_A), &record.id).await.is_err());
}

#[tokio::test]
async fn delete_waits_for_open_sessions() {
    let h = harness();
    let (record, _) = record_with_attachment(&h).await;

    let session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let err = h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::SessionAlreadyOpen { .. }));

    drop(session);
    assert!(h
        .records
        .delete_record(&ctx(CLINIC_A), &record.id, true)
        .await
        .unwrap()
        .record_deleted);
}

#[tokio::test]
async fn orphans_are_unreferenced_blobs_of_the_tenant() {
    let h = harness();
    let (record, existing) = record_with_attachment(&h).await;
    let stray = seed_attachment(&h.blobs, CLINIC_A, "Happy_Clinic/HN0001/stray");
    // other tenant's folder and a foreign blob sharing ours
    seed_attachment(&h.blobs, CLINIC_B, "Sunrise_Clinic/HN0001/theirs");
    let foreign = seed_attachment(&h.blobs, CLINIC_B, "Happy_Clinic/HN0009/foreign");

    let mut session = h.records.open_session(&ctx(CLINIC_A), &record.id).await.unwrap();
    let pending = session.stage_add(0, upload("in-progress.pdf")).await.unwrap();

    let report = h.records.find_orphans(&ctx(CLINIC_A)).await.unwrap();

    assert_eq!(report.scanned, 4);
    assert_eq!(report.referenced, 1);
    assert_eq!(report.skipped_pending, 1);
    assert_eq!(report.foreign, 1);
    assert_eq!(report.orphan_ids(), vec![stray.remote_id.clone()]);

    let swept = h.records.sweep_orphans(&ctx(CLINIC_A)).await.unwrap();
    assert_eq!(swept.deleted, vec![stray.remote_id.clone()]);
    assert!(h.blobs.contains(&existing.remote_id));
    assert!(h.blobs.contains(&pending.remote_id));
    assert!(h.blobs.contains(&foreign.remote_id));

    // once the session rolls back its upload is gone; nothing left to sweep
    session.rollback().await.unwrap();
    assert!(h.records.find_orphans(&ctx(CLINIC_A)).await.unwrap().is_empty());
}

/// Holds the first armed `find_all` answer until `resume` is notified
struct PausingStore {
    inner: MemoryRecordStore,
    armed: AtomicBool,
    paused: Notify,
    resume: Notify,
}

#[async_trait]
impl RecordStore for PausingStore {
    async fn find_max(&self, ns: &Namespace, field: SortField) -> RecordResult<Option<Record>> {
        self.inner.find_max(ns, field).await
    }

    async fn find_one(&self, ns: &Namespace, filter: &RecordFilter) -> RecordResult<Option<Record>> {
        self.inner.find_one(ns, filter).await
    }

    async fn find_all(&self, ns: &Namespace) -> RecordResult<Vec<Record>> {
        let records = self.inner.find_all(ns).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
        Ok(records)
    }

    async fn insert(&self, ns: &Namespace, record: Record) -> RecordResult<Record> {
        self.inner.insert(ns, record).await
    }

    async fn update(&self, ns: &Namespace, id: &RecordId, patch: RecordPatch) -> RecordResult<Record> {
        self.inner.update(ns, id, patch).await
    }

    async fn delete(&self, ns: &Namespace, id: &RecordId) -> RecordResult<()> {
        self.inner.delete(ns, id).await
    }
}

#[tokio::test]
async fn sweep_spares_uploads_committed_while_it_runs() {
    let store = MemoryRecordStore::new();
    let pausing = Arc::new(PausingStore {
        inner: store.clone(),
        armed: AtomicBool::new(false),
        paused: Notify::new(),
        resume: Notify::new(),
    });
    let h = harness_with_store(store, pausing.clone());
    let (record, existing) = record_with_attachment(&h).await;
    let ctx_a = ctx(CLINIC_A);

    let mut session = h.records.open_session(&ctx_a, &record.id).await.unwrap();
    let added = session.stage_add(0, upload("scan.pdf")).await.unwrap();
    pausing.armed.store(true, Ordering::SeqCst);

    // the sweep reads the records before the commit lands
    let sweep = h.records.sweep_orphans(&ctx_a);
    let commit = async {
        pausing.paused.notified().await;
        let report = session.commit().await.unwrap();
        pausing.resume.notify_one();
        report
    };
    let (swept, committed) = tokio::join!(sweep, commit);

    assert_eq!(committed.outcome, SessionOutcome::Committed);
    assert!(swept.unwrap().deleted.is_empty());
    assert!(h.blobs.contains(&added.remote_id));
    assert!(h.blobs.contains(&existing.remote_id));
    let stored = h.records.get_record(&ctx_a, &record.id).await.unwrap();
    assert!(stored.attachment_ids().contains(&added.remote_id));
}

/// Stores the body, then holds the upload call open until `release`
struct HoldingBlobStore {
    inner: MemoryBlobStore,
    stored: Notify,
    release: Notify,
}

#[async_trait]
impl BlobStore for HoldingBlobStore {
    async fn upload(&self, key: &str, body: Bytes, metadata: &BlobMetadata) -> BlobResult<StoredBlob> {
        let stored = self.inner.upload(key, body, metadata).await?;
        self.stored.notify_one();
        self.release.notified().await;
        Ok(stored)
    }

    async fn delete(&self, id: &BlobId) -> BlobResult<()> {
        self.inner.delete(id).await
    }

    async fn batch_delete(&self, ids: &[BlobId]) -> BlobResult<BatchDeleteResult> {
        self.inner.batch_delete(ids).await
    }

    async fn list_by_folder(&self, prefix: &str) -> BlobResult<Vec<BlobListing>> {
        self.inner.list_by_folder(prefix).await
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }
}

#[tokio::test]
async fn scan_skips_an_upload_still_in_flight() {
    let blobs = MemoryBlobStore::new();
    let holding = Arc::new(HoldingBlobStore {
        inner: blobs.clone(),
        stored: Notify::new(),
        release: Notify::new(),
    });
    let h = harness_with_blob_store(blobs, holding.clone());
    let (record, _) = record_with_attachment(&h).await;
    let ctx_a = ctx(CLINIC_A);
    let mut session = h.records.open_session(&ctx_a, &record.id).await.unwrap();

    // the blob is listable before the session learns its id
    let stage = session.stage_add(0, upload("scan.pdf"));
    let scan = async {
        holding.stored.notified().await;
        let report = h.records.find_orphans(&ctx_a).await.unwrap();
        holding.release.notify_one();
        report
    };
    let (added, report) = tokio::join!(stage, scan);

    let added = added.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.referenced, 1);
    assert_eq!(report.skipped_pending, 1);
    assert!(report.is_empty());
    assert!(h.blobs.contains(&added.remote_id));
    assert!(session.has_pending(&added.remote_id));
}
