#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use clinic_blob::{BlobAdapter, BlobConfig, BlobMetadata, BlobStore, MemoryBlobStore};
use clinic_core::TenantContext;
use clinic_records::{
    AttachmentRef, AttachmentUpload, ClinicRecords, HistoryEntry, MemoryRecordStore,
    MemoryTenantDirectory, NewRecord, Record, RecordStore, RecordsConfig,
};

pub const CLINIC_A: &str = "clinic-a";
pub const CLINIC_B: &str = "clinic-b";

/// Service wired to in-memory stores, with handles kept for inspection
pub struct Harness {
    pub records: ClinicRecords,
    pub directory: Arc<MemoryTenantDirectory>,
    pub store: MemoryRecordStore,
    pub blobs: MemoryBlobStore,
}

pub fn harness() -> Harness {
    let store = MemoryRecordStore::new();
    harness_with_store(store.clone(), Arc::new(store))
}

/// Same as [`harness`] but records go through `records_store`, which is
/// expected to wrap `store`
pub fn harness_with_store(store: MemoryRecordStore, records_store: Arc<dyn RecordStore>) -> Harness {
    let blobs = MemoryBlobStore::new();
    build_harness(store, records_store, blobs.clone(), Arc::new(blobs))
}

/// Blobs go through `blob_store`, which is expected to wrap `blobs`
pub fn harness_with_blob_store(blobs: MemoryBlobStore, blob_store: Arc<dyn BlobStore>) -> Harness {
    let store = MemoryRecordStore::new();
    build_harness(store.clone(), Arc::new(store), blobs, blob_store)
}

fn build_harness(
    store: MemoryRecordStore,
    records_store: Arc<dyn RecordStore>,
    blobs: MemoryBlobStore,
    blob_store: Arc<dyn BlobStore>,
) -> Harness {
    let directory = Arc::new(MemoryTenantDirectory::new());
    directory.register(CLINIC_A, "Happy Clinic");
    directory.register(CLINIC_B, "Sunrise  Clinic");

    let records = ClinicRecords::new(
        directory.clone(),
        records_store,
        BlobAdapter::from_shared(blob_store, BlobConfig::default()),
        RecordsConfig::default(),
    );

    Harness {
        records,
        directory,
        store,
        blobs,
    }
}

pub fn ctx(tenant: &str) -> TenantContext {
    TenantContext::new(tenant)
}

pub fn upload(name: &str) -> AttachmentUpload {
    AttachmentUpload::new(name.to_string(), format!("bytes of {}", name).into_bytes())
        .with_content_type("application/pdf")
}

/// Put a blob straight into the store, as if committed earlier
pub fn seed_attachment(blobs: &MemoryBlobStore, tenant: &str, key: &str) -> AttachmentRef {
    let mut context = BTreeMap::new();
    context.insert("tenant_id".to_string(), tenant.to_string());
    let id = blobs.seed(
        key,
        b"existing",
        BlobMetadata {
            tenant_id: tenant.to_string(),
            folder: key.rsplit_once('/').map_or(key, |(folder, _)| folder).to_string(),
            filename: Some("existing.pdf".to_string()),
            content_type: "application/pdf".to_string(),
            tags: vec!["patient-document".to_string()],
            context,
        },
    );
    AttachmentRef {
        url: format!("memory://blobs/{}", key),
        remote_id: id,
        original_filename: "existing.pdf".to_string(),
        uploaded_at: Utc::now(),
    }
}

/// A record in clinic A whose only entry holds one pre-existing attachment
pub async fn record_with_attachment(h: &Harness) -> (Record, AttachmentRef) {
    let existing = seed_attachment(&h.blobs, CLINIC_A, "Happy_Clinic/HN0001/existing");
    let record = h
        .records
        .create_record(
            &ctx(CLINIC_A),
            NewRecord::new("Somchai").with_history(vec![
                HistoryEntry::new(Utc::now()).with_attachment(existing.clone())
            ]),
        )
        .await
        .unwrap();
    (record, existing)
}
