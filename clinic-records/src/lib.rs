//! # clinic-records: tenant-partitioned patient records
//!
//! Patient records live in one namespace per clinic and get a human-readable
//! sequential code (`HN0001`, `HN0002`, ...). Their attachments live in a
//! remote blob store that shares no transaction with the record store, so
//! attachment edits go through an [`EditSession`]: uploads happen right
//! away, deletions are deferred, and the session's staging ledger decides at
//! commit or rollback which blobs must go.
//!
//! ```text
//! ┌──────────────────────────┐
//! │      ClinicRecords       │  ← create, open_session, bulk_import, delete
//! ├────────────┬─────────────┤
//! │ partitions │  allocator  │  ← tenant → namespace, next free code
//! ├────────────┴─────────────┤
//! │ EditSession + ledger     │  ← staged attachment changes
//! ├─────────────┬────────────┤
//! │ RecordStore │ BlobAdapter│
//! └─────────────┴────────────┘
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use clinic_blob::{BlobAdapter, BlobConfig, MemoryBlobStore};
//! use clinic_core::TenantContext;
//! use clinic_records::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> RecordResult<()> {
//! let directory = Arc::new(MemoryTenantDirectory::new());
//! directory.register("clinic-1", "Happy Clinic");
//!
//! let records = ClinicRecords::new(
//!     directory,
//!     Arc::new(MemoryRecordStore::new()),
//!     BlobAdapter::new(MemoryBlobStore::new(), BlobConfig::default()),
//!     RecordsConfig::default(),
//! );
//!
//! let ctx = TenantContext::new("clinic-1");
//! let record = records.create_record(&ctx, NewRecord::new("Somchai")).await?;
//! assert_eq!(record.sequential_code.as_str(), "HN0001");
//!
//! let mut session = records.open_session(&ctx, &record.id).await?;
//! let entry = session.open_entry(chrono::Utc::now(), None)?;
//! session
//!     .stage_add(entry, AttachmentUpload::new("xray.png", &b"png"[..]))
//!     .await?;
//! let report = session.commit().await?;
//! assert_eq!(report.record.attachment_count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
mod code;
mod config;
mod error;
pub mod import;
pub mod ledger;
mod memory_store;
mod orphans;
pub mod partition;
mod service;
pub mod session;
pub mod store;
mod types;

pub use allocator::SequentialCodeAllocator;
pub use code::{compare_codes, numeric_suffix, CodeFormat, SequentialCode};
pub use config::RecordsConfig;
pub use error::{RecordError, RecordResult};
pub use import::{BulkImportReconciler, ImportReport, ImportRow, RowOutcome, RowStatus};
pub use ledger::{
    AttachmentUpload, CommitOutcome, CommitPlan, DocumentStagingLedger, RollbackOutcome, StagingKind,
    StagingOperation, UploadScope,
};
pub use memory_store::MemoryRecordStore;
pub use orphans::OrphanReport;
pub use partition::{
    MemoryTenantDirectory, Namespace, TenantDirectory, TenantPartitionRegistry, TenantProfile,
};
pub use service::{ClinicRecords, DeleteRecordReport};
pub use session::{EditSession, PendingUploads, SessionOutcome, SessionRegistry, SessionReport, SessionState};
pub use store::{RecordFilter, RecordPatch, RecordStore, SortField};
pub use types::{AttachmentRef, HistoryEntry, NewRecord, Record, RecordId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AttachmentUpload, ClinicRecords, EditSession, ImportRow, MemoryRecordStore,
        MemoryTenantDirectory, NewRecord, Record, RecordError, RecordId, RecordResult,
        RecordsConfig, SessionOutcome,
    };
}
