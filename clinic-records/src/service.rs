use std::collections::HashSet;
use std::sync::Arc;

use clinic_blob::{BlobAdapter, BlobCtx, BlobId, DeletionReport};
use clinic_core::TenantContext;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::allocator::SequentialCodeAllocator;
use crate::import::{BulkImportReconciler, ImportReport, ImportRow};
use crate::ledger::{DocumentStagingLedger, UploadScope};
use crate::orphans::OrphanReport;
use crate::partition::{TenantDirectory, TenantPartitionRegistry};
use crate::session::{EditSession, SessionRegistry};
use crate::store::{RecordFilter, RecordStore};
use crate::{Namespace, NewRecord, Record, RecordError, RecordId, RecordResult, RecordsConfig, SequentialCode};

/// What `delete_record` did
#[derive(Debug, Clone, Serialize)]
pub struct DeleteRecordReport {
    pub record_id: RecordId,
    pub code: SequentialCode,
    pub record_deleted: bool,
    pub forced: bool,
    pub deletions: DeletionReport,
}

/// Entry point for everything that touches patient records.
///
/// Every call is scoped by the tenant in its `TenantContext`; the tenant's
/// namespace is resolved through the partition registry first, so an
/// unknown tenant fails before any storage is touched.
pub struct ClinicRecords {
    partitions: TenantPartitionRegistry,
    store: Arc<dyn RecordStore>,
    blobs: BlobAdapter,
    allocator: SequentialCodeAllocator,
    importer: BulkImportReconciler,
    sessions: SessionRegistry,
    config: RecordsConfig,
}

impl ClinicRecords {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        store: Arc<dyn RecordStore>,
        blobs: BlobAdapter,
        config: RecordsConfig,
    ) -> Self {
        let format = config.code_format();
        Self {
            partitions: TenantPartitionRegistry::new(directory, config.default_folder.clone()),
            allocator: SequentialCodeAllocator::new(
                store.clone(),
                format.clone(),
                config.max_allocation_attempts,
            ),
            importer: BulkImportReconciler::new(store.clone(), format, config.max_allocation_attempts),
            store,
            blobs,
            sessions: SessionRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &RecordsConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn partitions(&self) -> &TenantPartitionRegistry {
        &self.partitions
    }

    pub async fn namespace(&self, ctx: &TenantContext) -> RecordResult<Arc<Namespace>> {
        self.partitions.resolve(&ctx.tenant_id).await
    }

    /// Create a record under the next free code.
    #[instrument(skip(self, ctx, fields), fields(tenant_id = %ctx.tenant_id))]
    pub async fn create_record(&self, ctx: &TenantContext, fields: NewRecord) -> RecordResult<Record> {
        let ns = self.namespace(ctx).await?;
        let fields = fields.normalized();
        if fields.name.is_empty() {
            return Err(RecordError::validation("name is required"));
        }

        if let Some(key) = &fields.secondary_key {
            if let Some(existing) = self
                .store
                .find_one(&ns, &RecordFilter::SecondaryKey(key.clone()))
                .await?
            {
                return Err(RecordError::validation(format!(
                    "secondary key already belongs to {}",
                    existing.sequential_code
                )));
            }
        }

        let record = self.allocator.allocate_and_insert(&ns, fields).await?;
        info!("Created record {}", record.sequential_code);
        Ok(record)
    }

    pub async fn get_record(&self, ctx: &TenantContext, record_id: &RecordId) -> RecordResult<Record> {
        let ns = self.namespace(ctx).await?;
        self.fetch(&ns, record_id).await
    }

    /// Every record of the tenant in code order
    pub async fn list_records(&self, ctx: &TenantContext) -> RecordResult<Vec<Record>> {
        let ns = self.namespace(ctx).await?;
        let mut records = self.store.find_all(&ns).await?;
        records.sort_by(|a, b| crate::code::compare_codes(a.sequential_code.as_str(), b.sequential_code.as_str()));
        Ok(records)
    }

    /// Start editing a record's attachments.
    ///
    /// At most one session per record; a second one fails with
    /// `SessionAlreadyOpen` until the first ends or is dropped.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, record_id = %record_id))]
    pub async fn open_session(&self, ctx: &TenantContext, record_id: &RecordId) -> RecordResult<EditSession> {
        let ns = self.namespace(ctx).await?;
        let guard = self.sessions.try_acquire(&ns.tenant_id, record_id)?;
        let record = self.fetch(&ns, record_id).await?;

        let scope = UploadScope {
            ctx: BlobCtx::from(ctx),
            folder: ns.record_folder(record.sequential_code.as_str()),
            record_code: record.sequential_code.to_string(),
        };
        let ledger = DocumentStagingLedger::new(self.blobs.clone(), scope, record.history.clone());

        info!("Opened edit session on {}", record.sequential_code);
        Ok(EditSession::new(ns, self.store.clone(), record, ledger, guard))
    }

    #[instrument(skip(self, ctx, rows), fields(tenant_id = %ctx.tenant_id, rows = rows.len()))]
    pub async fn bulk_import(&self, ctx: &TenantContext, rows: Vec<ImportRow>) -> RecordResult<ImportReport> {
        let ns = self.namespace(ctx).await?;
        Ok(self.importer.import(&ns, rows).await)
    }

    /// Delete a record and all of its attachments.
    ///
    /// Blobs go first. If any of them fails to delete and `force_delete` is
    /// false, the record is kept so the user can retry; with `force_delete`
    /// the record is removed anyway and the failures are reported.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, record_id = %record_id))]
    pub async fn delete_record(
        &self,
        ctx: &TenantContext,
        record_id: &RecordId,
        force_delete: bool,
    ) -> RecordResult<DeleteRecordReport> {
        let ns = self.namespace(ctx).await?;
        let _guard = self.sessions.try_acquire(&ns.tenant_id, record_id)?;
        let record = self.fetch(&ns, record_id).await?;

        let ids = record.attachment_ids();
        let deletions = if ids.is_empty() {
            DeletionReport::new()
        } else {
            self.blobs.batch_delete(&BlobCtx::from(ctx), ids).await
        };

        let mut report = DeleteRecordReport {
            record_id: record.id.clone(),
            code: record.sequential_code.clone(),
            record_deleted: false,
            forced: force_delete,
            deletions,
        };

        if !report.deletions.is_clean() && !force_delete {
            warn!(
                failed = report.deletions.failed_count(),
                "Keeping record {}: some attachments could not be deleted",
                record.sequential_code
            );
            return Ok(report);
        }

        self.store.delete(&ns, &record.id).await?;
        report.record_deleted = true;

        if report.deletions.is_clean() {
            info!("Deleted record {}", record.sequential_code);
        } else {
            warn!(
                failed = report.deletions.failed_count(),
                "Force-deleted record {}; some attachments are orphaned",
                record.sequential_code
            );
        }
        Ok(report)
    }

    /// Blobs in the tenant's folder that no record references.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
    pub async fn find_orphans(&self, ctx: &TenantContext) -> RecordResult<OrphanReport> {
        let ns = self.namespace(ctx).await?;
        let listings = self
            .blobs
            .list_folder(&BlobCtx::from(ctx), &ns.folder_prefix)
            .await?;

        // listing, then pending, then records: a session leaves the registry
        // only after its record is persisted, so every listed upload is seen
        // in one of the two
        let pending = self.sessions.pending_uploads(&ns.tenant_id);
        let referenced: HashSet<BlobId> = self
            .store
            .find_all(&ns)
            .await?
            .iter()
            .flat_map(|r| r.attachment_ids())
            .collect();

        let report = OrphanReport::classify(listings, ns.tenant_id.as_str(), &referenced, &pending);
        info!(
            scanned = report.scanned,
            orphans = report.orphans.len(),
            "Scanned tenant folder for orphans"
        );
        Ok(report)
    }

    /// Delete everything [`find_orphans`](Self::find_orphans) reports.
    pub async fn sweep_orphans(&self, ctx: &TenantContext) -> RecordResult<DeletionReport> {
        let report = self.find_orphans(ctx).await?;
        if report.is_empty() {
            return Ok(DeletionReport::new());
        }
        Ok(self
            .blobs
            .batch_delete(&BlobCtx::from(ctx), report.orphan_ids())
            .await)
    }

    async fn fetch(&self, ns: &Namespace, record_id: &RecordId) -> RecordResult<Record> {
        self.store
            .find_one(ns, &RecordFilter::Id(record_id.clone()))
            .await?
            .ok_or_else(|| RecordError::not_found(record_id.as_str()))
    }
}
