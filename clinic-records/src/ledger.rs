//! Session-scoped staging of attachment changes.
//!
//! The remote blob store and the record store share no transaction, so an
//! edit session records what the user did as an append-only list of
//! [`StagingOperation`]s. Uploads happen immediately (the UI needs the URL),
//! deletions are deferred. At the end of the session the log is replayed
//! into a per-blob classification:
//!
//! | referenced by            | rollback          | commit            |
//! |--------------------------|-------------------|-------------------|
//! | `Add` only               | delete            | keep              |
//! | `Add` + remove           | delete            | delete            |
//! | remove only (pre-existing)| keep             | delete            |
//!
//! After commit the live blobs of the record are exactly the attachments of
//! the final view.

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clinic_blob::{BlobAdapter, BlobCtx, BlobError, BlobId, BlobPut, DeletionReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{AttachmentRef, HistoryEntry, RecordError, RecordResult};

/// Tag put on every blob uploaded through a ledger
pub const DOCUMENT_TAG: &str = "patient-document";

/// A file the user wants to attach
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl AttachmentUpload {
    pub fn new<S: Into<String>>(filename: S, body: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagingKind {
    Add,
    RemoveSingle,
    RemoveEntry,
}

/// One user action against the record's attachments
#[derive(Debug, Clone)]
pub struct StagingOperation {
    pub id: Uuid,
    pub kind: StagingKind,
    pub target_entry_index: usize,
    /// The added or removed attachment (`Add`, `RemoveSingle`)
    pub attachment: Option<AttachmentRef>,
    /// Every attachment of the entry at marking time (`RemoveEntry`)
    pub affected: Vec<AttachmentRef>,
    pub created_in_this_session: bool,
    pub timestamp: DateTime<Utc>,
}

impl StagingOperation {
    fn new(
        kind: StagingKind,
        target_entry_index: usize,
        attachment: Option<AttachmentRef>,
        affected: Vec<AttachmentRef>,
        created_in_this_session: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_entry_index,
            attachment,
            affected,
            created_in_this_session,
            timestamp: Utc::now(),
        }
    }

    /// Blobs this operation refers to
    pub fn remote_ids(&self) -> impl Iterator<Item = &BlobId> {
        self.attachment
            .iter()
            .chain(self.affected.iter())
            .map(|a| &a.remote_id)
    }

    fn is_removal(&self) -> bool {
        matches!(self.kind, StagingKind::RemoveSingle | StagingKind::RemoveEntry)
    }
}

/// Where uploads of one session land
#[derive(Debug, Clone)]
pub struct UploadScope {
    pub ctx: BlobCtx,
    /// `<tenant folder>/<record code>`
    pub folder: String,
    pub record_code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Disposition {
    added: bool,
    removed: bool,
}

/// Result of [`DocumentStagingLedger::plan_commit`]; nothing has happened yet
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub history: Vec<HistoryEntry>,
    pub to_delete: Vec<BlobId>,
    pub operations: usize,
    /// Whether `history` differs from the state the session started from
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub history: Vec<HistoryEntry>,
    pub deletions: DeletionReport,
    pub operations: usize,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackOutcome {
    pub deletions: DeletionReport,
    pub operations: usize,
    /// Pre-existing attachments whose staged removal was discarded
    pub restored: usize,
}

/// The staged attachment changes of one edit session.
///
/// Owned by exactly one session and mutated through `&mut self` only.
pub struct DocumentStagingLedger {
    blobs: BlobAdapter,
    scope: UploadScope,
    baseline: Vec<HistoryEntry>,
    view: Vec<HistoryEntry>,
    operations: Vec<StagingOperation>,
}

impl DocumentStagingLedger {
    pub fn new(blobs: BlobAdapter, scope: UploadScope, history: Vec<HistoryEntry>) -> Self {
        Self {
            blobs,
            scope,
            baseline: history.clone(),
            view: history,
            operations: Vec::new(),
        }
    }

    /// What the user currently sees, entries marked for deletion included
    pub fn view(&self) -> &[HistoryEntry] {
        &self.view
    }

    /// State at the start of the session (or the last commit)
    pub fn baseline(&self) -> &[HistoryEntry] {
        &self.baseline
    }

    pub fn operations(&self) -> &[StagingOperation] {
        &self.operations
    }

    pub fn scope(&self) -> &UploadScope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Append an empty history entry to the view and return its index.
    ///
    /// Not logged: it only exists in the view until commit.
    pub fn open_entry(&mut self, recorded_at: DateTime<Utc>, note: Option<String>) -> usize {
        self.view.push(HistoryEntry {
            recorded_at,
            note,
            attachments: Vec::new(),
        });
        self.view.len() - 1
    }

    /// Upload `file` now and show it under entry `entry_index`.
    ///
    /// Nothing is logged unless the upload succeeded within the timeout.
    #[instrument(skip(self, file), fields(tenant_id = %self.scope.ctx.tenant_id, record_code = %self.scope.record_code, filename = %file.filename))]
    pub async fn stage_add(&mut self, entry_index: usize, file: AttachmentUpload) -> RecordResult<AttachmentRef> {
        self.check_entry(entry_index)?;

        let mut put = BlobPut::new(self.scope.folder.clone())
            .with_filename(file.filename.clone())
            .with_tag(DOCUMENT_TAG)
            .with_context("record_code", self.scope.record_code.clone());
        if let Some(content_type) = file.content_type {
            put = put.with_content_type(content_type);
        }

        let receipt = self
            .blobs
            .upload(&self.scope.ctx, put, file.body)
            .await
            .map_err(|e| match e {
                BlobError::Invalid { message } => RecordError::validation(message),
                other => RecordError::upload_failed(other.to_string()),
            })?;

        let attachment = AttachmentRef {
            remote_id: receipt.id,
            url: receipt.url,
            original_filename: file.filename,
            uploaded_at: receipt.created_at,
        };

        self.view[entry_index].attachments.push(attachment.clone());
        self.operations.push(StagingOperation::new(
            StagingKind::Add,
            entry_index,
            Some(attachment.clone()),
            Vec::new(),
            true,
        ));

        debug!("Staged upload {}", attachment.remote_id);
        Ok(attachment)
    }

    /// Hide one attachment from the view; the blob stays until commit.
    pub fn stage_remove_single(
        &mut self,
        entry_index: usize,
        attachment_index: usize,
    ) -> RecordResult<AttachmentRef> {
        self.check_entry(entry_index)?;
        let attachments = &mut self.view[entry_index].attachments;
        if attachment_index >= attachments.len() {
            return Err(RecordError::validation(format!(
                "entry {} has no attachment at index {}",
                entry_index, attachment_index
            )));
        }

        let removed = attachments.remove(attachment_index);
        let created = self.added_in_session(&removed.remote_id);
        self.operations.push(StagingOperation::new(
            StagingKind::RemoveSingle,
            entry_index,
            Some(removed.clone()),
            Vec::new(),
            created,
        ));

        debug!(record_code = %self.scope.record_code, "Staged removal of {}", removed.remote_id);
        Ok(removed)
    }

    /// Mark a whole entry for deletion; it stays in the view until commit.
    pub fn stage_remove_entry(&mut self, entry_index: usize) -> RecordResult<Vec<AttachmentRef>> {
        self.check_entry(entry_index)?;

        let affected = self.view[entry_index].attachments.clone();
        let created = !affected.is_empty()
            && affected.iter().all(|a| self.added_in_session(&a.remote_id));
        self.operations.push(StagingOperation::new(
            StagingKind::RemoveEntry,
            entry_index,
            None,
            affected.clone(),
            created,
        ));

        debug!(
            record_code = %self.scope.record_code,
            "Marked entry {} ({} attachments) for deletion",
            entry_index,
            affected.len()
        );
        Ok(affected)
    }

    /// Whether any staged operation refers to `remote_id`
    pub fn has_pending(&self, remote_id: &BlobId) -> bool {
        self.operations
            .iter()
            .any(|op| op.remote_ids().any(|id| id == remote_id))
    }

    pub fn is_entry_marked_for_deletion(&self, entry_index: usize) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind == StagingKind::RemoveEntry && op.target_entry_index == entry_index)
    }

    /// Drop the `RemoveEntry` mark of an entry. Returns false if none existed.
    pub fn undo_entry_deletion(&mut self, entry_index: usize) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| {
            !(op.kind == StagingKind::RemoveEntry && op.target_entry_index == entry_index)
        });
        before != self.operations.len()
    }

    /// Blobs uploaded during this session (whether or not removed again)
    pub fn session_uploads(&self) -> Vec<BlobId> {
        self.classify()
            .into_iter()
            .filter(|(_, d)| d.added)
            .map(|(id, _)| id)
            .collect()
    }

    /// Work out what commit would persist and delete, without doing it.
    pub fn plan_commit(&self) -> CommitPlan {
        let history: Vec<HistoryEntry> = self
            .view
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.is_entry_marked_for_deletion(*i))
            .map(|(_, entry)| entry.clone())
            .collect();

        let live: HashSet<&BlobId> = history
            .iter()
            .flat_map(|e| e.attachments.iter())
            .map(|a| &a.remote_id)
            .collect();

        let to_delete = self
            .classify()
            .into_iter()
            .filter(|(id, d)| d.removed && !live.contains(id))
            .map(|(id, _)| id)
            .collect();

        CommitPlan {
            changed: history != self.baseline,
            history,
            to_delete,
            operations: self.operations.len(),
        }
    }

    /// Carry out a plan from [`plan_commit`](Self::plan_commit): delete the
    /// removed blobs, make the planned history the new baseline, clear the log.
    ///
    /// Delete failures are reported, never raised.
    pub async fn apply_commit(&mut self, plan: CommitPlan) -> CommitOutcome {
        let deletions = if plan.to_delete.is_empty() {
            DeletionReport::new()
        } else {
            self.blobs
                .delete_many(&self.scope.ctx, plan.to_delete)
                .await
        };

        if !deletions.is_clean() {
            warn!(
                tenant_id = %self.scope.ctx.tenant_id,
                record_code = %self.scope.record_code,
                "Commit left {} orphaned blobs",
                deletions.failed_count()
            );
        }

        self.baseline = plan.history.clone();
        self.view = plan.history.clone();
        self.operations.clear();

        CommitOutcome {
            history: plan.history,
            deletions,
            operations: plan.operations,
            changed: plan.changed,
        }
    }

    /// Plan and apply in one step
    pub async fn commit(&mut self) -> CommitOutcome {
        let plan = self.plan_commit();
        self.apply_commit(plan).await
    }

    /// Discard the session: delete everything uploaded during it and put
    /// the view back to the baseline. Pre-existing blobs are never touched.
    #[instrument(skip(self), fields(tenant_id = %self.scope.ctx.tenant_id, record_code = %self.scope.record_code))]
    pub async fn rollback(&mut self) -> RollbackOutcome {
        if self.operations.is_empty() && self.view == self.baseline {
            return RollbackOutcome::default();
        }

        let classified = self.classify();
        let restored = classified
            .values()
            .filter(|d| d.removed && !d.added)
            .count();
        let to_delete: Vec<BlobId> = classified
            .into_iter()
            .filter(|(_, d)| d.added)
            .map(|(id, _)| id)
            .collect();

        let deletions = if to_delete.is_empty() {
            DeletionReport::new()
        } else {
            self.blobs.delete_many(&self.scope.ctx, to_delete).await
        };

        if !deletions.is_clean() {
            warn!(
                "Rollback could not delete {} session uploads; they are now orphaned",
                deletions.failed_count()
            );
        }

        let operations = self.operations.len();
        self.view = self.baseline.clone();
        self.operations.clear();

        info!(
            operations,
            deleted = deletions.deleted_count(),
            restored,
            "Rolled back staged attachments"
        );
        RollbackOutcome {
            deletions,
            operations,
            restored,
        }
    }

    fn classify(&self) -> BTreeMap<BlobId, Disposition> {
        let mut classified: BTreeMap<BlobId, Disposition> = BTreeMap::new();
        for op in &self.operations {
            for id in op.remote_ids() {
                let disposition = classified.entry(id.clone()).or_default();
                if op.is_removal() {
                    disposition.removed = true;
                } else {
                    disposition.added = true;
                }
            }
        }
        classified
    }

    fn added_in_session(&self, remote_id: &BlobId) -> bool {
        self.operations.iter().any(|op| {
            op.kind == StagingKind::Add
                && op.attachment.as_ref().map(|a| &a.remote_id) == Some(remote_id)
        })
    }

    fn check_entry(&self, entry_index: usize) -> RecordResult<()> {
        if entry_index >= self.view.len() {
            return Err(RecordError::validation(format!(
                "no history entry at index {}",
                entry_index
            )));
        }
        if self.is_entry_marked_for_deletion(entry_index) {
            return Err(RecordError::validation(format!(
                "history entry {} is marked for deletion",
                entry_index
            )));
        }
        Ok(())
    }
}
