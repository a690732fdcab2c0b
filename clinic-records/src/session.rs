//! Edit sessions over one record's attachments.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinic_blob::{BlobId, FailedDelete};
use clinic_core::TenantId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::ledger::{AttachmentUpload, DocumentStagingLedger, StagingOperation};
use crate::store::{RecordPatch, RecordStore};
use crate::{AttachmentRef, HistoryEntry, Namespace, Record, RecordError, RecordId, RecordResult};

type SessionKey = (TenantId, RecordId);

#[derive(Default)]
struct OpenSlot {
    uploads: HashSet<BlobId>,
    /// Record folder of uploads sent but not yet tracked
    folder: Option<String>,
    in_flight: usize,
}

/// Tracks which records currently have an open edit session and which
/// blobs those sessions uploaded.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    open: Arc<DashMap<SessionKey, OpenSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot of `(tenant_id, record_id)`; fails with
    /// `SessionAlreadyOpen` if another session holds it.
    pub fn try_acquire(&self, tenant_id: &TenantId, record_id: &RecordId) -> RecordResult<SessionGuard> {
        let key = (tenant_id.clone(), record_id.clone());
        match self.open.entry(key.clone()) {
            Entry::Occupied(_) => Err(RecordError::SessionAlreadyOpen {
                record_id: record_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(OpenSlot::default());
                Ok(SessionGuard {
                    open: self.open.clone(),
                    key,
                })
            }
        }
    }

    pub fn is_open(&self, tenant_id: &TenantId, record_id: &RecordId) -> bool {
        self.open.contains_key(&(tenant_id.clone(), record_id.clone()))
    }

    /// Uploads made, or still being made, by the tenant's open sessions
    pub fn pending_uploads(&self, tenant_id: &TenantId) -> PendingUploads {
        let mut pending = PendingUploads::default();
        for slot in self.open.iter().filter(|slot| &slot.key().0 == tenant_id) {
            pending.ids.extend(slot.uploads.iter().cloned());
            if slot.in_flight > 0 {
                pending.in_flight.extend(slot.folder.clone());
            }
        }
        pending
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Snapshot of what open sessions have put in storage
#[derive(Debug, Clone, Default)]
pub struct PendingUploads {
    pub ids: HashSet<BlobId>,
    /// Record folders with an upload whose id is not known yet
    pub in_flight: Vec<String>,
}

impl PendingUploads {
    pub fn covers(&self, id: &BlobId) -> bool {
        self.ids.contains(id)
            || self.in_flight.iter().any(|folder| {
                id.as_str()
                    .strip_prefix(folder.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.in_flight.is_empty()
    }
}

/// Holds a registry slot; released on drop.
pub struct SessionGuard {
    open: Arc<DashMap<SessionKey, OpenSlot>>,
    key: SessionKey,
}

impl SessionGuard {
    /// Mark an upload into `folder` as started. Orphan scans skip the folder
    /// until the returned ticket drops.
    fn begin_upload(&self, folder: &str) -> UploadTicket {
        if let Some(mut slot) = self.open.get_mut(&self.key) {
            slot.folder = Some(folder.to_string());
            slot.in_flight += 1;
        }
        UploadTicket {
            open: self.open.clone(),
            key: self.key.clone(),
        }
    }

    fn track_upload(&self, id: BlobId) {
        if let Some(mut slot) = self.open.get_mut(&self.key) {
            slot.uploads.insert(id);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.open.remove(&self.key);
    }
}

struct UploadTicket {
    open: Arc<DashMap<SessionKey, OpenSlot>>,
    key: SessionKey,
}

impl Drop for UploadTicket {
    fn drop(&mut self) {
        if let Some(mut slot) = self.open.get_mut(&self.key) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionOutcome {
    Committed,
    RolledBack,
    /// commit/rollback on a session that already ended
    AlreadyClosed,
}

/// What a commit or rollback did
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// Staged operations the ledger held
    pub operations: usize,
    pub deleted: usize,
    pub failed: usize,
    pub failures: Vec<FailedDelete>,
    /// Persisted record state after the call
    pub record: Record,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// One user's edit of one record.
///
/// Owns the record's staging ledger; dropping an open session releases the
/// registry slot without touching storage.
pub struct EditSession {
    ns: Arc<Namespace>,
    store: Arc<dyn RecordStore>,
    record: Record,
    ledger: DocumentStagingLedger,
    guard: Option<SessionGuard>,
    state: SessionState,
}

impl EditSession {
    pub(crate) fn new(
        ns: Arc<Namespace>,
        store: Arc<dyn RecordStore>,
        record: Record,
        ledger: DocumentStagingLedger,
        guard: SessionGuard,
    ) -> Self {
        Self {
            ns,
            store,
            record,
            ledger,
            guard: Some(guard),
            state: SessionState::Open,
        }
    }

    /// Persisted state of the record
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Current history as the user sees it
    pub fn view(&self) -> &[HistoryEntry] {
        self.ledger.view()
    }

    pub fn operations(&self) -> &[StagingOperation] {
        self.ledger.operations()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Start a new history entry in the view
    pub fn open_entry(&mut self, recorded_at: DateTime<Utc>, note: Option<String>) -> RecordResult<usize> {
        self.ensure_open()?;
        Ok(self.ledger.open_entry(recorded_at, note))
    }

    pub async fn stage_add(&mut self, entry_index: usize, file: AttachmentUpload) -> RecordResult<AttachmentRef> {
        self.ensure_open()?;
        // the blob can be listed before its id comes back
        let _ticket = self
            .guard
            .as_ref()
            .map(|guard| guard.begin_upload(&self.ledger.scope().folder));
        let attachment = self.ledger.stage_add(entry_index, file).await?;
        if let Some(guard) = &self.guard {
            guard.track_upload(attachment.remote_id.clone());
        }
        Ok(attachment)
    }

    pub fn stage_remove_single(&mut self, entry_index: usize, attachment_index: usize) -> RecordResult<AttachmentRef> {
        self.ensure_open()?;
        self.ledger.stage_remove_single(entry_index, attachment_index)
    }

    pub fn stage_remove_entry(&mut self, entry_index: usize) -> RecordResult<Vec<AttachmentRef>> {
        self.ensure_open()?;
        self.ledger.stage_remove_entry(entry_index)
    }

    pub fn undo_entry_deletion(&mut self, entry_index: usize) -> RecordResult<bool> {
        self.ensure_open()?;
        Ok(self.ledger.undo_entry_deletion(entry_index))
    }

    pub fn is_entry_marked_for_deletion(&self, entry_index: usize) -> bool {
        self.ledger.is_entry_marked_for_deletion(entry_index)
    }

    pub fn has_pending(&self, remote_id: &BlobId) -> bool {
        self.ledger.has_pending(remote_id)
    }

    /// Persist the final view, then delete every blob it no longer needs.
    ///
    /// If persisting fails nothing is deleted and the session stays open,
    /// so the caller can retry or roll back.
    #[instrument(skip(self), fields(tenant_id = %self.ns.tenant_id, record_code = %self.record.sequential_code))]
    pub async fn commit(&mut self) -> RecordResult<SessionReport> {
        if !self.is_open() {
            return Ok(self.closed_report());
        }

        let plan = self.ledger.plan_commit();
        if plan.changed {
            let patch = RecordPatch::history(plan.history.clone(), Utc::now());
            self.record = self.store.update(&self.ns, &self.record.id, patch).await?;
        }

        let outcome = self.ledger.apply_commit(plan).await;
        self.close(SessionState::Committed);

        info!(
            operations = outcome.operations,
            deleted = outcome.deletions.deleted_count(),
            failed = outcome.deletions.failed_count(),
            "Committed edit session"
        );
        Ok(SessionReport {
            outcome: SessionOutcome::Committed,
            operations: outcome.operations,
            deleted: outcome.deletions.deleted_count(),
            failed: outcome.deletions.failed_count(),
            failures: outcome.deletions.failed,
            record: self.record.clone(),
        })
    }

    /// Discard staged changes and delete this session's uploads.
    pub async fn rollback(&mut self) -> RecordResult<SessionReport> {
        if !self.is_open() {
            return Ok(self.closed_report());
        }

        let outcome = self.ledger.rollback().await;
        self.close(SessionState::RolledBack);

        Ok(SessionReport {
            outcome: SessionOutcome::RolledBack,
            operations: outcome.operations,
            deleted: outcome.deletions.deleted_count(),
            failed: outcome.deletions.failed_count(),
            failures: outcome.deletions.failed,
            record: self.record.clone(),
        })
    }

    fn ensure_open(&self) -> RecordResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(RecordError::SessionClosed)
        }
    }

    fn close(&mut self, state: SessionState) {
        self.state = state;
        self.guard = None;
    }

    fn closed_report(&self) -> SessionReport {
        SessionReport {
            outcome: SessionOutcome::AlreadyClosed,
            operations: 0,
            deleted: 0,
            failed: 0,
            failures: Vec::new(),
            record: self.record.clone(),
        }
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        if self.is_open() && !self.ledger.is_empty() {
            warn!(
                tenant_id = %self.ns.tenant_id,
                record_code = %self.record.sequential_code,
                operations = self.ledger.len(),
                uploads = self.ledger.session_uploads().len(),
                "Edit session dropped with staged changes; its uploads may be orphaned"
            );
        }
    }
}
