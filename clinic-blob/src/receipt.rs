use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BatchDeleteResult, BlobId, FailedDelete, StoredBlob};

/// Receipt returned after successfully storing a blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobReceipt {
    pub id: BlobId,
    pub key: String,
    pub url: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlobReceipt {
    /// Create a receipt from what the store returned
    pub fn new(stored: StoredBlob, key: String, content_type: String) -> Self {
        Self {
            id: stored.id,
            key,
            url: stored.url,
            size_bytes: stored.size_bytes,
            content_type,
            filename: None,
            created_at: Utc::now(),
        }
    }

    /// Set filename
    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Collected outcome of a best-effort delete fan-out.
///
/// Failures are data, not errors: callers decide whether a non-empty
/// `failed` list blocks anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub deleted: Vec<BlobId>,
    pub failed: Vec<FailedDelete>,
}

impl DeletionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.failed.is_empty()
    }

    pub fn record_deleted(&mut self, id: BlobId) {
        self.deleted.push(id);
    }

    pub fn record_failed<S: Into<String>>(&mut self, id: BlobId, reason: S) {
        self.failed.push(FailedDelete {
            id,
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: DeletionReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

impl From<BatchDeleteResult> for DeletionReport {
    fn from(result: BatchDeleteResult) -> Self {
        Self {
            deleted: result.deleted,
            failed: result.failed,
        }
    }
}
