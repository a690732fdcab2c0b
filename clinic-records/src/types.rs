use chrono::{DateTime, Utc};
use clinic_blob::BlobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::SequentialCode;

/// Storage identifier of a patient record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Pointer from a record to one blob in remote storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub remote_id: BlobId,
    pub url: String,
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One dated entry of a patient's history and the files attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

impl HistoryEntry {
    pub fn new(recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            note: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A patient record inside one tenant namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub tenant_id: String,
    pub sequential_code: SequentialCode,
    pub name: String,
    pub secondary_key: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Record {
    /// Every blob this record keeps alive
    pub fn attachment_ids(&self) -> Vec<BlobId> {
        self.history
            .iter()
            .flat_map(|entry| entry.attachments.iter())
            .map(|a| a.remote_id.clone())
            .collect()
    }

    pub fn attachment_count(&self) -> usize {
        self.history.iter().map(|e| e.attachments.len()).sum()
    }
}

/// Caller-supplied fields for a new record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecord {
    pub name: String,
    #[serde(default)]
    pub secondary_key: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl NewRecord {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_secondary_key<S: Into<String>>(mut self, key: S) -> Self {
        self.secondary_key = Some(key.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Trim fields; blank secondary keys become absent
    pub(crate) fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.secondary_key = normalize_key(self.secondary_key);
        self
    }
}

pub(crate) fn normalize_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}
