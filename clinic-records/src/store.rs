use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{HistoryEntry, Namespace, Record, RecordId, RecordResult};

/// Field a "highest" query sorts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Numeric order of the code suffix (`HN10000` > `HN9999`)
    SequentialCode,
    LastActivity,
}

/// Single-record lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    Id(RecordId),
    Code(String),
    SecondaryKey(String),
    /// Exact name match ignoring case and surrounding whitespace
    NameIgnoreCase(String),
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::Id(id) => &record.id == id,
            RecordFilter::Code(code) => record.sequential_code.as_str() == code,
            RecordFilter::SecondaryKey(key) => record.secondary_key.as_deref() == Some(key.as_str()),
            RecordFilter::NameIgnoreCase(name) => {
                record.name.trim().to_lowercase() == name.trim().to_lowercase()
            }
        }
    }
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub secondary_key: Option<Option<String>>,
    pub history: Option<Vec<HistoryEntry>>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn history(history: Vec<HistoryEntry>, at: DateTime<Utc>) -> Self {
        Self {
            history: Some(history),
            last_activity: Some(at),
            ..Self::default()
        }
    }

    pub fn apply(self, record: &mut Record) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(key) = self.secondary_key {
            record.secondary_key = key;
        }
        if let Some(history) = self.history {
            record.history = history;
        }
        if let Some(at) = self.last_activity {
            record.last_activity = at;
        }
    }
}

/// Record persistence, always scoped to one namespace.
///
/// `insert` must behave like a unique index on `sequential_code`: a second
/// record with an existing code fails with `RecordError::Conflict`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record with the highest value of `field`, if any
    async fn find_max(&self, ns: &Namespace, field: SortField) -> RecordResult<Option<Record>>;

    async fn find_one(&self, ns: &Namespace, filter: &RecordFilter) -> RecordResult<Option<Record>>;

    async fn find_all(&self, ns: &Namespace) -> RecordResult<Vec<Record>>;

    async fn insert(&self, ns: &Namespace, record: Record) -> RecordResult<Record>;

    async fn update(&self, ns: &Namespace, id: &RecordId, patch: RecordPatch) -> RecordResult<Record>;

    async fn delete(&self, ns: &Namespace, id: &RecordId) -> RecordResult<()>;
}
