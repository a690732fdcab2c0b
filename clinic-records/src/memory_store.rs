use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::code::compare_codes;
use crate::store::{RecordFilter, RecordPatch, RecordStore, SortField};
use crate::{Namespace, Record, RecordError, RecordId, RecordResult};

// store_handle -> records in insertion order
type Collections = HashMap<String, Vec<Record>>;

/// In-memory record store for testing and development.
///
/// Each namespace's `store_handle` maps to its own collection, so one
/// tenant's queries can never see another tenant's records.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a namespace
    pub fn count(&self, ns: &Namespace) -> usize {
        self.collections
            .read()
            .get(&ns.store_handle)
            .map_or(0, |c| c.len())
    }

    /// Handles of every collection created so far
    pub fn store_handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.collections.read().keys().cloned().collect();
        handles.sort();
        handles
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_max(&self, ns: &Namespace, field: SortField) -> RecordResult<Option<Record>> {
        let collections = self.collections.read();
        let Some(records) = collections.get(&ns.store_handle) else {
            return Ok(None);
        };
        let best = match field {
            SortField::SequentialCode => records.iter().max_by(|a, b| {
                compare_codes(a.sequential_code.as_str(), b.sequential_code.as_str())
            }),
            SortField::LastActivity => records.iter().max_by_key(|r| r.last_activity),
        };
        Ok(best.cloned())
    }

    async fn find_one(&self, ns: &Namespace, filter: &RecordFilter) -> RecordResult<Option<Record>> {
        let collections = self.collections.read();
        Ok(collections
            .get(&ns.store_handle)
            .and_then(|records| records.iter().find(|r| filter.matches(r)))
            .cloned())
    }

    async fn find_all(&self, ns: &Namespace) -> RecordResult<Vec<Record>> {
        Ok(self
            .collections
            .read()
            .get(&ns.store_handle)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert(&self, ns: &Namespace, record: Record) -> RecordResult<Record> {
        let mut collections = self.collections.write();
        let records = collections.entry(ns.store_handle.clone()).or_default();

        if records
            .iter()
            .any(|r| r.sequential_code == record.sequential_code)
        {
            return Err(RecordError::conflict(record.sequential_code.as_str()));
        }
        if records.iter().any(|r| r.id == record.id) {
            return Err(RecordError::store(format!("duplicate record id {}", record.id)));
        }

        records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, ns: &Namespace, id: &RecordId, patch: RecordPatch) -> RecordResult<Record> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(&ns.store_handle)
            .and_then(|records| records.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| RecordError::not_found(id.as_str()))?;

        patch.apply(record);
        Ok(record.clone())
    }

    async fn delete(&self, ns: &Namespace, id: &RecordId) -> RecordResult<()> {
        let mut collections = self.collections.write();
        let records = collections
            .get_mut(&ns.store_handle)
            .ok_or_else(|| RecordError::not_found(id.as_str()))?;

        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(RecordError::not_found(id.as_str()));
        }
        Ok(())
    }
}
