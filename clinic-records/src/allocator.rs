use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::store::{RecordFilter, RecordStore, SortField};
use crate::{
    CodeFormat, Namespace, NewRecord, Record, RecordError, RecordId, RecordResult, SequentialCode,
};

/// Hands out the next sequential code of a namespace.
///
/// There is no dedicated counter: the next code is derived from the highest
/// stored one, so every result is only a candidate until the insert lands.
pub struct SequentialCodeAllocator {
    store: Arc<dyn RecordStore>,
    format: CodeFormat,
    max_attempts: u32,
}

impl SequentialCodeAllocator {
    pub fn new(store: Arc<dyn RecordStore>, format: CodeFormat, max_attempts: u32) -> Self {
        Self {
            store,
            format,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn format(&self) -> &CodeFormat {
        &self.format
    }

    /// Successor of the highest code in `ns`, or the first code
    pub async fn next_code(&self, ns: &Namespace) -> RecordResult<SequentialCode> {
        let highest = self.store.find_max(ns, SortField::SequentialCode).await?;
        Ok(self
            .format
            .next_after(highest.as_ref().map(|r| r.sequential_code.as_str())))
    }

    /// Allocate a code and insert the record under it.
    ///
    /// Re-checks the candidate right before inserting and recomputes on a
    /// collision or an insert `Conflict`; gives up with
    /// `CodeAllocationExhausted` after `max_attempts` candidates.
    pub async fn allocate_and_insert(&self, ns: &Namespace, fields: NewRecord) -> RecordResult<Record> {
        let id = RecordId::new();

        for attempt in 1..=self.max_attempts {
            let candidate = self.next_code(ns).await?;

            if self
                .store
                .find_one(ns, &RecordFilter::Code(candidate.as_str().to_string()))
                .await?
                .is_some()
            {
                debug!(tenant_id = %ns.tenant_id, attempt, "Candidate {} already taken", candidate);
                continue;
            }

            let now = Utc::now();
            let record = Record {
                id: id.clone(),
                tenant_id: ns.tenant_id.to_string(),
                sequential_code: candidate.clone(),
                name: fields.name.clone(),
                secondary_key: fields.secondary_key.clone(),
                history: fields.history.clone(),
                created_at: now,
                last_activity: now,
            };

            match self.store.insert(ns, record).await {
                Ok(inserted) => {
                    debug!(tenant_id = %ns.tenant_id, attempt, "Allocated code {}", inserted.sequential_code);
                    return Ok(inserted);
                }
                Err(e) if e.is_conflict() => {
                    debug!(tenant_id = %ns.tenant_id, attempt, "Lost insert race for {}", candidate);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            tenant_id = %ns.tenant_id,
            attempts = self.max_attempts,
            "Code allocation exhausted"
        );
        Err(RecordError::CodeAllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
