//! Bulk import of patient rows into one namespace.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::{RecordFilter, RecordStore, SortField};
use crate::types::normalize_key;
use crate::{CodeFormat, Namespace, Record, RecordError, RecordId, RecordResult, SequentialCode};

/// One incoming row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    #[serde(default)]
    pub secondary_key: Option<String>,
    /// Explicit code to keep instead of allocating one
    #[serde(default)]
    pub code: Option<String>,
}

impl ImportRow {
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

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    Created,
    DuplicateSkipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    /// Zero-based position in the input
    pub row: usize,
    pub status: RowStatus,
    /// Code the row was stored under
    pub code: Option<SequentialCode>,
    pub message: Option<String>,
    /// Code of the existing record a duplicate matched
    pub matched_code: Option<SequentialCode>,
    pub warnings: Vec<String>,
}

impl RowOutcome {
    fn new(row: usize, status: RowStatus) -> Self {
        Self {
            row,
            status,
            code: None,
            message: None,
            matched_code: None,
            warnings: Vec::new(),
        }
    }

    fn failed(row: usize, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(row, RowStatus::Failed);
        outcome.message = Some(message.into());
        outcome
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duplicates_skipped: usize,
    pub rows: Vec<RowOutcome>,
}

impl ImportReport {
    fn push(&mut self, outcome: RowOutcome) {
        match outcome.status {
            RowStatus::Created => self.succeeded += 1,
            RowStatus::DuplicateSkipped => self.duplicates_skipped += 1,
            RowStatus::Failed => self.failed += 1,
        }
        self.rows.push(outcome);
    }

    pub fn failed_rows(&self) -> impl Iterator<Item = &RowOutcome> {
        self.rows.iter().filter(|r| r.status == RowStatus::Failed)
    }

    /// Codes created by this import, in row order
    pub fn created_codes(&self) -> Vec<SequentialCode> {
        self.rows
            .iter()
            .filter(|r| r.status == RowStatus::Created)
            .filter_map(|r| r.code.clone())
            .collect()
    }
}

/// Inserts a batch of rows, skipping known patients and allocating codes
/// from a batch-local counter.
///
/// The counter is seeded once from the namespace maximum; every candidate is
/// still re-checked against the store before insert, and a collision bumps
/// the counter instead of failing the row.
pub struct BulkImportReconciler {
    store: Arc<dyn RecordStore>,
    format: CodeFormat,
    max_attempts: u32,
}

impl BulkImportReconciler {
    pub fn new(store: Arc<dyn RecordStore>, format: CodeFormat, max_attempts: u32) -> Self {
        Self {
            store,
            format,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn import(&self, ns: &Namespace, rows: Vec<ImportRow>) -> ImportReport {
        let mut report = ImportReport {
            processed: rows.len(),
            ..ImportReport::default()
        };

        let mut counter = match self.seed_counter(ns).await {
            Ok(counter) => counter,
            Err(e) => {
                warn!(tenant_id = %ns.tenant_id, error = %e, "Could not seed import counter");
                for row in 0..rows.len() {
                    report.push(RowOutcome::failed(row, e.to_string()));
                }
                return report;
            }
        };

        for (index, row) in rows.into_iter().enumerate() {
            let outcome = match self.import_row(ns, index, row, &mut counter).await {
                Ok(outcome) => outcome,
                Err(e) => RowOutcome::failed(index, e.to_string()),
            };
            report.push(outcome);
        }

        info!(
            tenant_id = %ns.tenant_id,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            duplicates_skipped = report.duplicates_skipped,
            "Bulk import finished"
        );
        report
    }

    async fn seed_counter(&self, ns: &Namespace) -> RecordResult<u64> {
        let highest = self.store.find_max(ns, SortField::SequentialCode).await?;
        Ok(highest
            .and_then(|r| r.sequential_code.number())
            .map_or(1, |n| n.saturating_add(1)))
    }

    async fn import_row(
        &self,
        ns: &Namespace,
        index: usize,
        row: ImportRow,
        counter: &mut u64,
    ) -> RecordResult<RowOutcome> {
        let name = row.name.trim().to_string();
        if name.is_empty() {
            return Ok(RowOutcome::failed(index, "name is required"));
        }
        let secondary_key = normalize_key(row.secondary_key);
        let explicit = match row.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            // stored in rendered form so HN10 and HN0010 cannot coexist
            Some(code) => match self.format.parse(code) {
                Some(n) => Some((self.format.render(n), n)),
                None => {
                    return Ok(RowOutcome::failed(
                        index,
                        format!(
                            "code {:?} must be {} followed by digits",
                            code,
                            self.format.prefix()
                        ),
                    ))
                }
            },
            None => None,
        };

        if let Some(key) = &secondary_key {
            if let Some(existing) = self
                .store
                .find_one(ns, &RecordFilter::SecondaryKey(key.clone()))
                .await?
            {
                debug!(tenant_id = %ns.tenant_id, row = index, "Skipping known patient {}", existing.sequential_code);
                let mut outcome = RowOutcome::new(index, RowStatus::DuplicateSkipped);
                outcome.message = Some(format!("secondary key already belongs to {}", existing.sequential_code));
                outcome.matched_code = Some(existing.sequential_code);
                return Ok(outcome);
            }
        }

        let mut warnings = Vec::new();
        if let Some(namesake) = self
            .store
            .find_one(ns, &RecordFilter::NameIgnoreCase(name.clone()))
            .await?
        {
            warn!(
                tenant_id = %ns.tenant_id,
                row = index,
                "Name {:?} already used by {}; importing as a separate patient",
                name,
                namesake.sequential_code
            );
            warnings.push(format!("same name as {}", namesake.sequential_code));
        }

        let record = match explicit {
            Some((code, n)) => {
                if self
                    .store
                    .find_one(ns, &RecordFilter::Code(code.as_str().to_string()))
                    .await?
                    .is_some()
                {
                    let mut outcome = RowOutcome::failed(index, format!("code {} already in use", code));
                    outcome.warnings = warnings;
                    return Ok(outcome);
                }
                let record = self
                    .store
                    .insert(ns, new_record(ns, code, name, secondary_key))
                    .await?;
                *counter = (*counter).max(n.saturating_add(1));
                record
            }
            None => self.insert_with_counter(ns, name, secondary_key, counter).await?,
        };

        let mut outcome = RowOutcome::new(index, RowStatus::Created);
        outcome.code = Some(record.sequential_code);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    async fn insert_with_counter(
        &self,
        ns: &Namespace,
        name: String,
        secondary_key: Option<String>,
        counter: &mut u64,
    ) -> RecordResult<Record> {
        for _ in 0..self.max_attempts {
            let candidate = self.format.render(*counter);
            *counter = counter.saturating_add(1);

            if self
                .store
                .find_one(ns, &RecordFilter::Code(candidate.as_str().to_string()))
                .await?
                .is_some()
            {
                continue;
            }

            match self
                .store
                .insert(ns, new_record(ns, candidate, name.clone(), secondary_key.clone()))
                .await
            {
                Ok(record) => return Ok(record),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RecordError::CodeAllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}

fn new_record(ns: &Namespace, code: SequentialCode, name: String, secondary_key: Option<String>) -> Record {
    let now = Utc::now();
    Record {
        id: RecordId::new(),
        tenant_id: ns.tenant_id.to_string(),
        sequential_code: code,
        name,
        secondary_key,
        history: Vec::new(),
        created_at: now,
        last_activity: now,
    }
}
