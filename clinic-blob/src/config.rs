use std::time::Duration;

use clinic_core::ClinicConfigSnapshot;

/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single blob (safety guard)
    pub max_blob_bytes: u64,

    /// Upper bound for any single remote call (upload, delete, list)
    pub call_timeout: Duration,

    /// How many single deletes may be in flight during a fan-out
    pub max_concurrent_deletes: usize,

    /// Largest id list sent to the store in one batch delete call
    pub max_batch_delete: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 25 * 1024 * 1024, // 25MB
            call_timeout: Duration::from_secs(30),
            max_concurrent_deletes: 8,
            max_batch_delete: 100,
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve from `blob.*` keys, falling back to defaults.
    pub fn from_snapshot(snapshot: &ClinicConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_blob_bytes: snapshot
                .get_u64("blob.max_blob_bytes")
                .unwrap_or(defaults.max_blob_bytes),
            call_timeout: snapshot
                .get_u64("blob.call_timeout_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            max_concurrent_deletes: snapshot
                .get_usize("blob.max_concurrent_deletes")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_deletes),
            max_batch_delete: snapshot
                .get_usize("blob.max_batch_delete")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_batch_delete),
        }
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_deletes(mut self, n: usize) -> Self {
        self.max_concurrent_deletes = n.max(1);
        self
    }

    pub fn with_max_batch_delete(mut self, n: usize) -> Self {
        self.max_batch_delete = n.max(1);
        self
    }
}
