use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    BlobConfig, BlobCtx, BlobError, BlobId, BlobKeyStrategy, BlobListing, BlobMetadata, BlobPut,
    BlobReceipt, BlobResult, BlobStore, DefaultKeyStrategy, DeletionReport, StoreCapabilities,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The blob adapter - this is what record services embed.
///
/// Wraps a [`BlobStore`] with the guarantees the store itself does not give:
/// every call is bounded by `BlobConfig::call_timeout`, deleting a missing
/// blob counts as success, and multi-blob deletes are fanned out so one
/// failure never blocks the others.
#[derive(Clone)]
pub struct BlobAdapter {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobConfig,
}

impl BlobAdapter {
    /// Create a new blob adapter
    pub fn new<S: BlobStore + 'static>(store: S, config: BlobConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create from a store that is shared elsewhere
    pub fn from_shared(store: Arc<dyn BlobStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    /// Replace the key strategy
    pub fn with_key_strategy<K: BlobKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// Upload a blob (single-shot).
    ///
    /// Fails without side effects if the body is empty or too large, and
    /// reports a timeout as a failed upload.
    #[instrument(skip(self, put, body), fields(tenant_id = %ctx.tenant_id, folder = %put.folder, size = body.len()))]
    pub async fn upload(&self, ctx: &BlobCtx, put: BlobPut, body: Bytes) -> BlobResult<BlobReceipt> {
        if body.is_empty() {
            return Err(BlobError::invalid("Refusing to upload an empty blob"));
        }
        let size = body.len() as u64;
        if size > self.config.max_blob_bytes {
            return Err(BlobError::invalid(format!(
                "Blob size {} exceeds maximum {}",
                size, self.config.max_blob_bytes
            )));
        }

        let unique = Uuid::new_v4().simple().to_string();
        let key = self
            .keys
            .object_key(&put.folder, &unique, put.filename.as_deref());
        let content_type = put
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut context = put.context;
        context
            .entry("tenant_id".to_string())
            .or_insert_with(|| ctx.tenant_id.clone());
        if let Some(filename) = &put.filename {
            context
                .entry("original_filename".to_string())
                .or_insert_with(|| filename.clone());
        }

        let metadata = BlobMetadata {
            tenant_id: ctx.tenant_id.clone(),
            folder: put.folder,
            filename: put.filename.clone(),
            content_type: content_type.clone(),
            tags: put.tags,
            context,
        };

        let stored = self
            .bounded("upload", self.store.upload(&key, body, &metadata))
            .await
            .map_err(|e| match e {
                BlobError::Invalid { .. } | BlobError::UploadFailed { .. } => e,
                other => BlobError::upload_failed(other.to_string()),
            })?;

        debug!("Uploaded blob {} ({} bytes)", stored.id, stored.size_bytes);

        let mut receipt = BlobReceipt::new(stored, key, content_type);
        if let Some(filename) = put.filename {
            receipt = receipt.with_filename(filename);
        }
        Ok(receipt)
    }

    /// Delete a blob. Already-deleted blobs count as success.
    pub async fn delete(&self, ctx: &BlobCtx, id: &BlobId) -> BlobResult<()> {
        match self.bounded("delete", self.store.delete(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(tenant_id = %ctx.tenant_id, "Blob {} already gone", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete each id independently and collect the outcome.
    ///
    /// Never fails as a whole; every failure is logged and reported.
    #[instrument(skip(self, ids), fields(tenant_id = %ctx.tenant_id, count = ids.len()))]
    pub async fn delete_many(&self, ctx: &BlobCtx, ids: Vec<BlobId>) -> DeletionReport {
        let ids = dedupe(ids);
        let outcomes: Vec<(BlobId, BlobResult<()>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.delete(ctx, &id).await;
                (id, result)
            })
            .buffer_unordered(self.config.max_concurrent_deletes.max(1))
            .collect()
            .await;

        let mut report = DeletionReport::new();
        for (id, result) in outcomes {
            match result {
                Ok(()) => report.record_deleted(id),
                Err(e) => {
                    warn!(tenant_id = %ctx.tenant_id, "Failed to delete blob {}: {}", id, e);
                    report.record_failed(id, e.to_string());
                }
            }
        }
        sort_report(&mut report);
        report
    }

    /// Delete many ids using the store's bulk API when it has one.
    ///
    /// A chunk whose bulk call fails outright is retried id by id.
    #[instrument(skip(self, ids), fields(tenant_id = %ctx.tenant_id, count = ids.len()))]
    pub async fn batch_delete(&self, ctx: &BlobCtx, ids: Vec<BlobId>) -> DeletionReport {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return DeletionReport::new();
        }

        let caps = self.store.capabilities();
        if !caps.supports_batch_delete {
            return self.delete_many(ctx, ids).await;
        }

        let chunk_size = caps
            .max_batch_size
            .map(|max| max.min(self.config.max_batch_delete))
            .unwrap_or(self.config.max_batch_delete)
            .max(1);

        let mut report = DeletionReport::new();
        for chunk in ids.chunks(chunk_size) {
            match self.bounded("batch delete", self.store.batch_delete(chunk)).await {
                Ok(result) => {
                    for failed in &result.failed {
                        warn!(tenant_id = %ctx.tenant_id, "Failed to delete blob {}: {}", failed.id, failed.reason);
                    }
                    report.merge(result.into());
                }
                Err(e) => {
                    warn!(tenant_id = %ctx.tenant_id, "Batch delete of {} blobs failed, retrying individually: {}", chunk.len(), e);
                    report.merge(self.delete_many(ctx, chunk.to_vec()).await);
                }
            }
        }
        sort_report(&mut report);
        report
    }

    /// List the blobs stored under `prefix`
    pub async fn list_folder(&self, ctx: &BlobCtx, prefix: &str) -> BlobResult<Vec<BlobListing>> {
        if !self.store.capabilities().supports_listing {
            return Err(BlobError::Unsupported);
        }
        let listing = self
            .bounded("list", self.store.list_by_folder(prefix))
            .await?;
        debug!(tenant_id = %ctx.tenant_id, "Listed {} blobs under {}", listing.len(), prefix);
        Ok(listing)
    }

    /// Get configuration
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> BlobResult<T>
    where
        F: Future<Output = BlobResult<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::timeout(operation, self.config.call_timeout)),
        }
    }
}

fn dedupe(ids: Vec<BlobId>) -> Vec<BlobId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn sort_report(report: &mut DeletionReport) {
    report.deleted.sort();
    report.failed.sort_by(|a, b| a.id.cmp(&b.id));
}
