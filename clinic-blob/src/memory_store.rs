use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    BlobError, BlobId, BlobListing, BlobMetadata, BlobResult, BlobStore, StoreCapabilities,
    StoredBlob,
};

/// A blob held by [`MemoryBlobStore`]
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub body: Bytes,
    pub metadata: BlobMetadata,
}

/// In-memory blob store for testing and development.
///
/// Cloning shares the underlying storage, so a test can keep a handle for
/// inspection and fault injection while an adapter owns another.
#[derive(Clone)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<BTreeMap<String, MemoryObject>>>,
    /// Ids whose delete always fails
    failing_deletes: Arc<RwLock<HashSet<String>>>,
    fail_uploads: Arc<AtomicBool>,
    upload_delay: Arc<RwLock<Option<Duration>>>,
    /// Every id passed to delete, in call order
    delete_log: Arc<RwLock<Vec<BlobId>>>,
    base_url: String,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            failing_deletes: Arc::new(RwLock::new(HashSet::new())),
            fail_uploads: Arc::new(AtomicBool::new(false)),
            upload_delay: Arc::new(RwLock::new(None)),
            delete_log: Arc::new(RwLock::new(Vec::new())),
            base_url: "memory://blobs".to_string(),
        }
    }

    pub fn contains(&self, id: &BlobId) -> bool {
        self.objects.read().contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn ids(&self) -> Vec<BlobId> {
        self.objects.read().keys().cloned().map(BlobId).collect()
    }

    pub fn object(&self, id: &BlobId) -> Option<MemoryObject> {
        self.objects.read().get(id.as_str()).cloned()
    }

    /// Insert a blob directly, bypassing upload
    pub fn seed(&self, key: &str, body: &[u8], metadata: BlobMetadata) -> BlobId {
        self.objects.write().insert(
            key.to_string(),
            MemoryObject {
                body: Bytes::copy_from_slice(body),
                metadata,
            },
        );
        BlobId::from(key)
    }

    /// Make every delete of `id` fail until cleared
    pub fn fail_deletes_for(&self, id: &BlobId) {
        self.failing_deletes.write().insert(id.0.clone());
    }

    pub fn clear_delete_failures(&self) {
        self.failing_deletes.write().clear();
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Stall every upload, e.g. to trip the adapter timeout
    pub fn set_upload_delay(&self, delay: Option<Duration>) {
        *self.upload_delay.write() = delay;
    }

    pub fn delete_calls(&self) -> Vec<BlobId> {
        self.delete_log.read().clone()
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        metadata: &BlobMetadata,
    ) -> BlobResult<StoredBlob> {
        let delay = *self.upload_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::upload_failed("memory store rejected upload"));
        }

        let size_bytes = body.len() as u64;
        self.objects.write().insert(
            key.to_string(),
            MemoryObject {
                body,
                metadata: metadata.clone(),
            },
        );

        Ok(StoredBlob {
            id: BlobId::from(key),
            url: self.url_for(key),
            size_bytes,
        })
    }

    async fn delete(&self, id: &BlobId) -> BlobResult<()> {
        self.delete_log.write().push(id.clone());

        if self.failing_deletes.read().contains(id.as_str()) {
            return Err(BlobError::backend(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected delete failure for {}", id),
            )));
        }

        match self.objects.write().remove(id.as_str()) {
            Some(_) => Ok(()),
            None => Err(BlobError::not_found(id.as_str())),
        }
    }

    async fn list_by_folder(&self, prefix: &str) -> BlobResult<Vec<BlobListing>> {
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let objects = self.objects.read();
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(&folder))
            .map(|(key, object)| BlobListing {
                id: BlobId::from(key.as_str()),
                url: self.url_for(key),
                tags: object.metadata.tags.clone(),
                context: object.metadata.context.clone(),
            })
            .collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
            .with_batch_delete(Some(100))
            .with_listing()
    }
}
