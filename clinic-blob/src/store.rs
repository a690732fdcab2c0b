use async_trait::async_trait;
use bytes::Bytes;

use crate::{BatchDeleteResult, BlobId, BlobListing, BlobMetadata, BlobResult, FailedDelete, StoredBlob};

/// Remote blob storage operations - must be implemented by all storage backends
///
/// Implementations are network-bound and may fail or partially fail. They do
/// not need to apply timeouts; `BlobAdapter` bounds every call.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        metadata: &BlobMetadata,
    ) -> BlobResult<StoredBlob>;

    /// Delete a blob. A missing blob yields `BlobError::NotFound`.
    async fn delete(&self, id: &BlobId) -> BlobResult<()>;

    /// Delete several blobs in one call.
    ///
    /// The default walks the ids one by one; stores with a native bulk API
    /// should override it. Missing blobs count as deleted.
    async fn batch_delete(&self, ids: &[BlobId]) -> BlobResult<BatchDeleteResult> {
        let mut result = BatchDeleteResult::default();
        for id in ids {
            match self.delete(id).await {
                Ok(()) => result.deleted.push(id.clone()),
                Err(e) if e.is_not_found() => result.deleted.push(id.clone()),
                Err(e) => result.failed.push(FailedDelete {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(result)
    }

    /// List every blob whose key starts with `prefix/`
    async fn list_by_folder(&self, prefix: &str) -> BlobResult<Vec<BlobListing>>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub supports_batch_delete: bool,
    pub supports_listing: bool,
    pub max_batch_size: Option<usize>,
}

impl StoreCapabilities {
    pub fn basic() -> Self {
        Self {
            supports_batch_delete: false,
            supports_listing: false,
            max_batch_size: None,
        }
    }

    pub fn with_batch_delete(mut self, max_batch_size: Option<usize>) -> Self {
        self.supports_batch_delete = true;
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_listing(mut self) -> Self {
        self.supports_listing = true;
        self
    }
}

/// Strategy for generating blob keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Generate a key for a new blob under `folder`
    fn object_key(&self, folder: &str, unique: &str, filename: Option<&str>) -> String;
}

/// Default key strategy: `<folder>/<unique>-<sanitised filename>`
#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, folder: &str, unique: &str, filename: Option<&str>) -> String {
        let folder = folder.trim_matches('/');
        let name = filename.map(sanitize_filename).filter(|n| !n.is_empty());

        match (folder.is_empty(), name) {
            (true, None) => unique.to_string(),
            (true, Some(name)) => format!("{}-{}", unique, name),
            (false, None) => format!("{}/{}", folder, unique),
            (false, Some(name)) => format!("{}/{}-{}", folder, unique, name),
        }
    }
}

/// Reduce a client filename to characters that are safe in any object key.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches(|c| c == '_' || c == '.').to_string()
}
