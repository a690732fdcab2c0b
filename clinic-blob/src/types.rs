use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier the remote store assigned to a blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl BlobId {
    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BlobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Context for blob operations (tenant, user, request info)
#[derive(Debug, Clone)]
pub struct BlobCtx {
    pub tenant_id: String,
    pub actor_id: Option<String>,
    pub request_id: String,
}

impl BlobCtx {
    pub fn new(tenant_id: String) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_actor(mut self, actor_id: String) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }
}

impl From<&clinic_core::TenantContext> for BlobCtx {
    fn from(ctx: &clinic_core::TenantContext) -> Self {
        Self {
            tenant_id: ctx.tenant_id.to_string(),
            actor_id: ctx.actor_id.clone(),
            request_id: ctx.request_id.clone(),
        }
    }
}

/// Request to store a blob
#[derive(Debug, Clone, Default)]
pub struct BlobPut {
    /// Folder prefix the object is placed under (no trailing slash)
    pub folder: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub tags: Vec<String>,
    pub context: BTreeMap<String, String>,
}

impl BlobPut {
    pub fn new<S: Into<String>>(folder: S) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Everything the remote store is told about an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub tenant_id: String,
    pub folder: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub tags: Vec<String>,
    pub context: BTreeMap<String, String>,
}

/// What the store hands back after a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: BlobId,
    pub url: String,
    pub size_bytes: u64,
}

/// One resource found while listing a folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobListing {
    pub id: BlobId,
    pub url: String,
    pub tags: Vec<String>,
    pub context: BTreeMap<String, String>,
}

/// A delete that did not go through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelete {
    pub id: BlobId,
    pub reason: String,
}

/// Per-id outcome of a store-level batch delete
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteResult {
    pub deleted: Vec<BlobId>,
    pub failed: Vec<FailedDelete>,
}
