//! Tenant → namespace resolution.
//!
//! Every clinic's records live under their own store handle and their
//! blobs under their own folder prefix. The mapping is computed once per
//! tenant and cached for the lifetime of the registry; nothing here ever
//! creates a namespace for a tenant the directory does not know.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clinic_core::TenantId;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::{RecordError, RecordResult};

const STORE_HANDLE_PREFIX: &str = "patients_";
const UNSAFE_FOLDER_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// What the directory knows about a clinic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantProfile {
    pub id: TenantId,
    pub display_name: String,
}

/// Source of truth for which tenants exist
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup(&self, tenant_id: &TenantId) -> RecordResult<Option<TenantProfile>>;
}

/// In-memory tenant directory for tests and single-node deployments
#[derive(Default)]
pub struct MemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, TenantProfile>>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I: Into<TenantId>, S: Into<String>>(&self, id: I, display_name: S) {
        let id = id.into();
        self.tenants.write().insert(
            id.clone(),
            TenantProfile {
                id,
                display_name: display_name.into(),
            },
        );
    }

    /// Change a clinic's display name. Identity and derived handles stay.
    pub fn rename<S: Into<String>>(&self, id: &TenantId, display_name: S) -> bool {
        match self.tenants.write().get_mut(id) {
            Some(profile) => {
                profile.display_name = display_name.into();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn lookup(&self, tenant_id: &TenantId) -> RecordResult<Option<TenantProfile>> {
        Ok(self.tenants.read().get(tenant_id).cloned())
    }
}

/// Resolved storage identity of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub tenant_id: TenantId,
    /// Collection/table holding the tenant's records
    pub store_handle: String,
    /// Blob folder under which the tenant's files live
    pub folder_prefix: String,
}

impl Namespace {
    /// Folder for the files of one record
    pub fn record_folder(&self, code: &str) -> String {
        format!("{}/{}", self.folder_prefix, code)
    }
}

/// Process-lifetime cache of tenant namespaces.
///
/// Populated on first resolution, never invalidated; a fresh process
/// rebuilds it.
pub struct TenantPartitionRegistry {
    directory: Arc<dyn TenantDirectory>,
    cache: DashMap<TenantId, Arc<Namespace>>,
    default_folder: String,
}

impl TenantPartitionRegistry {
    pub fn new(directory: Arc<dyn TenantDirectory>, default_folder: impl Into<String>) -> Self {
        Self {
            directory,
            cache: DashMap::new(),
            default_folder: default_folder.into(),
        }
    }

    /// Resolve `tenant_id` to its namespace.
    ///
    /// Fails with `TenantNotFound` for tenants the directory does not know.
    pub async fn resolve(&self, tenant_id: &TenantId) -> RecordResult<Arc<Namespace>> {
        if let Some(ns) = self.cache.get(tenant_id) {
            return Ok(ns.value().clone());
        }

        let profile = self
            .directory
            .lookup(tenant_id)
            .await?
            .ok_or_else(|| RecordError::tenant_not_found(tenant_id.as_str()))?;

        let namespace = Arc::new(Namespace {
            tenant_id: profile.id.clone(),
            store_handle: store_handle_for(&profile.id),
            folder_prefix: folder_prefix_for(&profile.display_name, &self.default_folder),
        });

        // Two racing first resolutions compute the same value; keep whichever landed first.
        let cached = self
            .cache
            .entry(tenant_id.clone())
            .or_insert(namespace)
            .value()
            .clone();

        debug!(
            tenant_id = %tenant_id,
            store_handle = %cached.store_handle,
            folder_prefix = %cached.folder_prefix,
            "Resolved tenant namespace"
        );
        Ok(cached)
    }

    pub fn is_cached(&self, tenant_id: &TenantId) -> bool {
        self.cache.contains_key(tenant_id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// `patients_<id>` with the id lowercased and reduced to `[a-z0-9_]`.
pub fn store_handle_for(tenant_id: &TenantId) -> String {
    let id: String = tenant_id
        .as_str()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", STORE_HANDLE_PREFIX, id)
}

/// Folder prefix from a clinic display name.
///
/// Drops filesystem-unsafe and control characters, collapses whitespace
/// runs into one `_`, trims `_` from both ends and falls back to
/// `default_folder` when nothing is left.
pub fn folder_prefix_for(display_name: &str, default_folder: &str) -> String {
    let mut out = String::with_capacity(display_name.len());
    let mut pending_separator = false;

    for c in display_name.chars() {
        if UNSAFE_FOLDER_CHARS.contains(&c) || (c.is_control() && !c.is_whitespace()) {
            continue;
        }
        if c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            out.push('_');
            pending_separator = false;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        default_folder.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_strips_and_collapses() {
        assert_eq!(folder_prefix_for("  Happy   Teeth Clinic ", "d"), "Happy_Teeth_Clinic");
        assert_eq!(folder_prefix_for("A/B:C*D?", "d"), "ABCD");
        assert_eq!(folder_prefix_for("_Dr. Somchai_", "d"), "Dr._Somchai");
        assert_eq!(folder_prefix_for("คลินิก ทันตกรรม", "d"), "คลินิก_ทันตกรรม");
        assert_eq!(folder_prefix_for(" <>|\t ", "unnamed_clinic"), "unnamed_clinic");
    }

    #[test]
    fn store_handle_comes_from_id_only() {
        assert_eq!(store_handle_for(&TenantId::from("Clinic-42")), "patients_clinic_42");
        assert_eq!(store_handle_for(&TenantId::from("64f0a1")), "patients_64f0a1");
    }
}
