use std::collections::HashSet;

use clinic_blob::{BlobId, BlobListing};
use serde::Serialize;

use crate::session::PendingUploads;

/// Blobs under a tenant's folder that no record references
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrphanReport {
    /// Blobs listed under the tenant's folder prefix
    pub scanned: usize,
    /// Blobs in the folder tagged with another tenant
    pub foreign: usize,
    pub referenced: usize,
    /// Uploads of open sessions; not orphans yet
    pub skipped_pending: usize,
    pub orphans: Vec<BlobListing>,
}

impl OrphanReport {
    /// Sort `listings` into referenced, pending and orphaned blobs.
    ///
    /// Only blobs whose `tenant_id` context matches can be orphans; folder
    /// prefixes come from display names and are not guaranteed unique.
    pub(crate) fn classify(
        listings: Vec<BlobListing>,
        tenant_id: &str,
        referenced: &HashSet<BlobId>,
        pending: &PendingUploads,
    ) -> Self {
        let mut report = Self {
            scanned: listings.len(),
            ..Self::default()
        };
        for listing in listings {
            if listing.context.get("tenant_id").map(String::as_str) != Some(tenant_id) {
                report.foreign += 1;
            } else if referenced.contains(&listing.id) {
                report.referenced += 1;
            } else if pending.covers(&listing.id) {
                report.skipped_pending += 1;
            } else {
                report.orphans.push(listing);
            }
        }
        report.orphans.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }

    pub fn orphan_ids(&self) -> Vec<BlobId> {
        self.orphans.iter().map(|l| l.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, tenant: &str) -> BlobListing {
        BlobListing {
            id: BlobId::from(id),
            url: format!("memory://blobs/{}", id),
            tags: vec![],
            context: [("tenant_id".to_string(), tenant.to_string())].into_iter().collect(),
        }
    }

    #[test]
    fn pending_uploads_are_not_orphans() {
        let referenced: HashSet<BlobId> = [BlobId::from("a")].into_iter().collect();
        let pending = PendingUploads {
            ids: [BlobId::from("b")].into_iter().collect(),
            in_flight: vec!["Clinic/HN0002".to_string()],
        };

        let report = OrphanReport::classify(
            vec![
                listing("c", "t1"),
                listing("a", "t1"),
                listing("b", "t1"),
                listing("d", "t2"),
                listing("Clinic/HN0002/uploading.pdf", "t1"),
            ],
            "t1",
            &referenced,
            &pending,
        );

        assert_eq!(report.scanned, 5);
        assert_eq!(report.foreign, 1);
        assert_eq!(report.referenced, 1);
        assert_eq!(report.skipped_pending, 2);
        assert_eq!(report.orphan_ids(), vec![BlobId::from("c")]);
    }
}
