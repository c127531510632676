use anyhow::Result;
use tracing::{debug, info};

use crate::storage::Storage;
use crate::types::BucketListing;
use crate::types::error::CleanupError;

/// Enumerates every object version and delete marker of the target bucket.
///
/// Pages are requested with a continuation marker until the listing is no
/// longer truncated, so a bucket of any size is fully covered. The order of
/// the service's listing is kept within each sequence.
pub struct BucketLister {
    target: Storage,
    max_keys: i32,
}

impl BucketLister {
    pub fn new(target: Storage, max_keys: i32) -> Self {
        Self { target, max_keys }
    }

    /// List the whole bucket.
    ///
    /// Any page failing is unrecoverable and surfaces as
    /// [`CleanupError::Enumeration`]; no partial listing is returned.
    pub async fn enumerate(&self) -> Result<BucketListing> {
        debug!(bucket = self.target.bucket(), "list object versions has started.");

        let mut listing = BucketListing::default();
        let mut marker = None;
        let mut page_count = 0usize;

        loop {
            let previous = marker.take();
            let page = self
                .target
                .list_object_versions_page(previous.clone(), self.max_keys)
                .await
                .map_err(|e| CleanupError::Enumeration {
                    bucket: self.target.bucket().to_string(),
                    message: format!("{e:#}"),
                })?;
            page_count += 1;

            debug!(
                page = page_count,
                versions = page.versions.len(),
                delete_markers = page.delete_markers.len(),
                "object versions page listed."
            );

            if let Some(next) = &page.next_marker {
                // a truncated page must move the listing forward
                if next.is_empty() || previous.as_ref() == Some(next) {
                    return Err(CleanupError::Enumeration {
                        bucket: self.target.bucket().to_string(),
                        message: format!(
                            "truncated ListObjectVersions page {page_count} did not advance the listing (key marker {:?}, version id marker {:?}).",
                            next.key_marker, next.version_id_marker
                        ),
                    }
                    .into());
                }
            }

            marker = page.next_marker.clone();
            listing.extend_from_page(page);

            if marker.is_none() {
                break;
            }
        }

        info!(
            bucket = self.target.bucket(),
            pages = page_count,
            versions = listing.versions.len(),
            delete_markers = listing.delete_markers.len(),
            "bucket enumerated."
        );

        Ok(listing)
    }
}
