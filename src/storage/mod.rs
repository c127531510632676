use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::ObjectIdentifier;
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::Config;
use crate::types::{ObjectVersionsPage, VersionMarker};

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Provider operations needed to drain and delete one bucket.
///
/// Every method addresses the bucket the storage was created for.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// Name of the target bucket.
    fn bucket(&self) -> &str;

    /// Check if versioning is enabled on the bucket.
    async fn is_versioning_enabled(&self) -> Result<bool>;

    /// Fetch one page of object versions and delete markers.
    ///
    /// `marker` is `None` for the first page. Listing failures are
    /// treated as unrecoverable errors.
    async fn list_object_versions_page(
        &self,
        marker: Option<VersionMarker>,
        max_keys: i32,
    ) -> Result<ObjectVersionsPage>;

    /// Delete a single object version via DeleteObject API.
    ///
    /// `version_id` selects the exact version (or delete marker) to remove.
    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<DeleteObjectOutput>;

    /// Delete multiple versions in one quiet-mode DeleteObjects request.
    ///
    /// The caller keeps each request within the 1000-object API limit.
    /// Quiet mode means the response only lists per-object errors.
    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput>;

    /// Delete the (empty) bucket itself.
    async fn delete_bucket(&self) -> Result<()>;

    /// Get the underlying AWS S3 Client for direct API access.
    fn get_client(&self) -> Option<Arc<Client>>;
}

dyn_clone::clone_trait_object!(StorageTrait);

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

/// Build the optional objects-per-second limiter shared by all calls.
pub(crate) fn build_rate_limiter(rate_limit_objects: Option<u32>) -> Option<Arc<RateLimiter>> {
    rate_limit_objects.map(|rate_limit_value| {
        let refill = if (rate_limit_value as usize) <= REFILL_PER_INTERVAL_DIVIDER {
            1
        } else {
            rate_limit_value as usize / REFILL_PER_INTERVAL_DIVIDER
        };
        Arc::new(
            RateLimiter::builder()
                .max(rate_limit_value as usize)
                .initial(rate_limit_value as usize)
                .refill(refill)
                .fair(true)
                .build(),
        )
    })
}

/// Create the S3 storage for the configured bucket.
pub fn create_storage(config: &Config, client: Arc<Client>) -> Storage {
    s3::S3StorageFactory::create(
        config.bucket.clone(),
        client,
        build_rate_limiter(config.rate_limit_objects),
    )
}
