//! Drain-and-delete orchestration for one bucket.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, RepairMode};
use crate::deleter::{BatchDeleter, DeleteResult, Deleter, SingleDeleter};
use crate::lister::BucketLister;
use crate::storage::Storage;
use crate::types::error::CleanupError;
use crate::types::{BucketListing, ObjectRef};

/// Counts of one delete pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub requests: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl From<&DeleteResult> for PassSummary {
    fn from(result: &DeleteResult) -> Self {
        PassSummary {
            requests: result.requests,
            deleted: result.deleted.len(),
            failed: result.failed.len(),
        }
    }
}

/// What the verification listing still found after the drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResidualCounts {
    pub delete_markers: usize,
    pub versions: usize,
}

impl ResidualCounts {
    pub fn is_empty(&self) -> bool {
        self.delete_markers == 0 && self.versions == 0
    }
}

/// Outcome of a cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub bucket: String,
    pub enumerated_delete_markers: usize,
    pub enumerated_versions: usize,
    pub bulk: PassSummary,
    /// `None` when no repair pass ran.
    pub repair: Option<PassSummary>,
    /// `None` when verification was skipped.
    pub residual: Option<ResidualCounts>,
    pub bucket_deleted: bool,
}

impl CleanupReport {
    pub fn has_residuals(&self) -> bool {
        self.residual.is_some_and(|residual| !residual.is_empty())
    }
}

/// Empties one bucket and optionally deletes it.
///
/// The bucket is enumerated once. Delete markers and then versions go
/// through the bulk strategy, the repair pass selected by
/// [`RepairMode`] revisits refs one at a time, and an optional second
/// listing reports what is left. Per-item delete failures never abort the
/// run. Enumeration and bucket deletion failures do.
///
/// ```no_run
/// # async fn run() -> anyhow::Result<()> {
/// use cleanup_bucket::{BucketCleanup, Config, create_storage};
///
/// let config = Config::for_bucket("my-bucket");
/// let sdk_config = aws_config::load_from_env().await;
/// let client = std::sync::Arc::new(aws_sdk_s3::Client::new(&sdk_config));
/// let storage = create_storage(&config, client);
///
/// let report = BucketCleanup::new(config, storage).run().await?;
/// println!("{}", report.bulk.deleted);
/// # Ok(())
/// # }
/// ```
pub struct BucketCleanup {
    config: Config,
    target: Storage,
}

impl BucketCleanup {
    pub fn new(config: Config, target: Storage) -> Self {
        Self { config, target }
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        let bucket = self.target.bucket().to_string();
        info!(
            bucket = bucket,
            delete_bucket = self.config.delete_bucket,
            batch_size = self.config.batch_size,
            repair_mode = ?self.config.repair_mode,
            logging_level = ?self.config.logging_level,
            "cleanup has started."
        );

        self.check_versioning().await;

        let listing = self.lister().enumerate().await?;
        let mut report = CleanupReport {
            bucket: bucket.clone(),
            enumerated_delete_markers: listing.delete_markers.len(),
            enumerated_versions: listing.versions.len(),
            ..CleanupReport::default()
        };

        let bulk = self.bulk_delete(&listing).await?;
        report.bulk = PassSummary::from(&bulk);

        let repair_refs = self.repair_refs(&listing, &bulk);
        if !repair_refs.is_empty() {
            let repair = SingleDeleter::new(self.target.clone())
                .delete(&repair_refs)
                .await?;
            if !repair.failed.is_empty() {
                warn!(
                    bucket = bucket,
                    failed = repair.failed.len(),
                    "sequential delete pass left failed refs."
                );
            }
            report.repair = Some(PassSummary::from(&repair));
        }

        if self.config.verify_after_drain {
            let residual = self.lister().enumerate().await?;
            let counts = ResidualCounts {
                delete_markers: residual.delete_markers.len(),
                versions: residual.versions.len(),
            };
            if !counts.is_empty() {
                warn!(
                    bucket = bucket,
                    delete_markers = counts.delete_markers,
                    versions = counts.versions,
                    "bucket is not empty after drain."
                );
            }
            report.residual = Some(counts);
        }

        if self.config.delete_bucket {
            self.target
                .delete_bucket()
                .await
                .map_err(|e| CleanupError::BucketDeletion {
                    bucket: bucket.clone(),
                    message: format!("{e:#}"),
                })?;
            info!(bucket = bucket, "bucket has been deleted.");
            report.bucket_deleted = true;
        }

        info!(
            bucket = bucket,
            enumerated = listing.total(),
            deleted = report.bulk.deleted + report.repair.map_or(0, |r| r.deleted),
            bulk_failed = report.bulk.failed,
            bucket_deleted = report.bucket_deleted,
            "cleanup has been completed."
        );

        Ok(report)
    }

    fn lister(&self) -> BucketLister {
        BucketLister::new(self.target.clone(), self.config.max_keys)
    }

    async fn check_versioning(&self) {
        match self.target.is_versioning_enabled().await {
            Ok(true) => debug!("bucket versioning is enabled."),
            Ok(false) => warn!(
                bucket = self.target.bucket(),
                "bucket versioning is not enabled; draining all listed versions anyway."
            ),
            Err(e) => warn!(
                bucket = self.target.bucket(),
                error = %e,
                "failed to get bucket versioning status."
            ),
        }
    }

    /// Delete markers first, then versions, each in listing order.
    async fn bulk_delete(&self, listing: &BucketListing) -> Result<DeleteResult> {
        let deleter = BatchDeleter::new(self.target.clone(), self.config.batch_size);

        let mut result = deleter.delete(&listing.delete_markers).await?;
        debug!(
            delete_markers = listing.delete_markers.len(),
            failed = result.failed.len(),
            "delete markers bulk pass completed."
        );

        let versions = deleter.delete(&listing.versions).await?;
        debug!(
            versions = listing.versions.len(),
            failed = versions.failed.len(),
            "versions bulk pass completed."
        );
        result.merge(versions);

        if !result.failed.is_empty() {
            warn!(
                bucket = self.target.bucket(),
                failed = result.failed.len(),
                "bulk delete pass reported failed refs."
            );
        }

        Ok(result)
    }

    fn repair_refs(&self, listing: &BucketListing, bulk: &DeleteResult) -> Vec<ObjectRef> {
        match self.config.repair_mode {
            RepairMode::FailedOnly => bulk.failed_refs(),
            RepairMode::All => listing
                .delete_markers
                .iter()
                .chain(listing.versions.iter())
                .cloned()
                .collect(),
            RepairMode::Disabled => Vec::new(),
        }
    }
}
