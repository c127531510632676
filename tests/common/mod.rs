//! Shared E2E test infrastructure for cleanup-bucket.
//!
//! Provides `TestHelper` for bucket management, object operations, and cleanup
//! runs against real AWS S3. All helpers use the `cleanup-bucket-e2e-test` AWS profile.

#![allow(dead_code)]

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, VersioningConfiguration,
};
use cleanup_bucket::config::args::build_config_from_args;
use cleanup_bucket::{BucketCleanup, CleanupReport, Config, create_storage};
use uuid::Uuid;

/// AWS profile used for all E2E tests.
const AWS_PROFILE: &str = "cleanup-bucket-e2e-test";

/// Used when the profile does not name a region.
const DEFAULT_REGION: &str = "us-east-1";

/// RAII guard that deletes all versions and the bucket when dropped.
///
/// Prefer `cleanup().await` at the end of a test. The drop path is a fallback
/// for panicking tests.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl BucketGuard {
    pub async fn cleanup(self) {
        self.helper.delete_bucket_cascade(&self.bucket).await;
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        // block_on() panics inside a current-thread runtime; never turn that
        // into a double panic.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::runtime::Handle::current().block_on(async move {
                helper.delete_bucket_cascade(&bucket).await;
            });
        }));
    }
}

/// One entry of a ListObjectVersions result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub key: String,
    pub version_id: String,
    pub delete_marker: bool,
}

/// Shared test helper for E2E tests.
pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = Client::new(&sdk_config);

        Arc::new(Self { client, region })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    /// Returns a name like `cleanup-bucket-e2e-<uuid>`.
    pub fn generate_bucket_name(&self) -> String {
        // bucket names are limited to 63 characters
        let id = Uuid::new_v4().simple().to_string();
        format!("cleanup-bucket-e2e-{}", &id[..20])
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Bucket management
    // -----------------------------------------------------------------------

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    pub async fn create_versioned_bucket(&self, bucket: &str) {
        self.create_bucket(bucket).await;
        self.set_versioning(bucket, BucketVersioningStatus::Enabled)
            .await;
    }

    pub async fn set_versioning(&self, bucket: &str, status: BucketVersioningStatus) {
        let versioning_config = VersioningConfiguration::builder().status(status).build();

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(versioning_config)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to set versioning on {bucket}: {e}"));
    }

    pub async fn bucket_exists(&self, bucket: &str) -> bool {
        self.client.head_bucket().bucket(bucket).send().await.is_ok()
    }

    /// Delete every version and delete marker, then the bucket. Errors are ignored.
    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        let Ok(entries) = self.try_list_object_versions(bucket).await else {
            return;
        };

        let identifiers: Vec<ObjectIdentifier> = entries
            .iter()
            .map(|entry| {
                ObjectIdentifier::builder()
                    .key(&entry.key)
                    .version_id(&entry.version_id)
                    .build()
                    .unwrap()
            })
            .collect();

        for chunk in identifiers.chunks(1000) {
            let delete = Delete::builder()
                .set_objects(Some(chunk.to_vec()))
                .quiet(true)
                .build()
                .unwrap();
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    // -----------------------------------------------------------------------
    // Object operations
    // -----------------------------------------------------------------------

    /// Upload an object and return its version id.
    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Option<String> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {bucket}/{key}: {e}"));

        output.version_id().map(|v| v.to_string())
    }

    /// Key-only delete; creates a delete marker in a versioned bucket.
    pub async fn create_delete_marker(&self, bucket: &str, key: &str) {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create delete marker {bucket}/{key}: {e}"));
    }

    /// Upload `count` objects, each with `versions_per_key` versions.
    pub async fn put_versioned_objects(
        &self,
        bucket: &str,
        prefix: &str,
        count: usize,
        versions_per_key: usize,
    ) {
        let mut set = tokio::task::JoinSet::new();
        for i in 0..count {
            let client = self.client.clone();
            let bucket = bucket.to_string();
            let key = format!("{prefix}{i:05}.dat");
            set.spawn(async move {
                for version in 0..versions_per_key {
                    client
                        .put_object()
                        .bucket(&bucket)
                        .key(&key)
                        .body(ByteStream::from(vec![b'v'; version + 1]))
                        .send()
                        .await
                        .unwrap_or_else(|e| panic!("Failed to put object {bucket}/{key}: {e}"));
                }
            });
        }

        while let Some(result) = set.join_next().await {
            result.expect("Upload task panicked");
        }
    }

    pub async fn list_object_versions(&self, bucket: &str) -> Vec<VersionEntry> {
        self.try_list_object_versions(bucket)
            .await
            .unwrap_or_else(|e| panic!("Failed to list object versions in {bucket}: {e}"))
    }

    async fn try_list_object_versions(&self, bucket: &str) -> Result<Vec<VersionEntry>, String> {
        let mut result = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_id_marker.clone())
                .send()
                .await
                .map_err(|e| e.to_string())?;

            for v in resp.versions() {
                if let (Some(key), Some(vid)) = (v.key(), v.version_id()) {
                    result.push(VersionEntry {
                        key: key.to_string(),
                        version_id: vid.to_string(),
                        delete_marker: false,
                    });
                }
            }

            for m in resp.delete_markers() {
                if let (Some(key), Some(vid)) = (m.key(), m.version_id()) {
                    result.push(VersionEntry {
                        key: key.to_string(),
                        version_id: vid.to_string(),
                        delete_marker: true,
                    });
                }
            }

            if resp.is_truncated() == Some(true) {
                key_marker = resp.next_key_marker().map(|s| s.to_string());
                version_id_marker = resp.next_version_id_marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(result)
    }

    /// Deny `s3:DeleteObjectVersion` under `prefix` so deletions there fail
    /// with AccessDenied.
    pub async fn deny_delete_on_prefix(&self, bucket: &str, prefix: &str) {
        let policy = format!(
            r#"{{
  "Version": "2012-10-17",
  "Statement": [
    {{
      "Sid": "DenyDeleteOnPrefix",
      "Effect": "Deny",
      "Principal": "*",
      "Action": ["s3:DeleteObject", "s3:DeleteObjectVersion"],
      "Resource": "arn:aws:s3:::{bucket}/{prefix}*"
    }}
  ]
}}"#
        );

        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put deny policy on {bucket}/{prefix}: {e}"));
    }

    pub async fn delete_bucket_policy(&self, bucket: &str) {
        self.client
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to delete bucket policy on {bucket}: {e}"));
    }

    // -----------------------------------------------------------------------
    // Cleanup helpers
    // -----------------------------------------------------------------------

    /// Build a `Config` from CLI-style arguments.
    ///
    /// Prepends the binary name, disables instance tags and appends
    /// `--target-profile cleanup-bucket-e2e-test` unless credentials are given.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec![
            "cleanup-bucket".to_string(),
            "--disable-instance-tags".to_string(),
        ];
        full_args.extend(args.iter().map(|s| s.to_string()));

        let has_profile = full_args.iter().any(|a| a.starts_with("--target-profile"));
        let has_access_key = full_args
            .iter()
            .any(|a| a.starts_with("--target-access-key"));
        if !has_profile && !has_access_key {
            full_args.push("--target-profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    /// Run a cleanup with the given config.
    pub async fn run_cleanup(config: Config) -> anyhow::Result<CleanupReport> {
        let client_config = config
            .target_client_config
            .clone()
            .expect("client config is always built from args");
        let client = Arc::new(client_config.create_client().await);
        let storage = create_storage(&config, client);

        BucketCleanup::new(config, storage).run().await
    }
}

/// Default timeout for E2E tests (10 minutes).
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(600);

/// Wraps an async E2E test body with a timeout.
///
/// Usage:
/// ```ignore
/// #[tokio::test]
/// async fn e2e_my_test() {
///     e2e_timeout!(async {
///         // test body here
///     });
/// }
/// ```
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
