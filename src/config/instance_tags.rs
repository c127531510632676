//! Configuration overrides sourced from the hosting instance's tags.
//!
//! Tags are read through the instance metadata service, which only exposes
//! them when "instance metadata tags" are allowed on the instance. Outside
//! EC2 the lookup fails fast and the caller continues with other sources.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::imds;
use tracing::debug;

use crate::types::error::CleanupError;

pub const TAG_LOGGING_LEVEL: &str = "loggingLevel";
pub const TAG_BUCKET_NAME: &str = "bucketName";
pub const TAG_DELETE_BUCKET: &str = "deleteBucket";
pub const TAG_ES_HOST: &str = "es_host";
pub const TAG_ES_INDEX_NAME: &str = "es_index_name";
pub const TAG_ENVIRONMENT: &str = "environment";

/// Tag keys that map onto configuration settings. Other tags are ignored.
pub const RECOGNIZED_TAGS: [&str; 6] = [
    TAG_LOGGING_LEVEL,
    TAG_BUCKET_NAME,
    TAG_DELETE_BUCKET,
    TAG_ES_HOST,
    TAG_ES_INDEX_NAME,
    TAG_ENVIRONMENT,
];

const IMDS_TAGS_PATH: &str = "/latest/meta-data/tags/instance";
const IMDS_TIMEOUT: Duration = Duration::from_secs(1);

/// Tag key/value pairs of the hosting instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceTags {
    tags: HashMap<String, String>,
}

impl InstanceTags {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InstanceTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        InstanceTags {
            tags: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Source of instance tags.
#[async_trait]
pub trait InstanceTagSource: Send + Sync {
    async fn fetch_tags(&self) -> Result<InstanceTags, CleanupError>;
}

/// Reads tags from the EC2 instance metadata service (IMDSv2).
pub struct ImdsTagSource {
    client: imds::Client,
}

impl ImdsTagSource {
    pub fn new() -> Self {
        let client = imds::Client::builder()
            .max_attempts(1)
            .connect_timeout(IMDS_TIMEOUT)
            .read_timeout(IMDS_TIMEOUT)
            .build();
        Self { client }
    }
}

impl Default for ImdsTagSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceTagSource for ImdsTagSource {
    async fn fetch_tags(&self) -> Result<InstanceTags, CleanupError> {
        let listing = self
            .client
            .get(IMDS_TAGS_PATH)
            .await
            .map_err(|e| CleanupError::InstanceTags(e.to_string()))?;
        let listing: &str = listing.as_ref();

        let mut tags = Vec::new();
        for key in recognized_tag_keys(listing) {
            let path = format!("{IMDS_TAGS_PATH}/{key}");
            let value = self
                .client
                .get(path.as_str())
                .await
                .map_err(|e| CleanupError::InstanceTags(format!("tag '{key}': {e}")))?;
            let value: &str = value.as_ref();
            debug!(tag = key, "instance tag loaded.");
            tags.push((key.to_string(), value.to_string()));
        }

        Ok(tags.into_iter().collect())
    }
}

/// Select the recognized keys from the newline-separated IMDS tag listing.
pub fn recognized_tag_keys(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .map(str::trim)
        .filter(|key| RECOGNIZED_TAGS.contains(key))
        .collect()
}
