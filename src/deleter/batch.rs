//! Batch deletion using the S3 DeleteObjects API.
//!
//! Splits the refs into contiguous, order-preserving chunks and issues one
//! quiet-mode DeleteObjects request per chunk, sequentially.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::types::ObjectIdentifier;
use tracing::{debug, warn};

use crate::storage::Storage;
use crate::types::ObjectRef;

use super::{DeleteResult, DeletedKey, Deleter, FailedKey};

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Error code recorded for refs of a DeleteObjects request that failed as a whole.
pub const BATCH_REQUEST_FAILED: &str = "BatchRequestFailed";

/// Deletes refs in batches using the S3 DeleteObjects API.
///
/// The effective batch size is `batch_size` clamped to `1..=MAX_BATCH_SIZE`.
/// Quiet mode suppresses per-item successes, so every ref of a chunk that is
/// not listed in the response's errors is counted as deleted.
pub struct BatchDeleter {
    target: Storage,
    batch_size: usize,
}

impl BatchDeleter {
    pub fn new(target: Storage, batch_size: u16) -> Self {
        Self {
            target,
            batch_size: (batch_size as usize).clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl Deleter for BatchDeleter {
    async fn delete(&self, objects: &[ObjectRef]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for (batch_index, chunk) in objects.chunks(self.batch_size).enumerate() {
            let identifiers: Vec<ObjectIdentifier> =
                chunk.iter().map(ObjectRef::to_identifier).collect();

            debug!(
                batch_index = batch_index,
                batch_size = identifiers.len(),
                "sending DeleteObjects batch request."
            );

            result.requests += 1;
            let response = match self.target.delete_objects(identifiers).await {
                Ok(response) => response,
                Err(e) => {
                    // storage layer already logged the SDK error details
                    let message = format!("{e:#}");
                    warn!(
                        batch_index = batch_index,
                        batch_size = chunk.len(),
                        "DeleteObjects batch failed; continuing with the next batch."
                    );
                    result.failed.extend(chunk.iter().map(|object| {
                        FailedKey::new(object, BATCH_REQUEST_FAILED.to_string(), message.clone())
                    }));
                    continue;
                }
            };

            // one slot per chunk ref; a ref fails at most once
            let mut failures: Vec<Option<FailedKey>> = chunk.iter().map(|_| None).collect();
            for err in response.errors() {
                let key = err.key().unwrap_or("unknown");
                let version_id = err.version_id();
                let code = err.code().unwrap_or("unknown").to_string();
                let message = err.message().unwrap_or("no message").to_string();

                warn!(
                    key = key,
                    version_id = version_id,
                    code = code,
                    message = message,
                    "S3 DeleteObjects partial failure for key '{}': {} ({}).",
                    key,
                    code,
                    message,
                );

                let matched = matching_refs(chunk, key, version_id);
                if matched.is_empty() {
                    warn!(
                        key = key,
                        "DeleteObjects reported an error for a key that was not requested."
                    );
                    continue;
                }
                for index in matched {
                    if failures[index].is_none() {
                        failures[index] =
                            Some(FailedKey::new(&chunk[index], code.clone(), message.clone()));
                    }
                }
            }

            for (object, failure) in chunk.iter().zip(failures) {
                match failure {
                    Some(failed) => result.failed.push(failed),
                    None => result.deleted.push(DeletedKey::from(object)),
                }
            }

            debug!(
                batch_index = batch_index,
                deleted = result.deleted.len(),
                failed = result.failed.len(),
                "DeleteObjects batch completed."
            );
        }

        Ok(result)
    }
}

/// Indices of the chunk refs a per-item error refers to.
///
/// An exact (key, version id) match wins. Errors that omit the version id
/// fall back to every ref of that key, so each keeps its own version id.
fn matching_refs(chunk: &[ObjectRef], key: &str, version_id: Option<&str>) -> Vec<usize> {
    let exact: Vec<usize> = chunk
        .iter()
        .enumerate()
        .filter(|(_, object)| object.key() == key && object.version_id() == version_id)
        .map(|(index, _)| index)
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    chunk
        .iter()
        .enumerate()
        .filter(|(_, object)| object.key() == key)
        .map(|(index, _)| index)
        .collect()
}
