//! Single-object deletion using the S3 DeleteObject API.
//!
//! One request per ref, in order. Used as the repair pass after the bulk
//! strategy.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::storage::Storage;
use crate::types::ObjectRef;

use super::{DeleteResult, DeletedKey, Deleter, FailedKey};

/// Error code recorded for a failed DeleteObject request.
pub const DELETE_OBJECT_FAILED: &str = "DeleteObjectError";

/// Deletes refs one at a time using the S3 DeleteObject API.
///
/// The version id is always sent, so a delete marker ref removes exactly
/// that marker instead of stacking a new one on the key.
pub struct SingleDeleter {
    target: Storage,
}

impl SingleDeleter {
    pub fn new(target: Storage) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Deleter for SingleDeleter {
    async fn delete(&self, objects: &[ObjectRef]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for object in objects {
            let key = object.key();
            let version_id = object.version_id().map(String::from);

            debug!(
                key = key,
                version_id = version_id,
                delete_marker = object.is_delete_marker(),
                "sending DeleteObject request."
            );

            result.requests += 1;
            match self.target.delete_object(key, version_id.clone()).await {
                Ok(_) => {
                    debug!(key = key, version_id = version_id, "DeleteObject succeeded.");
                    result.deleted.push(DeletedKey::from(object));
                }
                Err(e) => {
                    debug!(
                        key = key,
                        version_id = version_id,
                        error = %e,
                        "S3 DeleteObject API call failed for key '{}'.",
                        key,
                    );
                    result.failed.push(FailedKey::new(
                        object,
                        DELETE_OBJECT_FAILED.to_string(),
                        format!("{e:#}"),
                    ));
                }
            }
        }

        Ok(result)
    }
}
