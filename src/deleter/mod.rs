//! Delete strategies of the bucket drain.
//!
//! Both strategies consume the same enumerated refs through the [`Deleter`]
//! trait: [`BatchDeleter`] issues chunked DeleteObjects requests,
//! [`SingleDeleter`] issues one DeleteObject request per ref. Neither raises
//! on a failed item; failures are reported in [`DeleteResult::failed`].

use anyhow::Result;
use async_trait::async_trait;

use crate::types::ObjectRef;

pub mod batch;
pub mod single;

pub use batch::BatchDeleter;
pub use single::SingleDeleter;


/// Result of a deletion pass, reporting which refs succeeded and which failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    /// Refs accepted by the service.
    pub deleted: Vec<DeletedKey>,
    /// Refs that failed, with error details.
    pub failed: Vec<FailedKey>,
    /// Number of delete requests issued.
    pub requests: usize,
}

impl DeleteResult {
    /// Refs to revisit in a repair pass, in the order they failed.
    pub fn failed_refs(&self) -> Vec<ObjectRef> {
        self.failed.iter().map(FailedKey::to_object_ref).collect()
    }

    pub fn merge(&mut self, other: DeleteResult) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
        self.requests += other.requests;
    }
}

/// A successfully deleted key.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedKey {
    pub key: String,
    pub version_id: Option<String>,
}

/// A key that failed to delete.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedKey {
    pub key: String,
    pub version_id: Option<String>,
    pub delete_marker: bool,
    pub error_code: String,
    pub error_message: String,
}

impl FailedKey {
    pub(crate) fn new(object: &ObjectRef, error_code: String, error_message: String) -> Self {
        Self {
            key: object.key().to_string(),
            version_id: object.version_id().map(String::from),
            delete_marker: object.is_delete_marker(),
            error_code,
            error_message,
        }
    }

    pub fn to_object_ref(&self) -> ObjectRef {
        if self.delete_marker {
            ObjectRef::delete_marker(self.key.as_str(), self.version_id.as_deref())
        } else {
            ObjectRef::version(self.key.as_str(), self.version_id.as_deref())
        }
    }
}

impl From<&ObjectRef> for DeletedKey {
    fn from(object: &ObjectRef) -> Self {
        DeletedKey {
            key: object.key().to_string(),
            version_id: object.version_id().map(String::from),
        }
    }
}

/// Trait for deletion strategies (batch or single).
///
/// Implementations process `objects` in order and keep going past failed
/// items. An `Err` is reserved for failures that are not tied to a ref.
#[async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, objects: &[ObjectRef]) -> Result<DeleteResult>;
}
