//! Shared test utilities for the cleanup_bucket library crate.
//!
//! [`InMemoryBucket`] is a versioned bucket held in memory that implements
//! [`StorageTrait`], so the lister, the deleters and the cleanup run can be
//! exercised without S3.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::{Error as S3Error, ObjectIdentifier};

use crate::storage::{Storage, StorageTrait};
use crate::types::{ObjectRef, ObjectVersionsPage, VersionMarker};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// One stored version or delete marker.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredEntry {
    version_id: String,
    delete_marker: bool,
}

#[derive(Debug, Default)]
struct BucketState {
    /// Key -> entries, newest first.
    objects: BTreeMap<String, Vec<StoredEntry>>,
    next_version: u64,
    versioning_suspended: bool,
    bucket_deleted: bool,

    list_calls: usize,
    delete_object_calls: Vec<(String, Option<String>)>,
    delete_objects_calls: Vec<Vec<(String, Option<String>)>>,
    delete_bucket_calls: usize,

    fail_listing: bool,
    truncate_without_markers: bool,
    fail_batch_requests: bool,
    batch_error_keys: HashMap<String, String>,
    omit_error_version_ids: bool,
    single_error_keys: HashSet<String>,
}

impl BucketState {
    fn new_version_id(&mut self) -> String {
        self.next_version += 1;
        format!("v{:06}", self.next_version)
    }

    fn flattened(&self) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .flat_map(|(key, entries)| {
                entries.iter().map(move |entry| {
                    if entry.delete_marker {
                        ObjectRef::delete_marker(key.as_str(), Some(&entry.version_id))
                    } else {
                        ObjectRef::version(key.as_str(), Some(&entry.version_id))
                    }
                })
            })
            .collect()
    }

    /// Delete with S3 versioning semantics: an exact version id removes that
    /// entry, a key-only delete stacks a new delete marker on top.
    fn apply_delete(&mut self, key: &str, version_id: Option<&str>) {
        match version_id {
            Some(version_id) => {
                if let Some(entries) = self.objects.get_mut(key) {
                    entries.retain(|entry| entry.version_id != version_id);
                    if entries.is_empty() {
                        self.objects.remove(key);
                    }
                }
            }
            None => {
                let version_id = self.new_version_id();
                self.objects.entry(key.to_string()).or_default().insert(
                    0,
                    StoredEntry {
                        version_id,
                        delete_marker: true,
                    },
                );
            }
        }
    }
}

/// A versioned bucket kept in memory, with call recording and failure
/// injection.
///
/// Clones share state, so the handle a test keeps observes what the boxed
/// [`Storage`] handed to the code under test did.
#[derive(Clone)]
pub(crate) struct InMemoryBucket {
    name: String,
    state: Arc<Mutex<BucketState>>,
}

impl InMemoryBucket {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(BucketState::default())),
        }
    }

    pub(crate) fn storage(&self) -> Storage {
        Box::new(self.clone())
    }

    fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap()
    }

    /// Store a new version of `key` and return its version id.
    pub(crate) fn put_object(&self, key: &str) -> String {
        let mut state = self.state();
        let version_id = state.new_version_id();
        state.objects.entry(key.to_string()).or_default().insert(
            0,
            StoredEntry {
                version_id: version_id.clone(),
                delete_marker: false,
            },
        );
        version_id
    }

    /// Delete `key` without a version id, leaving a delete marker. Returns
    /// the marker's version id.
    pub(crate) fn delete_latest(&self, key: &str) -> String {
        let mut state = self.state();
        state.apply_delete(key, None);
        state.objects[key][0].version_id.clone()
    }

    pub(crate) fn contains(&self, key: &str, version_id: &str) -> bool {
        self.state()
            .objects
            .get(key)
            .is_some_and(|entries| entries.iter().any(|e| e.version_id == version_id))
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.state().objects.values().map(Vec::len).sum()
    }

    pub(crate) fn delete_marker_count(&self) -> usize {
        self.state()
            .objects
            .values()
            .flatten()
            .filter(|e| e.delete_marker)
            .count()
    }

    pub(crate) fn is_bucket_deleted(&self) -> bool {
        self.state().bucket_deleted
    }

    pub(crate) fn suspend_versioning(&self) {
        self.state().versioning_suspended = true;
    }

    pub(crate) fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    /// Report truncated pages with neither continuation marker set.
    pub(crate) fn truncate_without_markers(&self) {
        self.state().truncate_without_markers = true;
    }

    /// Make every DeleteObjects request fail as a whole.
    pub(crate) fn fail_batch_requests(&self, fail: bool) {
        self.state().fail_batch_requests = fail;
    }

    /// Report `key` as a per-item error in DeleteObjects responses.
    pub(crate) fn fail_batch_item(&self, key: &str, code: &str) {
        self.state()
            .batch_error_keys
            .insert(key.to_string(), code.to_string());
    }

    /// Leave `VersionId` out of reported per-item errors, as some
    /// S3-compatible endpoints do.
    pub(crate) fn omit_error_version_ids(&self) {
        self.state().omit_error_version_ids = true;
    }

    /// Make DeleteObject fail for `key`.
    pub(crate) fn fail_single_delete(&self, key: &str) {
        self.state().single_error_keys.insert(key.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_listing = false;
        state.fail_batch_requests = false;
        state.batch_error_keys.clear();
        state.single_error_keys.clear();
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub(crate) fn delete_object_calls(&self) -> Vec<(String, Option<String>)> {
        self.state().delete_object_calls.clone()
    }

    pub(crate) fn delete_objects_calls(&self) -> Vec<Vec<(String, Option<String>)>> {
        self.state().delete_objects_calls.clone()
    }

    pub(crate) fn delete_bucket_calls(&self) -> usize {
        self.state().delete_bucket_calls
    }

    /// Number of delete requests of either kind.
    pub(crate) fn delete_calls(&self) -> usize {
        let state = self.state();
        state.delete_object_calls.len() + state.delete_objects_calls.len()
    }
}

#[async_trait]
impl StorageTrait for InMemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn is_versioning_enabled(&self) -> Result<bool> {
        Ok(!self.state().versioning_suspended)
    }

    async fn list_object_versions_page(
        &self,
        marker: Option<VersionMarker>,
        max_keys: i32,
    ) -> Result<ObjectVersionsPage> {
        let mut state = self.state();
        state.list_calls += 1;
        if state.fail_listing {
            return Err(anyhow!("AccessDenied: listing is not allowed"));
        }

        let all = state.flattened();
        let start = match marker {
            None => 0,
            Some(marker) => all
                .iter()
                .position(|r| {
                    Some(r.key()) == marker.key_marker.as_deref()
                        && r.version_id() == marker.version_id_marker.as_deref()
                })
                .map(|i| i + 1)
                .unwrap_or_else(|| {
                    let key_marker = marker.key_marker.unwrap_or_default();
                    all.iter()
                        .position(|r| r.key() > key_marker.as_str())
                        .unwrap_or(all.len())
                }),
        };
        let end = (start + max_keys.max(1) as usize).min(all.len());
        let page = &all[start..end];

        let truncate_without_markers = state.truncate_without_markers;
        let next_marker = (end < all.len()).then(|| {
            if truncate_without_markers {
                return VersionMarker::default();
            }
            let last = &page[page.len() - 1];
            VersionMarker {
                key_marker: Some(last.key().to_string()),
                version_id_marker: last.version_id().map(String::from),
            }
        });

        let (delete_markers, versions): (Vec<ObjectRef>, Vec<ObjectRef>) =
            page.iter().cloned().partition(ObjectRef::is_delete_marker);

        Ok(ObjectVersionsPage {
            versions,
            delete_markers,
            next_marker,
        })
    }

    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<DeleteObjectOutput> {
        let mut state = self.state();
        state
            .delete_object_calls
            .push((key.to_string(), version_id.clone()));
        if state.single_error_keys.contains(key) {
            return Err(anyhow!("AccessDenied: delete of {key} is not allowed"));
        }
        state.apply_delete(key, version_id.as_deref());
        Ok(DeleteObjectOutput::builder().build())
    }

    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput> {
        let mut state = self.state();
        state.delete_objects_calls.push(
            objects
                .iter()
                .map(|o| (o.key().to_string(), o.version_id().map(String::from)))
                .collect(),
        );
        if state.fail_batch_requests {
            return Err(anyhow!("ServiceUnavailable: DeleteObjects failed"));
        }

        let mut errors = Vec::new();
        for object in &objects {
            if let Some(code) = state.batch_error_keys.get(object.key()).cloned() {
                let version_id = if state.omit_error_version_ids {
                    None
                } else {
                    object.version_id().map(String::from)
                };
                errors.push(
                    S3Error::builder()
                        .key(object.key())
                        .set_version_id(version_id)
                        .code(code)
                        .message("injected failure")
                        .build(),
                );
                continue;
            }
            state.apply_delete(object.key(), object.version_id());
        }

        Ok(DeleteObjectsOutput::builder().set_errors(Some(errors)).build())
    }

    async fn delete_bucket(&self) -> Result<()> {
        let mut state = self.state();
        state.delete_bucket_calls += 1;
        if !state.objects.is_empty() {
            return Err(anyhow!(
                "BucketNotEmpty: The bucket you tried to delete is not empty"
            ));
        }
        state.bucket_deleted = true;
        Ok(())
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_only_delete_stacks_a_marker() {
        let bucket = InMemoryBucket::new("b");
        bucket.put_object("a");
        let storage = bucket.storage();

        storage.delete_object("a", None).await.unwrap();

        assert_eq!(bucket.entry_count(), 2);
        assert_eq!(bucket.delete_marker_count(), 1);
    }

    #[tokio::test]
    async fn exact_delete_removes_only_that_version() {
        let bucket = InMemoryBucket::new("b");
        let v1 = bucket.put_object("a");
        let v2 = bucket.put_object("a");
        let storage = bucket.storage();

        storage.delete_object("a", Some(v1.clone())).await.unwrap();

        assert!(!bucket.contains("a", &v1));
        assert!(bucket.contains("a", &v2));
    }

    #[tokio::test]
    async fn pages_resume_after_marker() {
        let bucket = InMemoryBucket::new("b");
        for key in ["a", "b", "c"] {
            bucket.put_object(key);
        }
        let storage = bucket.storage();

        let first = storage.list_object_versions_page(None, 2).await.unwrap();
        assert_eq!(first.versions.len(), 2);
        let second = storage
            .list_object_versions_page(first.next_marker, 2)
            .await
            .unwrap();
        assert_eq!(second.versions.len(), 1);
        assert_eq!(second.versions[0].key(), "c");
        assert!(second.next_marker.is_none());
    }
}
