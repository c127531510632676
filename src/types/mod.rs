use std::fmt;
use std::fmt::{Debug, Formatter};

use aws_sdk_s3::types::{DeleteMarkerEntry, ObjectIdentifier, ObjectVersion};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;

/// One deletable unit of a versioned bucket.
///
/// Both variants carry the same shape. `Version` is a stored revision of an
/// object, `DeleteMarker` is the tombstone left by a delete under versioning.
/// Refs are built from a listing, consumed by the deleters and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Version {
        key: String,
        version_id: Option<String>,
    },
    DeleteMarker {
        key: String,
        version_id: Option<String>,
    },
}

impl ObjectRef {
    pub fn version(key: impl Into<String>, version_id: Option<&str>) -> Self {
        Self::Version {
            key: key.into(),
            version_id: version_id.map(String::from),
        }
    }

    pub fn delete_marker(key: impl Into<String>, version_id: Option<&str>) -> Self {
        Self::DeleteMarker {
            key: key.into(),
            version_id: version_id.map(String::from),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Version { key, .. } | Self::DeleteMarker { key, .. } => key,
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match self {
            Self::Version { version_id, .. } | Self::DeleteMarker { version_id, .. } => {
                version_id.as_deref()
            }
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker { .. })
    }

    /// Build the identifier used by DeleteObjects.
    ///
    /// The version id is always included when known, so a delete marker is
    /// removed exactly rather than shadowed by a new one.
    pub fn to_identifier(&self) -> ObjectIdentifier {
        ObjectIdentifier::builder()
            .key(self.key())
            .set_version_id(self.version_id().map(String::from))
            .build()
            .expect("ObjectIdentifier build failed")
    }
}

impl From<&ObjectVersion> for ObjectRef {
    fn from(version: &ObjectVersion) -> Self {
        ObjectRef::version(version.key().unwrap_or_default(), version.version_id())
    }
}

impl From<&DeleteMarkerEntry> for ObjectRef {
    fn from(marker: &DeleteMarkerEntry) -> Self {
        ObjectRef::delete_marker(marker.key().unwrap_or_default(), marker.version_id())
    }
}

/// Complete enumeration of a bucket at listing time.
///
/// `delete_markers` only holds `ObjectRef::DeleteMarker` entries and
/// `versions` only holds `ObjectRef::Version` entries, each in listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketListing {
    pub delete_markers: Vec<ObjectRef>,
    pub versions: Vec<ObjectRef>,
}

impl BucketListing {
    pub fn total(&self) -> usize {
        self.delete_markers.len() + self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Partition one page into the two sequences, preserving order.
    pub fn extend_from_page(&mut self, page: ObjectVersionsPage) {
        self.delete_markers.extend(page.delete_markers);
        self.versions.extend(page.versions);
    }
}

/// Resume position of a ListObjectVersions pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMarker {
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
}

impl VersionMarker {
    /// A marker carrying neither field cannot resume a listing.
    pub fn is_empty(&self) -> bool {
        self.key_marker.is_none() && self.version_id_marker.is_none()
    }
}

/// One page of a ListObjectVersions response.
///
/// `next_marker` is `None` once the listing is no longer truncated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectVersionsPage {
    pub versions: Vec<ObjectRef>,
    pub delete_markers: Vec<ObjectRef>,
    pub next_marker: Option<VersionMarker>,
}

/// AWS credential sources.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair with secure zeroization.
///
/// The secret_access_key and session_token are cleared from memory
/// when this struct is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
