use anyhow::Error;
use thiserror::Error;

/// Application-level error types for cleanup-bucket.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 1: Runtime errors (InstanceTags, Enumeration, BucketDeletion)
/// - 2: Configuration errors (InvalidConfig)
#[derive(Error, Debug, PartialEq)]
pub enum CleanupError {
    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Instance metadata or tag lookup failed.
    #[error("Instance tag lookup failed: {0}")]
    InstanceTags(String),

    /// Listing the bucket's versions failed. Nothing has been deleted yet.
    #[error("Failed to enumerate object versions of bucket '{bucket}': {message}")]
    Enumeration { bucket: String, message: String },

    /// DeleteBucket failed, typically because objects remain.
    #[error("Failed to delete bucket '{bucket}': {message}")]
    BucketDeletion { bucket: String, message: String },
}

impl CleanupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CleanupError::InvalidConfig(_) => 2,
            _ => 1,
        }
    }
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<CleanupError>() {
        return err.exit_code();
    }
    1
}
