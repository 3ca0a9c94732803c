//! Object storage abstraction.

use async_trait::async_trait;
use bytes::Bytes;

/// Error type for object sinks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// Transient failure; the write may be retried
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Permanent failure; retrying the same write cannot succeed
    #[error("Sink rejected '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

impl SinkError {
    /// Whether retrying may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

/// Durable key/value object storage.
///
/// `put_object` must be atomic: readers see either the previous object or
/// the complete new one. Writing the same key twice replaces the object.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Write an object.
    async fn put_object(&self, key: &str, bytes: Bytes) -> Result<(), SinkError>;

    /// Read an object. `None` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, SinkError>;

    /// List keys starting with `prefix`, sorted lexicographically.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, SinkError>;
}

/// Reject keys that could escape the sink root or collide with temp files.
pub(crate) fn validate_key(key: &str) -> Result<(), SinkError> {
    let reject = |reason: &str| SinkError::Rejected {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() {
        return Err(reject("empty key"));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(reject("key must be relative and name an object"));
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(reject("key contains an empty or relative path segment"));
    }
    if key.ends_with(crate::local::TEMP_SUFFIX) {
        return Err(reject("reserved suffix"));
    }
    Ok(())
}
