//! In-memory object sink with failure injection.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::sink::{validate_key, ObjectSink, SinkError};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    failures: VecDeque<SinkError>,
    put_attempts: usize,
}

/// Objects held in memory. Cloning shares the same storage.
///
/// Scheduled failures are returned by the next `put_object` calls in order,
/// which simulates outages for retry tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectSink {
    state: Arc<Mutex<State>>,
}

impl MemoryObjectSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the objects from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `count` puts with [`SinkError::Unavailable`].
    pub fn fail_next_puts(&self, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state
                .failures
                .push_back(SinkError::Unavailable("simulated outage".to_string()));
        }
    }

    /// Reject the next put with [`SinkError::Rejected`].
    pub fn reject_next_put(&self, reason: &str) {
        self.state().failures.push_back(SinkError::Rejected {
            key: String::new(),
            reason: reason.to_string(),
        });
    }

    /// Number of `put_object` calls, failed ones included.
    pub fn put_attempts(&self) -> usize {
        self.state().put_attempts
    }

    /// Snapshot of all stored objects.
    pub fn objects(&self) -> BTreeMap<String, Bytes> {
        self.state().objects.clone()
    }

    /// Remove every object.
    pub fn clear(&self) {
        self.state().objects.clear();
    }
}

#[async_trait]
impl ObjectSink for MemoryObjectSink {
    async fn put_object(&self, key: &str, bytes: Bytes) -> Result<(), SinkError> {
        validate_key(key)?;
        let mut state = self.state();
        state.put_attempts += 1;
        match state.failures.pop_front() {
            Some(SinkError::Rejected { reason, .. }) => Err(SinkError::Rejected {
                key: key.to_string(),
                reason,
            }),
            Some(err) => Err(err),
            None => {
                state.objects.insert(key.to_string(), bytes);
                Ok(())
            }
        }
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, SinkError> {
        Ok(self.state().objects.get(key).cloned())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        Ok(self
            .state()
            .objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
