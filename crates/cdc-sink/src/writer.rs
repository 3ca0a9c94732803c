//! Batching writer that makes transactions durable.

use bytes::{Bytes, BytesMut};
use cdc_core::{Lsn, SchemaVersion, Xid};
use checkpoint::{CheckpointError, CheckpointLease, CheckpointManager};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::SimulationCheckpoint;
use crate::partition::{object_key, schema_key, window_start};
use crate::retry::{RetryError, RetryPolicy};
use crate::sink::{ObjectSink, SinkError};
use crate::transaction::EncodedTransaction;

/// Batch bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Flush once a batch holds this many change events
    pub max_events: usize,
    /// Flush once a batch holds this many encoded bytes
    pub max_bytes: usize,
    /// Width of the time window a batch and its objects belong to
    pub partition_window: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            max_bytes: 4 * 1024 * 1024,
            partition_window: Duration::from_secs(3600),
        }
    }
}

/// Whole transactions from one partition window, in LSN order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    transactions: Vec<EncodedTransaction>,
    event_count: usize,
    byte_size: usize,
}

impl Batch {
    fn push(&mut self, txn: EncodedTransaction) {
        self.event_count += txn.event_count();
        self.byte_size += txn.byte_size();
        self.transactions.push(txn);
    }

    /// Transactions in the batch.
    pub fn transactions(&self) -> &[EncodedTransaction] {
        &self.transactions
    }

    /// Whether the batch holds no transaction.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of change events.
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Encoded size in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// LSN of the first change, if any.
    pub fn first_lsn(&self) -> Option<Lsn> {
        self.transactions.first().map(|t| t.first_lsn)
    }

    /// Commit LSN of the last transaction, if any.
    pub fn last_lsn(&self) -> Option<Lsn> {
        self.transactions.last().map(|t| t.commit_lsn)
    }
}

/// Error type for sink writes. All variants halt the instance.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Retries ran out while the sink stayed unavailable
    #[error("Sink unavailable after {attempts} attempts writing '{key}': {last}")]
    Exhausted {
        key: String,
        attempts: u32,
        last: SinkError,
    },

    /// The sink refused an object; carries the batch that was being written
    #[error("Sink rejected '{key}': {reason}")]
    Rejected {
        key: String,
        reason: String,
        batch: Box<Batch>,
    },

    /// Checkpoint could not be stored
    #[error("Failed to store checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Schema snapshot could not be serialized
    #[error("Failed to serialize schema {version}: {source}")]
    SchemaFeed {
        version: SchemaVersion,
        source: serde_json::Error,
    },
}

/// Writes batches of transactions to an object sink and checkpoints them.
///
/// Batches are cut on `max_events`, `max_bytes`, a change of partition
/// window, and explicit [`SinkWriter::flush`]. Each batch becomes one
/// object per table, keyed by the table's first LSN in the batch, so
/// rewriting the same transactions after a crash overwrites the same keys
/// with the same bytes.
pub struct SinkWriter {
    sink: Arc<dyn ObjectSink>,
    retry: RetryPolicy,
    batching: BatchConfig,
    checkpoints: CheckpointManager,
    lease: Option<CheckpointLease>,
    pending: Batch,
    pending_window: Option<DateTime<Utc>>,
    cursor: BTreeMap<String, String>,
    last_checkpoint: Option<SimulationCheckpoint>,
}

impl std::fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkWriter")
            .field("batching", &self.batching)
            .field("pending_events", &self.pending.event_count)
            .field("last_checkpoint", &self.last_checkpoint)
            .finish_non_exhaustive()
    }
}

impl SinkWriter {
    /// Create a writer.
    pub fn new(
        sink: Arc<dyn ObjectSink>,
        retry: RetryPolicy,
        batching: BatchConfig,
        checkpoints: CheckpointManager,
    ) -> Self {
        Self {
            sink,
            retry,
            batching,
            checkpoints,
            lease: None,
            pending: Batch::default(),
            pending_window: None,
            cursor: BTreeMap::new(),
            last_checkpoint: None,
        }
    }

    /// Fence writes with `lease`.
    ///
    /// The lease is checked before a batch's first object and again before
    /// its checkpoint, renewed after every checkpoint, and released on
    /// [`SinkWriter::close`]. Between batches the owner keeps it alive with
    /// [`SinkWriter::renew_lease`].
    pub fn with_lease(mut self, lease: CheckpointLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// How often the lease must be renewed to stay fresh, half its TTL.
    pub fn lease_renewal_interval(&self) -> Option<Duration> {
        self.lease.as_ref().map(|lease| lease.ttl() / 2)
    }

    /// Refresh the lease, if any.
    pub fn renew_lease(&mut self) -> Result<(), CheckpointError> {
        match self.lease.as_mut() {
            Some(lease) => lease.renew(),
            None => Ok(()),
        }
    }

    /// Continue after a previously stored checkpoint.
    pub fn resume_from(&mut self, checkpoint: SimulationCheckpoint) {
        self.cursor = checkpoint.partition_cursor.clone();
        self.last_checkpoint = Some(checkpoint);
    }

    /// The last checkpoint stored (or resumed from).
    pub fn last_checkpoint(&self) -> Option<&SimulationCheckpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Change events buffered but not yet written.
    pub fn pending_events(&self) -> usize {
        self.pending.event_count
    }

    /// Add a transaction, writing the pending batch when a bound is reached.
    ///
    /// Returns the committed LSN when a batch was written.
    pub async fn push(&mut self, txn: EncodedTransaction) -> Result<Option<Lsn>, WriteError> {
        let window = window_start(txn.commit_ts, self.batching.partition_window);
        let mut written = None;

        if self.pending_window.is_some_and(|w| w != window) {
            written = self.flush().await?;
        }

        self.pending_window = Some(window);
        self.pending.push(txn);

        if self.pending.event_count >= self.batching.max_events
            || self.pending.byte_size >= self.batching.max_bytes
        {
            written = self.flush().await?;
        }
        Ok(written)
    }

    /// Write the pending batch, if any.
    pub async fn flush(&mut self) -> Result<Option<Lsn>, WriteError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let batch = std::mem::take(&mut self.pending);
        self.pending_window = None;
        self.write(batch).await.map(Some)
    }

    /// Write a batch and store the checkpoint covering it.
    ///
    /// Schema versions first referenced by the batch are written before any
    /// data object, and data objects are written in LSN order. The
    /// checkpoint is stored only once every object is durable.
    pub async fn write(&mut self, batch: Batch) -> Result<Lsn, WriteError> {
        let Some(last) = batch.transactions.last() else {
            return Ok(self
                .last_checkpoint
                .as_ref()
                .map_or(Lsn::ZERO, |c| c.last_committed_lsn));
        };
        let (last_lsn, last_xid, last_tick, last_version) =
            (last.commit_lsn, last.xid, last.tick, last.schema_version);

        // a writer that lost its lease must not touch the sink
        self.verify_lease()?;

        for (key, bytes) in schema_objects(&batch)? {
            if let Err(e) = self.put_with_retry(&key, bytes).await {
                return Err(into_write_error(e, key, batch));
            }
        }

        let objects = data_objects(&batch, self.batching.partition_window);
        let mut written = Vec::with_capacity(objects.len());
        for object in objects {
            if let Err(e) = self.put_with_retry(&object.key, object.bytes).await {
                return Err(into_write_error(e, object.key, batch));
            }
            written.push((object.table, object.key));
        }
        let object_count = written.len();
        self.cursor.extend(written);

        self.store_checkpoint(last_lsn, last_xid, last_tick, last_version)
            .await?;

        tracing::debug!(
            "Committed batch of {} transactions ({} events, {} objects) through LSN {}",
            batch.transactions.len(),
            batch.event_count,
            object_count,
            last_lsn
        );
        Ok(last_lsn)
    }

    /// Flush the pending batch and release the lease.
    pub async fn close(mut self) -> Result<Option<SimulationCheckpoint>, WriteError> {
        self.flush().await?;
        if let Some(lease) = self.lease.take() {
            lease.release()?;
        }
        Ok(self.last_checkpoint)
    }

    /// Release the lease without flushing, after a fatal error.
    pub fn release_lease(&mut self) -> Result<(), CheckpointError> {
        match self.lease.take() {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }

    fn verify_lease(&self) -> Result<(), CheckpointError> {
        match &self.lease {
            Some(lease) => lease.verify(),
            None => Ok(()),
        }
    }

    async fn put_with_retry(&self, key: &str, bytes: Bytes) -> Result<(), RetryError> {
        let sink = &self.sink;
        self.retry
            .run(&format!("write '{key}'"), || {
                let bytes = bytes.clone();
                async move { sink.put_object(key, bytes).await }
            })
            .await
    }

    async fn store_checkpoint(
        &mut self,
        lsn: Lsn,
        xid: Xid,
        tick: u64,
        schema_version: SchemaVersion,
    ) -> Result<(), WriteError> {
        let checkpoint = SimulationCheckpoint {
            last_committed_lsn: lsn,
            last_committed_xid: xid,
            last_committed_tick: tick,
            partition_cursor: self.cursor.clone(),
            schema_version,
            updated_at: Utc::now(),
        };
        self.verify_lease()?;
        self.checkpoints.save(&checkpoint).await?;
        if let Some(lease) = self.lease.as_mut() {
            lease.renew()?;
        }
        self.last_checkpoint = Some(checkpoint);
        Ok(())
    }
}

struct DataObject {
    table: String,
    key: String,
    first_lsn: Lsn,
    bytes: Bytes,
}

/// Group a batch's slices into one object per table, ordered by first LSN.
fn data_objects(batch: &Batch, partition_window: Duration) -> Vec<DataObject> {
    let mut by_table: BTreeMap<&str, (Lsn, DateTime<Utc>, BytesMut)> = BTreeMap::new();
    for txn in &batch.transactions {
        let window = window_start(txn.commit_ts, partition_window);
        for slice in &txn.slices {
            by_table
                .entry(slice.table.as_str())
                .or_insert_with(|| (slice.first_lsn, window, BytesMut::new()))
                .2
                .extend_from_slice(&slice.bytes);
        }
    }

    let mut objects: Vec<DataObject> = by_table
        .into_iter()
        .map(|(table, (first_lsn, window, bytes))| DataObject {
            table: table.to_string(),
            key: object_key(table, window, first_lsn),
            first_lsn,
            bytes: bytes.freeze(),
        })
        .collect();
    objects.sort_by_key(|o| o.first_lsn);
    objects
}

/// Schema versions introduced by the batch, oldest first.
fn schema_objects(batch: &Batch) -> Result<Vec<(String, Bytes)>, WriteError> {
    batch
        .transactions
        .iter()
        .flat_map(|t| t.new_schemas.iter())
        .map(|snapshot| {
            let json = serde_json::to_vec_pretty(snapshot.as_ref()).map_err(|source| {
                WriteError::SchemaFeed {
                    version: snapshot.version,
                    source,
                }
            })?;
            Ok((schema_key(snapshot.version), Bytes::from(json)))
        })
        .collect()
}

fn into_write_error(err: RetryError, key: String, batch: Batch) -> WriteError {
    match err {
        RetryError::Exhausted { attempts, last } => {
            tracing::error!("Giving up on '{}' after {} attempts: {}", key, attempts, last);
            WriteError::Exhausted {
                key,
                attempts,
                last,
            }
        }
        RetryError::Permanent(SinkError::Rejected { key, reason }) => {
            tracing::error!("Sink rejected '{}': {}", key, reason);
            WriteError::Rejected {
                key,
                reason,
                batch: Box::new(batch),
            }
        }
        RetryError::Permanent(SinkError::Unavailable(reason)) => WriteError::Exhausted {
            key,
            attempts: 1,
            last: SinkError::Unavailable(reason),
        },
    }
}
