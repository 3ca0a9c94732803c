//! Producer/writer pipeline of one simulation instance.
//!
//! ```text
//!  ┌──────────────── producer task ────────────────┐          ┌── writer task ──┐
//!  clock ─► generator ─► sequencer ─► encoder ─► mpsc (bounded) ─► SinkWriter ─► ObjectSink
//!                                                                     │
//!                                                                     └─► checkpoint + lease
//! ```
//!
//! On start the checkpoint is loaded. When one exists, ticks `1..=T` are
//! regenerated without being sent (the workload is deterministic per tick),
//! the replayed position is checked against the checkpoint, and production
//! continues at tick `T + 1` with LSN `N + 1`. Replay also rebuilds which
//! table layouts were announced, so Relation messages are not repeated.

use cdc_core::SchemaVersion;
use cdc_generator::{ChangeGenerator, TickPacer};
use cdc_log::LogSequencer;
use cdc_sink::{
    BatchConfig, EncodedTransaction, LocalObjectSink, ObjectSink, RelationTracker, RetryPolicy,
    S3ObjectSink, SimulationCheckpoint, SinkWriter, WriteError,
};
use checkpoint::{Checkpoint, CheckpointLease, CheckpointManager};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, SinkConfig};
use crate::error::EngineError;

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Checkpoint the run resumed from
    pub resumed_from: Option<SimulationCheckpoint>,
    /// Last tick generated, replayed ticks included
    pub last_tick: u64,
    /// Transactions produced by this run
    pub transactions: u64,
    /// Checkpoint after the final flush
    pub checkpoint: Option<SimulationCheckpoint>,
}

/// Create the object sink a configuration names.
pub async fn build_sink(config: &SinkConfig) -> Arc<dyn ObjectSink> {
    match config {
        SinkConfig::Local { dir } => Arc::new(LocalObjectSink::new(dir.clone())),
        SinkConfig::S3 { bucket, prefix } => {
            Arc::new(S3ObjectSink::new(bucket.clone(), prefix.clone()).await)
        }
    }
}

/// One simulation instance.
pub struct Engine {
    config: EngineConfig,
    sink: Arc<dyn ObjectSink>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("instance", &self.config.checkpoint.instance)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine writing to the sink named in `config`.
    pub async fn from_config(config: EngineConfig) -> Self {
        let sink = build_sink(&config.sink).await;
        Self::with_sink(config, sink)
    }

    /// Create an engine writing to `sink`, ignoring `config.sink`.
    pub fn with_sink(config: EngineConfig, sink: Arc<dyn ObjectSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run until `max_ticks` is reached, `cancel` fires, or a fatal error.
    ///
    /// Cancellation is observed between ticks only; the transaction of the
    /// current tick is completed and written before the writer flushes and
    /// exits.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary, EngineError> {
        let settings = &self.config.checkpoint;
        let instance = settings.instance.clone();
        let lease = CheckpointLease::acquire(&settings.dir, &instance, settings.lease_ttl)?;
        let checkpoints = CheckpointManager::filesystem(&settings.dir, &instance);

        let (producer, resumed_from) = match prepare(&self.config, &checkpoints).await {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Err(release) = lease.release() {
                    tracing::warn!("Failed to release lease for '{}': {}", instance, release);
                }
                return Err(e);
            }
        };

        let mut writer = SinkWriter::new(
            Arc::clone(&self.sink),
            RetryPolicy::from(&self.config.retry),
            BatchConfig::from(&self.config.batching),
            checkpoints,
        )
        .with_lease(lease);
        if let Some(checkpoint) = &resumed_from {
            writer.resume_from(checkpoint.clone());
        }

        tracing::info!(
            "Starting instance '{}' at tick {}",
            instance,
            producer.generator.last_tick() + 1
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let writer_task = tokio::spawn(write_all(writer, rx));
        let producer_task = tokio::spawn(producer.run(tx, cancel));

        let produced = producer_task.await?;
        let written = writer_task.await?;

        // a writer failure is why the producer stopped, so report it first
        let checkpoint = written?;
        let (transactions, last_tick) = produced?;

        tracing::info!(
            "Instance '{}' stopped after tick {} ({} transactions produced{})",
            instance,
            last_tick,
            transactions,
            checkpoint
                .as_ref()
                .map(|c| format!(", checkpoint {}", c.to_cli_string()))
                .unwrap_or_default()
        );

        Ok(RunSummary {
            resumed_from,
            last_tick,
            transactions,
            checkpoint,
        })
    }
}

/// Load the checkpoint and bring a fresh producer to its position.
async fn prepare(
    config: &EngineConfig,
    checkpoints: &CheckpointManager,
) -> Result<(Producer, Option<SimulationCheckpoint>), EngineError> {
    let resume = checkpoints.load::<SimulationCheckpoint>().await?;
    let mut producer = Producer::new(config)?;
    if let Some(checkpoint) = &resume {
        producer.replay(checkpoint)?;
        tracing::info!(
            "Resuming '{}' after {}",
            checkpoints.instance(),
            checkpoint.to_cli_string()
        );
    }
    Ok((producer, resume))
}

/// Generates, sequences and encodes one transaction per tick.
struct Producer {
    generator: ChangeGenerator,
    sequencer: LogSequencer,
    relations: RelationTracker,
    pacer: TickPacer,
    published: Option<SchemaVersion>,
    max_ticks: Option<u64>,
}

impl Producer {
    fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let clock = config.simulation_clock();
        let pacer = TickPacer::new(config.clock.mode, clock.tick_interval());
        Ok(Self {
            generator: ChangeGenerator::new(config.workload.clone(), clock)?,
            sequencer: LogSequencer::new(),
            relations: RelationTracker::new(),
            pacer,
            published: None,
            max_ticks: config.max_ticks,
        })
    }

    /// Regenerate the committed ticks without emitting them.
    fn replay(&mut self, checkpoint: &SimulationCheckpoint) -> Result<(), EngineError> {
        let ticks = checkpoint.last_committed_tick;
        for tick in 1..=ticks {
            let buffer = self.generator.next_batch(tick)?;
            let sequenced = self.sequencer.sequence(buffer)?;
            self.relations
                .observe(&sequenced, self.generator.registry())?;
        }

        let actual_lsn = self.sequencer.last_lsn();
        let actual_version = self.generator.registry().current_version();
        if actual_lsn != checkpoint.last_committed_lsn || actual_version != checkpoint.schema_version
        {
            return Err(EngineError::ReplayDiverged {
                ticks,
                expected_lsn: checkpoint.last_committed_lsn,
                actual_lsn,
                expected_version: checkpoint.schema_version,
                actual_version,
            });
        }

        // the writer emits schema objects before the data that uses them
        self.published = Some(actual_version);
        tracing::debug!("Replayed {} ticks up to LSN {}", ticks, actual_lsn);
        Ok(())
    }

    /// Build the encoded transaction of `tick`.
    fn produce(&mut self, tick: u64) -> Result<EncodedTransaction, EngineError> {
        let buffer = self.generator.next_batch(tick)?;
        let sequenced = self.sequencer.sequence(buffer)?;

        let registry = self.generator.registry();
        let current = registry.current_version();
        let first_new = self.published.map_or(0, |v| v.0 + 1);
        let new_schemas = (first_new..=current.0)
            .map(|v| registry.schema_at(SchemaVersion(v)).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        self.published = Some(current);

        let relations = self.relations.observe(&sequenced, registry)?;
        let encoded = EncodedTransaction::encode(&sequenced, registry, new_schemas, &relations)?;
        tracing::debug!(
            "Tick {}: xid {} with {} events at LSN {}..={}",
            tick,
            encoded.xid,
            encoded.event_count(),
            encoded.first_lsn.0,
            encoded.commit_lsn.0
        );
        Ok(encoded)
    }

    /// Produce until `max_ticks`, cancellation, or the writer going away.
    ///
    /// Returns the number of transactions sent and the last tick generated.
    async fn run(
        mut self,
        tx: mpsc::Sender<EncodedTransaction>,
        cancel: CancellationToken,
    ) -> Result<(u64, u64), EngineError> {
        let mut sent = 0;
        loop {
            let tick = self.generator.last_tick() + 1;
            if self.max_ticks.is_some_and(|max| tick > max) {
                tracing::info!("Reached max_ticks after tick {}", tick - 1);
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Stop requested before tick {}", tick);
                    break;
                }
                _ = tx.closed() => {
                    tracing::debug!("Writer stopped; producer exiting before tick {}", tick);
                    break;
                }
                _ = self.pacer.wait_for_tick(tick) => {}
            }

            let txn = self.produce(tick)?;
            if tx.send(txn).await.is_err() {
                tracing::debug!("Writer stopped; producer exiting at tick {}", tick);
                break;
            }
            sent += 1;
        }
        Ok((sent, self.generator.last_tick()))
    }
}

/// Drain the channel into the writer, flushing once the producer is done.
///
/// The lease is renewed every half TTL while waiting for transactions, so a
/// slow producer does not let it go stale.
async fn write_all(
    mut writer: SinkWriter,
    mut rx: mpsc::Receiver<EncodedTransaction>,
) -> Result<Option<SimulationCheckpoint>, WriteError> {
    let mut renewal = writer
        .lease_renewal_interval()
        .filter(|period| !period.is_zero())
        .map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

    loop {
        let result = tokio::select! {
            received = rx.recv() => match received {
                Some(txn) => writer.push(txn).await.map(|_| ()),
                None => break,
            },
            _ = renewal_tick(&mut renewal) => writer.renew_lease().map_err(WriteError::from),
        };
        if let Err(e) = result {
            if let Err(release) = writer.release_lease() {
                tracing::warn!("Failed to release lease: {}", release);
            }
            return Err(e);
        }
    }
    writer.close().await
}

async fn renewal_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
