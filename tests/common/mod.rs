//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cdc_core::{ChangeEvent, LogMessage};
use cdc_log::decode_frames;
use cdc_sim::{inspect, EngineConfig};
use cdc_sink::{partition, MemoryObjectSink, ObjectSink, SinkError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// `orders(id pk, status)`, inserts only.
pub const ORDERS_INSERT_ONLY: &str = r#"
seed: 42
tables:
  - name: orders
    primary_key:
      name: id
      type: big_int
      generator:
        type: sequential
        start: 1
    columns:
      - name: status
        type: text
        generator:
          type: one_of
          values: [pending, paid, shipped]
"#;

/// Two tables, all operations, multi-change transactions and evolutions.
pub const MIXED: &str = r#"
seed: 7
tables:
  - name: orders
    weight: 3
    replica_identity: full
    primary_key:
      name: id
      type: big_int
      generator:
        type: sequential
    columns:
      - name: status
        type: text
        generator:
          type: one_of
          values: [pending, paid, shipped]
      - name: amount
        type: big_int
        generator:
          type: int_range
          min: 1
          max: 1000
  - name: users
    weight: 1
    primary_key:
      name: id
      type: uuid
      generator:
        type: uuid_v4
    columns:
      - name: email
        type: text
        nullable: true
        generator:
          type: pattern
          pattern: "user{index}@example.com"
op_ratios:
  insert: 0.5
  update: 0.3
  delete: 0.2
transaction_size:
  type: uniform
  min: 1
  max: 4
evolution_schedule:
  - at_tick: 50
    operation:
      op: add_column
      table: orders
      column:
        name: note
        type: text
        nullable: true
  - at_tick: 120
    operation:
      op: rename_column
      table: users
      from: email
      to: contact
"#;

/// Sink directory inside a test's temp dir.
pub fn sink_dir(root: &Path) -> PathBuf {
    root.join("sink")
}

/// Checkpoint directory inside a test's temp dir.
pub fn checkpoint_dir(root: &Path) -> PathBuf {
    root.join("checkpoints")
}

/// Engine config with a local sink and checkpoints under `root`.
///
/// `settings` holds extra top-level YAML lines.
pub fn engine_config(root: &Path, workload: &str, settings: &str) -> EngineConfig {
    let workload: String = workload
        .lines()
        .map(|line| format!("  {line}\n"))
        .collect();
    let yaml = format!(
        "sink:\n  type: local\n  dir: {}\ncheckpoint:\n  dir: {}\n{settings}\nworkload:\n{workload}",
        sink_dir(root).display(),
        checkpoint_dir(root).display(),
    );
    EngineConfig::from_yaml(&yaml).unwrap()
}

/// Every change event in the sink, in object order, duplicates kept.
pub async fn raw_events(sink: &dyn ObjectSink) -> Vec<ChangeEvent> {
    let history = inspect::load_schema_history(sink).await.unwrap();
    let mut events = Vec::new();
    for key in sink.list_objects("").await.unwrap() {
        if !partition::is_data_key(&key) {
            continue;
        }
        let bytes = sink.get_object(&key).await.unwrap().unwrap();
        for message in decode_frames(&bytes, &history).unwrap() {
            if let LogMessage::Change(event) = message {
                events.push(event);
            }
        }
    }
    events
}

/// Every file under `dir`, keyed by relative path.
pub fn snapshot_dir(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

/// Memory sink that remembers the order of successful puts.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: MemoryObjectSink,
    puts: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryObjectSink {
        &self.inner
    }

    /// Keys of successful puts, in order.
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectSink for RecordingSink {
    async fn put_object(&self, key: &str, bytes: Bytes) -> Result<(), SinkError> {
        self.inner.put_object(key, bytes).await?;
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, SinkError> {
        self.inner.get_object(key).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        self.inner.list_objects(prefix).await
    }
}
