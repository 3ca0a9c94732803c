//! Reading a sink back, and the planned schema timeline.

use cdc_core::{ChangeEvent, LogMessage, SchemaHistory, SchemaRegistry, SchemaSnapshot};
use cdc_generator::WorkloadConfig;
use cdc_log::decode_frames;
use cdc_sink::partition::{self, SCHEMA_PREFIX};
use cdc_sink::ObjectSink;
use std::sync::Arc;

use crate::error::EngineError;

/// Load every schema version published to the sink's schema feed.
pub async fn load_schema_history(sink: &dyn ObjectSink) -> Result<SchemaHistory, EngineError> {
    let mut history = SchemaHistory::new();
    for key in sink.list_objects(SCHEMA_PREFIX).await? {
        let Some(bytes) = sink.get_object(&key).await? else {
            continue;
        };
        let snapshot: SchemaSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::SchemaFeed {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        if partition::schema_key(snapshot.version) != key {
            return Err(EngineError::SchemaFeed {
                key,
                reason: format!("holds schema {}", snapshot.version),
            });
        }
        history.insert(snapshot);
    }
    Ok(history)
}

/// Decode the change events in a sink, sorted by LSN.
///
/// Objects are read in key order, which is write order within each table.
/// With `table` set only that table's objects are read.
pub async fn read_events(
    sink: &dyn ObjectSink,
    table: Option<&str>,
) -> Result<Vec<ChangeEvent>, EngineError> {
    let history = load_schema_history(sink).await?;
    let prefix = table.map(|t| format!("{t}/")).unwrap_or_default();

    let mut events = Vec::new();
    for key in sink.list_objects(&prefix).await? {
        if !partition::is_data_key(&key) {
            continue;
        }
        let Some(bytes) = sink.get_object(&key).await? else {
            tracing::warn!("Object '{}' disappeared while reading", key);
            continue;
        };
        let messages = decode_frames(&bytes, &history)
            .map_err(|source| EngineError::Decode { key: key.clone(), source })?;
        events.extend(messages.into_iter().filter_map(|m| match m {
            LogMessage::Change(event) => Some(event),
            _ => None,
        }));
    }

    events.sort_by_key(|e| e.lsn);
    // objects rewritten under different batch bounds repeat events
    events.dedup_by_key(|e| e.lsn);
    Ok(events)
}

/// Schema versions the workload's evolution timeline publishes.
///
/// Evolutions scheduled after `through_tick` are left out; rejected
/// evolutions publish nothing, as during a run.
pub fn planned_schema_history(
    workload: &WorkloadConfig,
    through_tick: Option<u64>,
) -> Result<Vec<Arc<SchemaSnapshot>>, EngineError> {
    let mut registry = SchemaRegistry::new(&workload.table_specs())?;

    let mut schedule = workload.evolution_schedule.clone();
    schedule.sort_by_key(|e| e.at_tick);
    for evolution in schedule {
        if through_tick.is_some_and(|last| evolution.at_tick > last) {
            break;
        }
        if let Err(e) = registry.evolve(evolution.operation.clone()) {
            tracing::warn!(
                "Rejected {} scheduled at tick {}: {}",
                evolution.operation.kind(),
                evolution.at_tick,
                e
            );
        }
    }
    Ok(registry.history().to_vec())
}
