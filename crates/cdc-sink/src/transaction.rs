//! Encoded transactions handed from the producer to the sink writer.

use bytes::Bytes;
use cdc_core::{
    LogMessage, Lsn, RelationMessage, SchemaLookup, SchemaSnapshot, SchemaVersion,
    SequencedTransaction, Xid,
};
use cdc_log::{encode_frames, CodecError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Decides which tables need a Relation message.
///
/// A table is announced the first time a transaction touches it and again
/// once its definition changed. The tracker must see every transaction in
/// order, replayed ones included, so a resumed stream announces exactly what
/// an uninterrupted one would.
#[derive(Debug, Clone, Default)]
pub struct RelationTracker {
    announced: HashMap<String, SchemaVersion>,
}

impl RelationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables of `txn` to announce, recording them as announced.
    pub fn observe(
        &mut self,
        txn: &SequencedTransaction,
        schemas: &dyn SchemaLookup,
    ) -> Result<Vec<String>, CodecError> {
        let version = txn.begin.schema_version;
        let snapshot = schemas
            .snapshot(version)
            .ok_or(CodecError::UnknownSchemaVersion(version))?;

        let mut changed = Vec::new();
        for table in txn.tables() {
            let definition = snapshot
                .get_table(table)
                .ok_or_else(|| CodecError::UnknownTable {
                    table: table.to_string(),
                    version,
                })?;
            if self.announced.get(table) != Some(&definition.modified_in) {
                self.announced
                    .insert(table.to_string(), definition.modified_in);
                changed.push(table.to_string());
            }
        }
        Ok(changed)
    }
}

/// One table's part of a transaction, framed by copies of the
/// transaction's Begin and Commit markers.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSlice {
    /// Table name
    pub table: String,
    /// LSN of the first event of this table in the transaction
    pub first_lsn: Lsn,
    /// Number of change events in the slice
    pub event_count: usize,
    /// Length-prefixed frames: Begin, optional Relation, events, Commit
    pub bytes: Bytes,
}

/// A committed transaction in wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTransaction {
    /// Simulation tick that produced the transaction
    pub tick: u64,
    /// Transaction id
    pub xid: Xid,
    /// LSN of the first change
    pub first_lsn: Lsn,
    /// LSN of the commit
    pub commit_lsn: Lsn,
    /// Commit timestamp
    pub commit_ts: DateTime<Utc>,
    /// Schema version pinned by the transaction
    pub schema_version: SchemaVersion,
    /// Schema versions first published since the previous transaction
    pub new_schemas: Vec<Arc<SchemaSnapshot>>,
    /// Per-table slices, in first-touch order
    pub slices: Vec<TableSlice>,
}

impl EncodedTransaction {
    /// Split a sequenced transaction by table and encode each slice.
    ///
    /// Slices of the tables named in `relations` start with a Relation
    /// message describing the table at the transaction's schema version.
    pub fn encode(
        txn: &SequencedTransaction,
        schemas: &dyn SchemaLookup,
        new_schemas: Vec<Arc<SchemaSnapshot>>,
        relations: &[String],
    ) -> Result<Self, CodecError> {
        let version = txn.begin.schema_version;
        let begin = LogMessage::Begin(txn.begin.clone());
        let commit = LogMessage::Commit(txn.commit.clone());

        let mut slices = Vec::new();
        for table in txn.tables() {
            let events: Vec<LogMessage> = txn
                .events
                .iter()
                .filter(|e| e.table == table)
                .cloned()
                .map(LogMessage::Change)
                .collect();
            let first_lsn = match events.first() {
                Some(LogMessage::Change(event)) => event.lsn,
                _ => continue,
            };

            let relation = if relations.iter().any(|r| r == table) {
                let definition = schemas
                    .snapshot(version)
                    .and_then(|s| s.get_table(table))
                    .ok_or_else(|| CodecError::UnknownTable {
                        table: table.to_string(),
                        version,
                    })?;
                Some(LogMessage::Relation(RelationMessage::from_table(
                    txn.xid(),
                    version,
                    definition,
                )))
            } else {
                None
            };

            let bytes = encode_frames(
                std::iter::once(&begin)
                    .chain(relation.iter())
                    .chain(events.iter())
                    .chain(std::iter::once(&commit)),
                schemas,
            )?;
            slices.push(TableSlice {
                table: table.to_string(),
                first_lsn,
                event_count: events.len(),
                bytes,
            });
        }

        Ok(Self {
            tick: txn.tick,
            xid: txn.xid(),
            first_lsn: txn.first_lsn(),
            commit_lsn: txn.commit_lsn(),
            commit_ts: txn.begin.commit_ts,
            schema_version: txn.begin.schema_version,
            new_schemas,
            slices,
        })
    }

    /// Number of change events across all slices.
    pub fn event_count(&self) -> usize {
        self.slices.iter().map(|s| s.event_count).sum()
    }

    /// Encoded size across all slices.
    pub fn byte_size(&self) -> usize {
        self.slices.iter().map(|s| s.bytes.len()).sum()
    }
}
