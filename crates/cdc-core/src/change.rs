//! Change events and transaction framing.
//!
//! The generator produces [`LogicalChange`]s grouped in a
//! [`TransactionBuffer`]; the sequencer turns a buffer into a
//! [`SequencedTransaction`], i.e. a `Begin` marker, member
//! [`ChangeEvent`]s carrying LSNs, and a `Commit` marker. A
//! [`RelationMessage`] describes a table's columns in-band ahead of the
//! first change that uses that layout.

use crate::schema::{SchemaVersion, TableDefinition};
use crate::types::ColumnType;
use crate::values::{PrimaryKey, RowImage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log sequence number. Assigned once per change event, starting at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Position before the first event.
    pub const ZERO: Lsn = Lsn(0);

    /// The following position.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Lsn {
    /// Formats like a PostgreSQL `pg_lsn` (`high/low` in hex).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

/// Transaction id. One per transaction, starting at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Xid(pub u64);

impl Xid {
    /// The following transaction id.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row-level operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "Insert"),
            Operation::Update => write!(f, "Update"),
            Operation::Delete => write!(f, "Delete"),
        }
    }
}

/// A change before it is placed in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalChange {
    /// Target table
    pub table: String,
    /// Operation kind
    pub op: Operation,
    /// Primary key of the affected row
    pub key: PrimaryKey,
    /// Old row image (update/delete), possibly key-only
    pub before: Option<RowImage>,
    /// New row image (insert/update)
    pub after: Option<RowImage>,
}

/// Changes of one transaction, in generation order.
///
/// The schema version is pinned when the transaction starts and is carried
/// by every member event.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBuffer {
    /// Simulation tick that produced this transaction
    pub tick: u64,
    /// Schema version pinned for the whole transaction
    pub schema_version: SchemaVersion,
    /// Commit timestamp in simulated time
    pub commit_ts: DateTime<Utc>,
    /// Member changes
    pub changes: Vec<LogicalChange>,
}

/// A sequenced row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Log position of this event
    pub lsn: Lsn,
    /// Owning transaction
    pub xid: Xid,
    /// Target table
    pub table: String,
    /// Operation kind
    pub op: Operation,
    /// Old row image (update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<RowImage>,
    /// New row image (insert/update)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<RowImage>,
    /// Schema version the images conform to
    pub schema_version: SchemaVersion,
    /// Commit timestamp of the owning transaction
    pub commit_ts: DateTime<Utc>,
}

/// Marks the start of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginMarker {
    /// Transaction id
    pub xid: Xid,
    /// LSN of the last member event
    pub final_lsn: Lsn,
    /// Commit timestamp
    pub commit_ts: DateTime<Utc>,
    /// Schema version pinned by this transaction
    pub schema_version: SchemaVersion,
}

/// Marks the end of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMarker {
    /// Transaction id
    pub xid: Xid,
    /// LSN of the commit (the last member event)
    pub commit_lsn: Lsn,
    /// Position right after this transaction
    pub end_lsn: Lsn,
    /// Commit timestamp
    pub commit_ts: DateTime<Utc>,
}

/// Column of a [`RelationMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationColumn {
    /// Attribute number
    pub id: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Part of the replica identity (the primary key)
    pub key: bool,
}

/// Table layout announcement.
///
/// Sent inside a transaction, after `Begin`, the first time the stream
/// touches a table and again whenever the table's definition changed since
/// the last announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMessage {
    /// Transaction carrying the announcement
    pub xid: Xid,
    /// Schema version the layout belongs to
    pub schema_version: SchemaVersion,
    pub table: String,
    /// Columns in tuple order
    pub columns: Vec<RelationColumn>,
}

impl RelationMessage {
    /// Describe `table` as defined at `schema_version`.
    pub fn from_table(xid: Xid, schema_version: SchemaVersion, table: &TableDefinition) -> Self {
        Self {
            xid,
            schema_version,
            table: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|c| RelationColumn {
                    id: c.id,
                    name: c.name.clone(),
                    column_type: c.column_type.clone(),
                    key: c.primary_key,
                })
                .collect(),
        }
    }
}

/// One message of the replication stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogMessage {
    Begin(BeginMarker),
    Relation(RelationMessage),
    Change(ChangeEvent),
    Commit(CommitMarker),
}

impl LogMessage {
    /// Transaction id this message belongs to.
    pub fn xid(&self) -> Xid {
        match self {
            LogMessage::Begin(b) => b.xid,
            LogMessage::Relation(r) => r.xid,
            LogMessage::Change(c) => c.xid,
            LogMessage::Commit(c) => c.xid,
        }
    }
}

/// A fully framed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedTransaction {
    /// Simulation tick that produced this transaction
    pub tick: u64,
    /// Begin marker
    pub begin: BeginMarker,
    /// Member events in generation order
    pub events: Vec<ChangeEvent>,
    /// Commit marker
    pub commit: CommitMarker,
}

impl SequencedTransaction {
    /// Transaction id.
    pub fn xid(&self) -> Xid {
        self.begin.xid
    }

    /// LSN of the first member event.
    pub fn first_lsn(&self) -> Lsn {
        self.events.first().map(|e| e.lsn).unwrap_or(self.commit.commit_lsn)
    }

    /// LSN of the commit.
    pub fn commit_lsn(&self) -> Lsn {
        self.commit.commit_lsn
    }

    /// Flatten into stream messages: begin, members, commit.
    pub fn messages(&self) -> Vec<LogMessage> {
        let mut messages = Vec::with_capacity(self.events.len() + 2);
        messages.push(LogMessage::Begin(self.begin.clone()));
        messages.extend(self.events.iter().cloned().map(LogMessage::Change));
        messages.push(LogMessage::Commit(self.commit.clone()));
        messages
    }

    /// Names of the tables touched by this transaction, in first-touch order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for event in &self.events {
            if !tables.contains(&event.table.as_str()) {
                tables.push(&event.table);
            }
        }
        tables
    }
}
