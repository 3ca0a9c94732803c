//! Binary wire format for log messages.
//!
//! The layout follows PostgreSQL's `pgoutput` protocol. All integers are
//! big-endian and timestamps are microseconds since 2000-01-01 UTC.
//!
//! ```text
//! Begin   'B' final_lsn:i64 commit_ts:i64 xid:i64 schema_version:i32
//! Relation 'R' xid:i64 schema_version:i32 table:cstring count:i16 column*
//! Commit  'C' flags:i8 commit_lsn:i64 end_lsn:i64 commit_ts:i64 xid:i64
//! Insert  'I' header 'N' tuple
//! Update  'U' header ['K' | 'O' tuple] 'N' tuple
//! Delete  'D' header ('K' | 'O') tuple
//!
//! header  lsn:i64 xid:i64 commit_ts:i64 schema_version:i32 table:cstring
//! tuple   count:i16 { 'n' | 'u' | 't' len:i32 utf8 }*
//! column  flags:i8 id:i16 name:cstring type_oid:i32 type_modifier:i32
//! ```
//!
//! Relation columns carry PostgreSQL type OIDs and type modifiers, with
//! flag bit 1 marking key columns. A relation message describes itself, so
//! it decodes without a schema snapshot.
//!
//! Tuples list every column of the table at the event's schema version, in
//! column order. `'n'` is a SQL null and `'u'` a column that was not
//! captured, so the two stay distinct after a round trip.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cdc_core::{
    BeginMarker, ChangeEvent, ColumnType, CommitMarker, LogMessage, Lsn, Operation,
    RelationColumn, RelationMessage, RowImage, SchemaLookup, SchemaVersion, TableDefinition,
    Value, ValueError, Xid,
};
use chrono::{DateTime, Utc};

const MSG_BEGIN: u8 = b'B';
const MSG_COMMIT: u8 = b'C';
const MSG_RELATION: u8 = b'R';
const MSG_INSERT: u8 = b'I';
const MSG_UPDATE: u8 = b'U';
const MSG_DELETE: u8 = b'D';

const TUPLE_KEY: u8 = b'K';
const TUPLE_OLD: u8 = b'O';
const TUPLE_NEW: u8 = b'N';

const COLUMN_NULL: u8 = b'n';
const COLUMN_UNCHANGED: u8 = b'u';
const COLUMN_TEXT: u8 = b't';

const RELATION_KEY_FLAG: i8 = 1;

/// Header size PostgreSQL adds to every non-default type modifier.
const VARHDRSZ: i32 = 4;

const OID_BOOL: i32 = 16;
const OID_INT8: i32 = 20;
const OID_INT2: i32 = 21;
const OID_INT4: i32 = 23;
const OID_TEXT: i32 = 25;
const OID_FLOAT4: i32 = 700;
const OID_FLOAT8: i32 = 701;
const OID_VARCHAR: i32 = 1043;
const OID_TIMESTAMPTZ: i32 = 1184;
const OID_NUMERIC: i32 = 1700;
const OID_UUID: i32 = 2950;
const OID_JSONB: i32 = 3802;

/// Microseconds between the Unix epoch and 2000-01-01 00:00:00 UTC.
const PG_EPOCH_OFFSET_MICROS: i64 = 946_684_800_000_000;

/// Error type for encoding and decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Message truncated: {needed} more bytes expected")]
    Truncated { needed: usize },

    #[error("Unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Unknown tuple kind {0:#04x}")]
    UnknownTupleKind(u8),

    #[error("Unknown column kind {0:#04x}")]
    UnknownColumnKind(u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Table '{table}' has {expected} columns at schema {version}, tuple has {actual}")]
    ColumnCountMismatch {
        table: String,
        version: SchemaVersion,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid column value: {0}")]
    InvalidValue(#[from] ValueError),

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("Unknown schema version {0}")]
    UnknownSchemaVersion(SchemaVersion),

    #[error("Table '{table}' does not exist at schema {version}")]
    UnknownTable {
        table: String,
        version: SchemaVersion,
    },

    #[error("Column '{column}' does not exist in table '{table}' at schema {version}")]
    UnknownColumn {
        table: String,
        column: String,
        version: SchemaVersion,
    },

    #[error("{op} event on '{table}' has no {image} image")]
    MissingImage {
        op: Operation,
        table: String,
        image: &'static str,
    },

    #[error("{0} is too large to encode")]
    Oversized(&'static str),

    #[error("Unsupported column type oid {oid} (modifier {type_modifier})")]
    UnsupportedType { oid: i32, type_modifier: i32 },
}

/// Encode one message.
///
/// Change events are laid out against the table definition of their schema
/// version, which must be known to `schemas`.
pub fn encode(message: &LogMessage, schemas: &dyn SchemaLookup) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(message, schemas, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one message. Bytes left over are an error.
pub fn decode(bytes: &[u8], schemas: &dyn SchemaLookup) -> Result<LogMessage, CodecError> {
    let mut reader = Reader::new(bytes);
    let message = match reader.u8()? {
        MSG_BEGIN => LogMessage::Begin(BeginMarker {
            final_lsn: Lsn(reader.i64()? as u64),
            commit_ts: reader.timestamp()?,
            xid: Xid(reader.i64()? as u64),
            schema_version: SchemaVersion(reader.i32()? as u32),
        }),
        MSG_RELATION => LogMessage::Relation(decode_relation(&mut reader)?),
        MSG_COMMIT => {
            let _flags = reader.i8()?;
            LogMessage::Commit(CommitMarker {
                commit_lsn: Lsn(reader.i64()? as u64),
                end_lsn: Lsn(reader.i64()? as u64),
                commit_ts: reader.timestamp()?,
                xid: Xid(reader.i64()? as u64),
            })
        }
        tag @ (MSG_INSERT | MSG_UPDATE | MSG_DELETE) => {
            LogMessage::Change(decode_change(tag, &mut reader, schemas)?)
        }
        other => return Err(CodecError::UnknownMessageType(other)),
    };

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }
    Ok(message)
}

/// Encode messages as a sequence of `u32` length-prefixed frames.
pub fn encode_frames<'a, I>(messages: I, schemas: &dyn SchemaLookup) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = &'a LogMessage>,
{
    let mut buf = BytesMut::new();
    let mut frame = BytesMut::with_capacity(64);
    for message in messages {
        frame.clear();
        encode_into(message, schemas, &mut frame)?;
        let len = u32::try_from(frame.len()).map_err(|_| CodecError::Oversized("frame"))?;
        buf.put_u32(len);
        buf.put_slice(&frame);
    }
    Ok(buf.freeze())
}

/// Decode a sequence of length-prefixed frames.
pub fn decode_frames(bytes: &[u8], schemas: &dyn SchemaLookup) -> Result<Vec<LogMessage>, CodecError> {
    let mut reader = Reader::new(bytes);
    let mut messages = Vec::new();
    while reader.remaining() > 0 {
        let len = reader.u32()? as usize;
        let frame = reader.take(len)?;
        messages.push(decode(frame, schemas)?);
    }
    Ok(messages)
}

fn encode_into(
    message: &LogMessage,
    schemas: &dyn SchemaLookup,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    match message {
        LogMessage::Begin(begin) => {
            buf.put_u8(MSG_BEGIN);
            buf.put_i64(begin.final_lsn.0 as i64);
            buf.put_i64(to_pg_micros(begin.commit_ts));
            buf.put_i64(begin.xid.0 as i64);
            buf.put_i32(begin.schema_version.0 as i32);
        }
        LogMessage::Commit(commit) => {
            buf.put_u8(MSG_COMMIT);
            buf.put_i8(0);
            buf.put_i64(commit.commit_lsn.0 as i64);
            buf.put_i64(commit.end_lsn.0 as i64);
            buf.put_i64(to_pg_micros(commit.commit_ts));
            buf.put_i64(commit.xid.0 as i64);
        }
        LogMessage::Relation(relation) => encode_relation(relation, buf)?,
        LogMessage::Change(event) => encode_change(event, schemas, buf)?,
    }
    Ok(())
}

fn encode_relation(relation: &RelationMessage, buf: &mut BytesMut) -> Result<(), CodecError> {
    buf.put_u8(MSG_RELATION);
    buf.put_i64(relation.xid.0 as i64);
    buf.put_i32(relation.schema_version.0 as i32);
    put_cstring(&relation.table, buf);

    let count =
        i16::try_from(relation.columns.len()).map_err(|_| CodecError::Oversized("relation"))?;
    buf.put_i16(count);
    for column in &relation.columns {
        let (oid, type_modifier) = type_oid(&column.column_type);
        buf.put_i8(if column.key { RELATION_KEY_FLAG } else { 0 });
        buf.put_i16(column.id as i16);
        put_cstring(&column.name, buf);
        buf.put_i32(oid);
        buf.put_i32(type_modifier);
    }
    Ok(())
}

fn decode_relation(reader: &mut Reader<'_>) -> Result<RelationMessage, CodecError> {
    let xid = Xid(reader.i64()? as u64);
    let schema_version = SchemaVersion(reader.i32()? as u32);
    let table = reader.cstring("table name")?;

    let count = reader.i16()?;
    let mut columns = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count.max(0) {
        let flags = reader.i8()?;
        let id = reader.i16()? as u16;
        let name = reader.cstring("column name")?;
        let oid = reader.i32()?;
        let type_modifier = reader.i32()?;
        columns.push(RelationColumn {
            id,
            name,
            column_type: column_type_of(oid, type_modifier)?,
            key: flags & RELATION_KEY_FLAG != 0,
        });
    }

    Ok(RelationMessage {
        xid,
        schema_version,
        table,
        columns,
    })
}

/// PostgreSQL type OID and type modifier of a column type.
fn type_oid(column_type: &ColumnType) -> (i32, i32) {
    match column_type {
        ColumnType::Bool => (OID_BOOL, -1),
        ColumnType::Int16 => (OID_INT2, -1),
        ColumnType::Int32 => (OID_INT4, -1),
        ColumnType::Int64 => (OID_INT8, -1),
        ColumnType::Float32 => (OID_FLOAT4, -1),
        ColumnType::Float64 => (OID_FLOAT8, -1),
        ColumnType::Decimal { precision, scale } => (
            OID_NUMERIC,
            ((i32::from(*precision) << 16) | i32::from(*scale)) + VARHDRSZ,
        ),
        ColumnType::VarChar { length } => (OID_VARCHAR, i32::from(*length) + VARHDRSZ),
        ColumnType::Text => (OID_TEXT, -1),
        ColumnType::Uuid => (OID_UUID, -1),
        ColumnType::Timestamp => (OID_TIMESTAMPTZ, -1),
        ColumnType::Json => (OID_JSONB, -1),
    }
}

fn column_type_of(oid: i32, type_modifier: i32) -> Result<ColumnType, CodecError> {
    let unsupported = || CodecError::UnsupportedType { oid, type_modifier };
    Ok(match oid {
        OID_BOOL => ColumnType::Bool,
        OID_INT2 => ColumnType::Int16,
        OID_INT4 => ColumnType::Int32,
        OID_INT8 => ColumnType::Int64,
        OID_FLOAT4 => ColumnType::Float32,
        OID_FLOAT8 => ColumnType::Float64,
        OID_NUMERIC => {
            let packed = type_modifier.checked_sub(VARHDRSZ).ok_or_else(unsupported)?;
            ColumnType::Decimal {
                precision: u8::try_from((packed >> 16) & 0xFFFF).map_err(|_| unsupported())?,
                scale: u8::try_from(packed & 0xFFFF).map_err(|_| unsupported())?,
            }
        }
        OID_VARCHAR => {
            let length = type_modifier.checked_sub(VARHDRSZ).ok_or_else(unsupported)?;
            ColumnType::VarChar {
                length: u16::try_from(length).map_err(|_| unsupported())?,
            }
        }
        OID_TEXT => ColumnType::Text,
        OID_UUID => ColumnType::Uuid,
        OID_TIMESTAMPTZ => ColumnType::Timestamp,
        OID_JSONB => ColumnType::Json,
        _ => return Err(unsupported()),
    })
}

fn put_cstring(value: &str, buf: &mut BytesMut) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

fn encode_change(
    event: &ChangeEvent,
    schemas: &dyn SchemaLookup,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let table = lookup_table(schemas, event.schema_version, &event.table)?;
    let missing = |image: &'static str| CodecError::MissingImage {
        op: event.op,
        table: event.table.clone(),
        image,
    };

    buf.put_u8(match event.op {
        Operation::Insert => MSG_INSERT,
        Operation::Update => MSG_UPDATE,
        Operation::Delete => MSG_DELETE,
    });
    buf.put_i64(event.lsn.0 as i64);
    buf.put_i64(event.xid.0 as i64);
    buf.put_i64(to_pg_micros(event.commit_ts));
    buf.put_i32(event.schema_version.0 as i32);
    put_cstring(&event.table, buf);

    match event.op {
        Operation::Insert => {
            let after = event.after.as_ref().ok_or_else(|| missing("new"))?;
            buf.put_u8(TUPLE_NEW);
            encode_tuple(table, event.schema_version, after, buf)?;
        }
        Operation::Update => {
            if let Some(before) = &event.before {
                buf.put_u8(old_tuple_kind(table, before));
                encode_tuple(table, event.schema_version, before, buf)?;
            }
            let after = event.after.as_ref().ok_or_else(|| missing("new"))?;
            buf.put_u8(TUPLE_NEW);
            encode_tuple(table, event.schema_version, after, buf)?;
        }
        Operation::Delete => {
            let before = event.before.as_ref().ok_or_else(|| missing("old"))?;
            buf.put_u8(old_tuple_kind(table, before));
            encode_tuple(table, event.schema_version, before, buf)?;
        }
    }
    Ok(())
}

/// `'K'` for key-only images, `'O'` for anything wider.
fn old_tuple_kind(table: &TableDefinition, image: &RowImage) -> u8 {
    let pk = &table.primary_key().name;
    if image.keys().all(|name| name == pk) {
        TUPLE_KEY
    } else {
        TUPLE_OLD
    }
}

fn encode_tuple(
    table: &TableDefinition,
    version: SchemaVersion,
    image: &RowImage,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    if let Some(unknown) = image.keys().find(|name| table.get_column(name).is_none()) {
        return Err(CodecError::UnknownColumn {
            table: table.name.clone(),
            column: unknown.clone(),
            version,
        });
    }

    let count = i16::try_from(table.columns.len()).map_err(|_| CodecError::Oversized("tuple"))?;
    buf.put_i16(count);
    for column in &table.columns {
        match image.get(&column.name) {
            None => buf.put_u8(COLUMN_UNCHANGED),
            Some(value) => {
                if !value.matches(&column.column_type) {
                    return Err(ValueError::TypeMismatch {
                        value: value.to_string(),
                        column_type: column.column_type.clone(),
                    }
                    .into());
                }
                match value.to_text() {
                    None => buf.put_u8(COLUMN_NULL),
                    Some(text) => {
                        let len = i32::try_from(text.len())
                            .map_err(|_| CodecError::Oversized("column value"))?;
                        buf.put_u8(COLUMN_TEXT);
                        buf.put_i32(len);
                        buf.put_slice(text.as_bytes());
                    }
                }
            }
        }
    }
    Ok(())
}

fn decode_change(
    tag: u8,
    reader: &mut Reader<'_>,
    schemas: &dyn SchemaLookup,
) -> Result<ChangeEvent, CodecError> {
    let lsn = Lsn(reader.i64()? as u64);
    let xid = Xid(reader.i64()? as u64);
    let commit_ts = reader.timestamp()?;
    let schema_version = SchemaVersion(reader.i32()? as u32);
    let table_name = reader.cstring("table name")?;
    let table = lookup_table(schemas, schema_version, &table_name)?;

    let (op, before, after) = match tag {
        MSG_INSERT => {
            reader.expect_tuple(&[TUPLE_NEW])?;
            let after = decode_tuple(table, schema_version, reader)?;
            (Operation::Insert, None, Some(after))
        }
        MSG_UPDATE => {
            let before = match reader.expect_tuple(&[TUPLE_KEY, TUPLE_OLD, TUPLE_NEW])? {
                TUPLE_NEW => None,
                _ => {
                    let before = decode_tuple(table, schema_version, reader)?;
                    reader.expect_tuple(&[TUPLE_NEW])?;
                    Some(before)
                }
            };
            let after = decode_tuple(table, schema_version, reader)?;
            (Operation::Update, before, Some(after))
        }
        _ => {
            reader.expect_tuple(&[TUPLE_KEY, TUPLE_OLD])?;
            let before = decode_tuple(table, schema_version, reader)?;
            (Operation::Delete, Some(before), None)
        }
    };

    Ok(ChangeEvent {
        lsn,
        xid,
        table: table_name,
        op,
        before,
        after,
        schema_version,
        commit_ts,
    })
}

fn decode_tuple(
    table: &TableDefinition,
    version: SchemaVersion,
    reader: &mut Reader<'_>,
) -> Result<RowImage, CodecError> {
    let count = reader.i16()?;
    if count < 0 || count as usize != table.columns.len() {
        return Err(CodecError::ColumnCountMismatch {
            table: table.name.clone(),
            version,
            expected: table.columns.len(),
            actual: count.max(0) as usize,
        });
    }

    let mut image = RowImage::new();
    for column in &table.columns {
        match reader.u8()? {
            COLUMN_UNCHANGED => {}
            COLUMN_NULL => {
                image.insert(column.name.clone(), Value::Null);
            }
            COLUMN_TEXT => {
                let len = reader.i32()?;
                let len = usize::try_from(len).map_err(|_| CodecError::Oversized("column value"))?;
                let text = std::str::from_utf8(reader.take(len)?)
                    .map_err(|_| CodecError::InvalidUtf8("column value"))?;
                image.insert(column.name.clone(), Value::from_text(text, &column.column_type)?);
            }
            other => return Err(CodecError::UnknownColumnKind(other)),
        }
    }
    Ok(image)
}

fn lookup_table<'a>(
    schemas: &'a dyn SchemaLookup,
    version: SchemaVersion,
    table: &str,
) -> Result<&'a TableDefinition, CodecError> {
    schemas
        .snapshot(version)
        .ok_or(CodecError::UnknownSchemaVersion(version))?
        .get_table(table)
        .ok_or_else(|| CodecError::UnknownTable {
            table: table.to_string(),
            version,
        })
}

fn to_pg_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros() - PG_EPOCH_OFFSET_MICROS
}

fn from_pg_micros(micros: i64) -> Result<DateTime<Utc>, CodecError> {
    micros
        .checked_add(PG_EPOCH_OFFSET_MICROS)
        .and_then(DateTime::from_timestamp_micros)
        .ok_or(CodecError::InvalidTimestamp(micros))
}

/// Bounds-checked reads over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        match n.checked_sub(self.buf.remaining()) {
            Some(needed) if needed > 0 => Err(CodecError::Truncated { needed }),
            _ => Ok(()),
        }
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn i8(&mut self) -> Result<i8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    fn i16(&mut self) -> Result<i16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    fn timestamp(&mut self) -> Result<DateTime<Utc>, CodecError> {
        from_pg_micros(self.i64()?)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.need(n)?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn cstring(&mut self, what: &'static str) -> Result<String, CodecError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(CodecError::Truncated { needed: 1 })?;
        let raw = self.take(end)?;
        self.buf.advance(1);
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8(what))
    }

    fn expect_tuple(&mut self, allowed: &[u8]) -> Result<u8, CodecError> {
        let kind = self.u8()?;
        if allowed.contains(&kind) {
            Ok(kind)
        } else {
            Err(CodecError::UnknownTupleKind(kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_core::{ColumnSpec, ColumnType, EvolutionOp, SchemaHistory, SchemaRegistry, TableSpec};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new(&[TableSpec {
            name: "orders".to_string(),
            primary_key: ColumnSpec::new("id", ColumnType::Int64),
            columns: vec![
                ColumnSpec::nullable("status", ColumnType::Text),
                ColumnSpec::nullable("amount", ColumnType::Decimal { precision: 10, scale: 2 }),
                ColumnSpec::nullable("customer", ColumnType::Uuid),
            ],
        }])
        .unwrap();
        registry
            .evolve(EvolutionOp::AddColumn {
                table: "orders".to_string(),
                column: ColumnSpec::nullable("shipped_at", ColumnType::Timestamp),
            })
            .unwrap();
        registry
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap() + chrono::TimeDelta::microseconds(17)
    }

    fn image(pairs: &[(&str, Value)]) -> RowImage {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn event(op: Operation, before: Option<RowImage>, after: Option<RowImage>) -> LogMessage {
        LogMessage::Change(ChangeEvent {
            lsn: Lsn(42),
            xid: Xid(7),
            table: "orders".to_string(),
            op,
            before,
            after,
            schema_version: SchemaVersion(1),
            commit_ts: ts(),
        })
    }

    fn full_row() -> RowImage {
        image(&[
            ("id", Value::Int64(1)),
            ("status", Value::Text("paid".to_string())),
            ("amount", Value::Decimal("12.50".to_string())),
            ("customer", Value::Uuid(Uuid::from_u128(0xABCD))),
            ("shipped_at", Value::Timestamp(ts())),
        ])
    }

    fn round_trip(message: &LogMessage) -> LogMessage {
        let registry = registry();
        let bytes = encode(message, &registry).unwrap();
        decode(&bytes, &registry).unwrap()
    }

    #[test]
    fn test_markers_round_trip() {
        let begin = LogMessage::Begin(BeginMarker {
            xid: Xid(7),
            final_lsn: Lsn(44),
            commit_ts: ts(),
            schema_version: SchemaVersion(1),
        });
        let commit = LogMessage::Commit(CommitMarker {
            xid: Xid(7),
            commit_lsn: Lsn(44),
            end_lsn: Lsn(45),
            commit_ts: ts(),
        });

        assert_eq!(round_trip(&begin), begin);
        assert_eq!(round_trip(&commit), commit);
    }

    #[test]
    fn test_begin_layout() {
        let begin = LogMessage::Begin(BeginMarker {
            xid: Xid(3),
            final_lsn: Lsn(0x0102),
            commit_ts: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            schema_version: SchemaVersion(2),
        });
        let bytes = encode(&begin, &registry()).unwrap();

        assert_eq!(bytes.len(), 1 + 8 + 8 + 8 + 4);
        assert_eq!(bytes[0], b'B');
        assert_eq!(&bytes[1..9], &[0, 0, 0, 0, 0, 0, 1, 2]);
        // PostgreSQL epoch
        assert_eq!(&bytes[9..17], &[0; 8]);
        assert_eq!(&bytes[25..29], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_insert_round_trip() {
        let insert = event(Operation::Insert, None, Some(full_row()));
        assert_eq!(round_trip(&insert), insert);
    }

    #[test]
    fn test_null_and_absent_stay_distinct() {
        let mut after = full_row();
        after.insert("status".to_string(), Value::Null);
        after.remove("shipped_at");
        let insert = event(Operation::Insert, None, Some(after.clone()));

        let LogMessage::Change(decoded) = round_trip(&insert) else {
            panic!("expected a change event");
        };
        let decoded = decoded.after.unwrap();
        assert_eq!(decoded.get("status"), Some(&Value::Null));
        assert!(!decoded.contains_key("shipped_at"));
        assert_eq!(decoded, after);
    }

    #[test]
    fn test_update_with_key_only_before() {
        let before = image(&[("id", Value::Int64(1))]);
        let update = event(Operation::Update, Some(before), Some(full_row()));
        let bytes = encode(&update, &registry()).unwrap();

        let header_len = 1 + 8 + 8 + 8 + 4 + "orders\0".len();
        assert_eq!(bytes[header_len], b'K');
        assert_eq!(round_trip(&update), update);
    }

    #[test]
    fn test_update_with_old_before() {
        let update = event(Operation::Update, Some(full_row()), Some(full_row()));
        let bytes = encode(&update, &registry()).unwrap();

        let header_len = 1 + 8 + 8 + 8 + 4 + "orders\0".len();
        assert_eq!(bytes[header_len], b'O');
        assert_eq!(round_trip(&update), update);
    }

    #[test]
    fn test_update_without_before() {
        let update = event(Operation::Update, None, Some(full_row()));
        assert_eq!(round_trip(&update), update);
    }

    #[test]
    fn test_delete_round_trip() {
        let delete = event(Operation::Delete, Some(image(&[("id", Value::Int64(1))])), None);
        assert_eq!(round_trip(&delete), delete);
    }

    #[test]
    fn test_delete_without_before_fails() {
        let delete = event(Operation::Delete, None, None);
        assert!(matches!(
            encode(&delete, &registry()),
            Err(CodecError::MissingImage { image: "old", .. })
        ));
    }

    #[test]
    fn test_unknown_schema_version() {
        let registry = registry();
        let bytes = encode(&event(Operation::Insert, None, Some(full_row())), &registry).unwrap();

        // consumer only knows version 0
        let mut history = SchemaHistory::new();
        history.insert((**registry.schema_at(SchemaVersion(0)).unwrap()).clone());

        assert_eq!(
            decode(&bytes, &history),
            Err(CodecError::UnknownSchemaVersion(SchemaVersion(1)))
        );
    }

    #[test]
    fn test_image_column_not_in_version() {
        let mut after = full_row();
        after.insert("missing".to_string(), Value::Int32(1));
        let result = encode(&event(Operation::Insert, None, Some(after)), &registry());
        assert!(matches!(result, Err(CodecError::UnknownColumn { column, .. }) if column == "missing"));
    }

    #[test]
    fn test_value_type_mismatch_rejected() {
        let mut after = full_row();
        after.insert("id".to_string(), Value::Text("one".to_string()));
        let result = encode(&event(Operation::Insert, None, Some(after)), &registry());
        assert!(matches!(result, Err(CodecError::InvalidValue(_))));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let registry = registry();
        let bytes = encode(&event(Operation::Insert, None, Some(full_row())), &registry).unwrap();

        for cut in [1, 10, 30, bytes.len() - 1] {
            assert!(matches!(
                decode(&bytes[..cut], &registry),
                Err(CodecError::Truncated { .. })
            ));
        }

        let mut padded = bytes.to_vec();
        padded.push(0);
        assert_eq!(decode(&padded, &registry), Err(CodecError::TrailingBytes(1)));
    }

    fn relation() -> LogMessage {
        let registry = registry();
        let mut relation = RelationMessage::from_table(
            Xid(7),
            SchemaVersion(1),
            registry
                .schema_at(SchemaVersion(1))
                .unwrap()
                .get_table("orders")
                .unwrap(),
        );
        relation.columns.push(RelationColumn {
            id: 9,
            name: "code".to_string(),
            column_type: ColumnType::VarChar { length: 12 },
            key: false,
        });
        LogMessage::Relation(relation)
    }

    #[test]
    fn test_relation_round_trip_without_schema() {
        let relation = relation();
        let bytes = encode(&relation, &SchemaHistory::new()).unwrap();
        assert_eq!(bytes[0], b'R');
        assert_eq!(decode(&bytes, &SchemaHistory::new()).unwrap(), relation);
    }

    #[test]
    fn test_relation_type_modifiers() {
        let bytes = encode(&relation(), &registry()).unwrap();
        let header = 1 + 8 + 4 + "orders\0".len() + 2;
        // id is the first column: key flag, attribute 1, int8
        assert_eq!(bytes[header], 1);
        assert_eq!(&bytes[header + 1..header + 3], &[0, 1]);
        let id_oid = header + 3 + "id\0".len();
        assert_eq!(&bytes[id_oid..id_oid + 4], &20i32.to_be_bytes());
        assert_eq!(&bytes[id_oid + 4..id_oid + 8], &(-1i32).to_be_bytes());

        assert_eq!(type_oid(&ColumnType::VarChar { length: 12 }), (1043, 16));
        assert_eq!(
            type_oid(&ColumnType::Decimal { precision: 10, scale: 2 }),
            (1700, (10 << 16 | 2) + 4)
        );
    }

    #[test]
    fn test_relation_unknown_type_oid() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'R');
        buf.put_i64(1);
        buf.put_i32(0);
        put_cstring("orders", &mut buf);
        buf.put_i16(1);
        buf.put_i8(0);
        buf.put_i16(1);
        put_cstring("shape", &mut buf);
        buf.put_i32(600);
        buf.put_i32(-1);

        assert_eq!(
            decode(&buf, &registry()),
            Err(CodecError::UnsupportedType {
                oid: 600,
                type_modifier: -1
            })
        );
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(
            decode(b"Z", &registry()),
            Err(CodecError::UnknownMessageType(b'Z'))
        );
        assert_eq!(decode(b"", &registry()), Err(CodecError::Truncated { needed: 1 }));
    }

    #[test]
    fn test_frames_round_trip() {
        let registry = registry();
        let messages = vec![
            LogMessage::Begin(BeginMarker {
                xid: Xid(7),
                final_lsn: Lsn(43),
                commit_ts: ts(),
                schema_version: SchemaVersion(1),
            }),
            relation(),
            event(Operation::Insert, None, Some(full_row())),
            event(Operation::Delete, Some(full_row()), None),
            LogMessage::Commit(CommitMarker {
                xid: Xid(7),
                commit_lsn: Lsn(43),
                end_lsn: Lsn(44),
                commit_ts: ts(),
            }),
        ];

        let bytes = encode_frames(&messages, &registry).unwrap();
        assert_eq!(decode_frames(&bytes, &registry).unwrap(), messages);
        assert!(decode_frames(&bytes[..bytes.len() - 2], &registry).is_err());
    }
}
