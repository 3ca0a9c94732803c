//! Object key layout.
//!
//! ```text
//! {table}/{window}/{first_lsn:020}.cdc     change data
//! _schemas/v{version:010}.json             schema history feed
//! ```
//!
//! `window` is the commit timestamp floored to the partition window and
//! formatted `YYYYMMDDTHHMMSSZ`. Zero-padded LSNs make keys sort in write
//! order within a partition.

use cdc_core::{Lsn, SchemaVersion};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Prefix of the schema history feed.
pub const SCHEMA_PREFIX: &str = "_schemas/";

/// Extension of change data objects.
pub const DATA_SUFFIX: &str = ".cdc";

/// Start of the window containing `ts`.
pub fn window_start(ts: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_micros = window.as_micros().min(i64::MAX as u128) as i64;
    if window_micros <= 0 {
        return ts;
    }
    let micros = ts.timestamp_micros();
    let floored = micros - micros.rem_euclid(window_micros);
    DateTime::from_timestamp_micros(floored).unwrap_or(ts)
}

/// Window directory name.
pub fn window_label(window_start: DateTime<Utc>) -> String {
    window_start.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Key of a change data object.
pub fn object_key(table: &str, window_start: DateTime<Utc>, first_lsn: Lsn) -> String {
    format!(
        "{table}/{}/{:020}{DATA_SUFFIX}",
        window_label(window_start),
        first_lsn.0
    )
}

/// Key of a published schema version.
pub fn schema_key(version: SchemaVersion) -> String {
    format!("{SCHEMA_PREFIX}v{:010}.json", version.0)
}

/// Whether a key names a change data object.
pub fn is_data_key(key: &str) -> bool {
    !key.starts_with(SCHEMA_PREFIX) && key.ends_with(DATA_SUFFIX)
}

/// Table a data key belongs to.
pub fn table_of(key: &str) -> Option<&str> {
    if !is_data_key(key) {
        return None;
    }
    key.split('/').next()
}
