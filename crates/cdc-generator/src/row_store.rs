//! In-memory row state store.
//!
//! The store is the single source of truth for which primary keys exist.
//! Deleted rows are tombstoned rather than removed so they stay resolvable
//! through [`RowStore::get`], but they are never handed out as update or
//! delete targets.

use cdc_core::{PrimaryKey, RowImage, SchemaVersion};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error type for row store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowStoreError {
    /// A live row already uses this key
    #[error("Duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: PrimaryKey },

    /// The row does not exist or is tombstoned
    #[error("No such row {key} in table '{table}'")]
    NoSuchRow { table: String, key: PrimaryKey },

    /// The table has no live rows
    #[error("No live rows in table '{0}'")]
    NotFound(String),
}

/// How update and delete targets are picked among live rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Every live row is equally likely
    #[default]
    Uniform,
    /// Recently written rows are more likely; higher `bias` means hotter rows
    RecencyBiased { bias: f64 },
}

/// Marker left on a deleted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    /// Tick of the delete
    pub tick: u64,
}

/// Current state of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Primary key
    pub key: PrimaryKey,
    /// Full row image, primary key included
    pub values: RowImage,
    /// Schema version under which `values` are valid
    pub schema_version: SchemaVersion,
    /// Tick of the last insert or update
    pub modified_tick: u64,
    /// Set once the row is deleted
    pub tombstone: Option<Tombstone>,
}

impl Row {
    /// Whether the row has not been deleted.
    pub fn is_live(&self) -> bool {
        self.tombstone.is_none()
    }
}

/// Live keys in write order, with rank lookup in `O(log n)`.
///
/// Every write appends the key to `slots` and clears its previous slot. A
/// Fenwick tree over slot occupancy turns "the k-th oldest live key" into a
/// binary descent. Slots are compacted once most of them are empty.
#[derive(Debug, Default)]
struct RecencyIndex {
    slots: Vec<Option<PrimaryKey>>,
    // 1-based Fenwick tree stored at offset 0
    tree: Vec<usize>,
    positions: HashMap<PrimaryKey, usize>,
    live: usize,
}

impl RecencyIndex {
    const MIN_COMPACT_SLOTS: usize = 64;

    fn len(&self) -> usize {
        self.live
    }

    /// Make `key` the newest live key.
    fn push(&mut self, key: PrimaryKey) {
        self.remove(&key);
        self.append(key);
        if self.slots.len() > Self::MIN_COMPACT_SLOTS && self.slots.len() > 2 * self.live {
            self.compact();
        }
    }

    fn remove(&mut self, key: &PrimaryKey) -> bool {
        let Some(slot) = self.positions.remove(key) else {
            return false;
        };
        self.slots[slot] = None;
        let mut i = slot + 1;
        while i <= self.tree.len() {
            self.tree[i - 1] -= 1;
            i += i & i.wrapping_neg();
        }
        self.live -= 1;
        true
    }

    /// Live key of the given rank, 0 being the oldest.
    fn nth(&self, rank: usize) -> Option<&PrimaryKey> {
        if rank >= self.live {
            return None;
        }
        let n = self.tree.len();
        let mut pos = 0;
        let mut remaining = rank + 1;
        let mut step = 1usize << (usize::BITS - 1 - n.leading_zeros());
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next - 1] < remaining {
                pos = next;
                remaining -= self.tree[next - 1];
            }
            step >>= 1;
        }
        self.slots.get(pos).and_then(Option::as_ref)
    }

    fn append(&mut self, key: PrimaryKey) {
        let index = self.slots.len() + 1;
        let covered = self.prefix(index - 1) - self.prefix(index - (index & index.wrapping_neg()));
        self.tree.push(covered + 1);
        self.slots.push(Some(key.clone()));
        self.positions.insert(key, index - 1);
        self.live += 1;
    }

    /// Number of occupied slots among the first `i`.
    fn prefix(&self, mut i: usize) -> usize {
        let mut sum = 0;
        while i > 0 {
            sum += self.tree[i - 1];
            i &= i - 1;
        }
        sum
    }

    fn compact(&mut self) {
        let keys: Vec<PrimaryKey> = std::mem::take(&mut self.slots).into_iter().flatten().collect();
        self.tree.clear();
        self.positions.clear();
        self.live = 0;
        for key in keys {
            self.append(key);
        }
    }
}

#[derive(Debug, Default)]
struct TableRows {
    rows: HashMap<PrimaryKey, Row>,
    live: RecencyIndex,
}

/// Row state for every table of one simulated database.
#[derive(Debug, Default)]
pub struct RowStore {
    tables: HashMap<String, TableRows>,
    policy: SelectionPolicy,
}

impl RowStore {
    /// Create an empty store with the given selection policy.
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            tables: HashMap::new(),
            policy,
        }
    }

    /// Insert a new row. A tombstoned key may be inserted again.
    pub fn insert(
        &mut self,
        table: &str,
        key: PrimaryKey,
        values: RowImage,
        version: SchemaVersion,
        tick: u64,
    ) -> Result<&Row, RowStoreError> {
        let rows = self.tables.entry(table.to_string()).or_default();
        if rows.rows.get(&key).is_some_and(Row::is_live) {
            return Err(RowStoreError::DuplicateKey {
                table: table.to_string(),
                key,
            });
        }

        rows.live.push(key.clone());
        rows.rows.insert(
            key.clone(),
            Row {
                key: key.clone(),
                values,
                schema_version: version,
                modified_tick: tick,
                tombstone: None,
            },
        );
        Ok(&rows.rows[&key])
    }

    /// Pick a live row according to the selection policy.
    pub fn random_live_row<R: Rng>(&self, table: &str, rng: &mut R) -> Result<&Row, RowStoreError> {
        let not_found = || RowStoreError::NotFound(table.to_string());
        let rows = self.tables.get(table).ok_or_else(not_found)?;
        let len = rows.live.len();
        if len == 0 {
            return Err(not_found());
        }

        let key = match self.policy {
            SelectionPolicy::Uniform => rows.live.nth(rng.gen_range(0..len)),
            SelectionPolicy::RecencyBiased { bias } => {
                let u: f64 = rng.gen();
                let k = ((len as f64 * u.powf(bias)) as usize).min(len - 1);
                rows.live.nth(len - 1 - k)
            }
        };

        key.and_then(|k| rows.rows.get(k)).ok_or_else(not_found)
    }

    /// Replace the values of a live row.
    pub fn apply(
        &mut self,
        table: &str,
        key: &PrimaryKey,
        values: RowImage,
        version: SchemaVersion,
        tick: u64,
    ) -> Result<&Row, RowStoreError> {
        let rows = self.live_rows_mut(table, key)?;
        rows.live.push(key.clone());

        let row = rows
            .rows
            .get_mut(key)
            .ok_or_else(|| no_such_row(table, key))?;
        row.values = values;
        row.schema_version = version;
        row.modified_tick = tick;
        Ok(row)
    }

    /// Mark a live row as deleted.
    pub fn tombstone(&mut self, table: &str, key: &PrimaryKey, tick: u64) -> Result<&Row, RowStoreError> {
        let rows = self.live_rows_mut(table, key)?;
        rows.live.remove(key);

        let row = rows
            .rows
            .get_mut(key)
            .ok_or_else(|| no_such_row(table, key))?;
        row.tombstone = Some(Tombstone { tick });
        Ok(row)
    }

    /// Resolve a row, tombstoned or not.
    pub fn get(&self, table: &str, key: &PrimaryKey) -> Option<&Row> {
        self.tables.get(table).and_then(|rows| rows.rows.get(key))
    }

    /// Number of live rows in a table.
    pub fn live_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.live.len())
    }

    /// Physically remove rows tombstoned before `before_tick`.
    ///
    /// Returns the number of rows removed.
    pub fn purge_tombstones(&mut self, before_tick: u64) -> usize {
        let mut purged = 0;
        for rows in self.tables.values_mut() {
            let before = rows.rows.len();
            rows.rows
                .retain(|_, row| !matches!(row.tombstone, Some(t) if t.tick < before_tick));
            purged += before - rows.rows.len();
        }
        purged
    }

    fn live_rows_mut(&mut self, table: &str, key: &PrimaryKey) -> Result<&mut TableRows, RowStoreError> {
        match self.tables.get_mut(table) {
            Some(rows) if rows.rows.get(key).is_some_and(Row::is_live) => Ok(rows),
            _ => Err(no_such_row(table, key)),
        }
    }
}

fn no_such_row(table: &str, key: &PrimaryKey) -> RowStoreError {
    RowStoreError::NoSuchRow {
        table: table.to_string(),
        key: key.clone(),
    }
}
