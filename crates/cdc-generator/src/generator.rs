//! Change generator producing one transaction per tick.

use crate::clock::SimulationClock;
use crate::generators::{generate_value_typed, GenerationContext};
use crate::row_store::{Row, RowStore, RowStoreError};
use crate::workload::{
    GeneratorConfig, ReplicaIdentity, ScheduledEvolution, TombstoneRetention, TransactionSize,
    WorkloadConfig, WorkloadError,
};
use cdc_core::{
    ColumnDefinition, ColumnType, LogicalChange, Operation, PrimaryKey, RowImage, SchemaError,
    SchemaRegistry, SchemaSnapshot, SchemaVersion, TableDefinition, TransactionBuffer,
};
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Workload is invalid
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Row store error that cannot be recovered by falling back to an insert
    #[error("Row store error: {0}")]
    RowStore(#[from] RowStoreError),

    /// Ticks must be strictly increasing
    #[error("Tick {tick} is not after the last generated tick {last}")]
    TickOutOfOrder { tick: u64, last: u64 },

    /// A generator produced a value the column cannot hold
    #[error("Generator for column '{table}.{column}' produced a value that does not fit {column_type}")]
    TypeMismatch {
        table: String,
        column: String,
        column_type: ColumnType,
    },

    /// The generated primary key is not usable as a row identity
    #[error("Generated primary key for table '{0}' is null or of an unsupported type")]
    InvalidKey(String),

    /// No table can be sampled
    #[error("No table with a positive weight exists")]
    NoTables,
}

const OPERATIONS: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Delete];

/// Seed of the RNG used for a tick.
///
/// Every tick gets its own RNG so any tick can be regenerated without
/// replaying the random draws of earlier ticks.
pub fn tick_seed(seed: u64, tick: u64) -> u64 {
    seed.wrapping_add(tick.wrapping_mul(0x9E3779B97F4A7C15))
}

#[derive(Debug, Clone)]
enum SizeSampler {
    Fixed(usize),
    Uniform(usize, usize),
    Weighted(Vec<usize>, WeightedIndex<u32>),
}

impl SizeSampler {
    fn new(config: &TransactionSize) -> Result<Self, WorkloadError> {
        Ok(match config {
            TransactionSize::Fixed { size } => Self::Fixed(*size),
            TransactionSize::Uniform { min, max } => Self::Uniform(*min, *max),
            TransactionSize::Weighted { sizes } => {
                let dist = WeightedIndex::new(sizes.iter().map(|s| s.weight))
                    .map_err(|e| WorkloadError::Invalid(format!("transaction sizes: {e}")))?;
                Self::Weighted(sizes.iter().map(|s| s.size).collect(), dist)
            }
        })
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let size = match self {
            Self::Fixed(size) => *size,
            Self::Uniform(min, max) => rng.gen_range(*min..=*max),
            Self::Weighted(sizes, dist) => sizes[dist.sample(rng)],
        };
        size.max(1)
    }
}

/// Per-table generation state.
#[derive(Debug, Clone)]
struct TableState {
    weight: u32,
    identity: ReplicaIdentity,
    // Keyed by column id so generators follow renamed columns.
    generators: HashMap<u16, GeneratorConfig>,
    inserted: u64,
}

impl TableState {
    fn new(weight: u32, identity: ReplicaIdentity) -> Self {
        Self {
            weight,
            identity,
            generators: HashMap::new(),
            inserted: 0,
        }
    }

    fn bind(&mut self, table: &TableDefinition, name: &str, config: GeneratorConfig) {
        if let Some(column) = table.get_column(name) {
            self.generators.insert(column.id, config);
        }
    }

    fn value_for<R: Rng>(
        &self,
        table: &TableDefinition,
        column: &ColumnDefinition,
        rng: &mut R,
        context: GenerationContext,
    ) -> Result<cdc_core::Value, GeneratorError> {
        match self.generators.get(&column.id) {
            Some(config) => generate_value_typed(config, rng, context, &column.column_type)
                .ok_or_else(|| GeneratorError::TypeMismatch {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    column_type: column.column_type.clone(),
                }),
            None => Ok(column.backfill_value()),
        }
    }
}

/// Produces logical changes for each tick.
///
/// The generator owns the schema registry and the row state store of one
/// simulated database. Output depends only on the workload and the tick
/// sequence, so running ticks `1..=n` twice yields identical transactions.
#[derive(Debug)]
pub struct ChangeGenerator {
    seed: u64,
    op_dist: WeightedIndex<f64>,
    sizes: SizeSampler,
    schedule: Vec<ScheduledEvolution>,
    retention: TombstoneRetention,
    registry: SchemaRegistry,
    store: RowStore,
    clock: SimulationClock,
    tables: HashMap<String, TableState>,
    last_tick: u64,
}

impl ChangeGenerator {
    /// Create a generator and publish the initial schema.
    pub fn new(workload: WorkloadConfig, clock: SimulationClock) -> Result<Self, GeneratorError> {
        workload.validate()?;

        let registry = SchemaRegistry::new(&workload.table_specs())?;
        let ratios = &workload.op_ratios;
        let op_dist = WeightedIndex::new([ratios.insert, ratios.update, ratios.delete])
            .map_err(|e| WorkloadError::Invalid(format!("op ratios: {e}")))?;
        let sizes = SizeSampler::new(&workload.transaction_size)?;

        let mut tables = HashMap::new();
        let schema = Arc::clone(registry.current_schema());
        for table in &workload.tables {
            let definition = schema.table(&table.name)?;
            let mut state = TableState::new(table.weight, table.replica_identity);
            for column in std::iter::once(&table.primary_key).chain(&table.columns) {
                if let Some(config) = &column.generator {
                    state.bind(definition, &column.name, config.clone());
                }
            }
            tables.insert(table.name.clone(), state);
        }

        let mut schedule = workload.evolution_schedule;
        schedule.sort_by_key(|e| e.at_tick);

        Ok(Self {
            seed: workload.seed,
            op_dist,
            sizes,
            schedule,
            retention: workload.tombstone_retention,
            registry,
            store: RowStore::new(workload.row_selection),
            clock,
            tables,
            last_tick: 0,
        })
    }

    /// The schema registry of this database.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The row state store of this database.
    pub fn row_store(&self) -> &RowStore {
        &self.store
    }

    /// The clock used for commit timestamps.
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The last tick generated, 0 before the first.
    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Generate the transaction for `tick`.
    ///
    /// Evolutions scheduled up to and including `tick` are applied first and
    /// the resulting schema version is pinned for the whole transaction.
    /// Updates and deletes that find no live target become inserts, so the
    /// transaction always holds exactly the sampled number of changes.
    pub fn next_batch(&mut self, tick: u64) -> Result<TransactionBuffer, GeneratorError> {
        if tick <= self.last_tick {
            return Err(GeneratorError::TickOutOfOrder {
                tick,
                last: self.last_tick,
            });
        }

        self.apply_scheduled_evolutions(tick);

        if let TombstoneRetention::Ticks { ticks } = self.retention {
            if tick > ticks {
                let purged = self.store.purge_tombstones(tick - ticks);
                if purged > 0 {
                    tracing::debug!("Purged {} tombstoned rows at tick {}", purged, tick);
                }
            }
        }

        let schema = Arc::clone(self.registry.current_schema());
        let commit_ts = self.clock.commit_ts(tick);
        let mut rng = StdRng::seed_from_u64(tick_seed(self.seed, tick));

        let candidates: Vec<(&TableDefinition, u32)> = schema
            .tables
            .iter()
            .filter_map(|t| {
                let weight = self.tables.get(&t.name).map_or(0, |s| s.weight);
                (weight > 0).then_some((t, weight))
            })
            .collect();
        if candidates.is_empty() {
            return Err(GeneratorError::NoTables);
        }
        let table_dist = WeightedIndex::new(candidates.iter().map(|(_, w)| *w))
            .map_err(|_| GeneratorError::NoTables)?;

        let size = self.sizes.sample(&mut rng);
        let mut changes = Vec::with_capacity(size);
        for _ in 0..size {
            let op = OPERATIONS[self.op_dist.sample(&mut rng)];
            let (table, _) = candidates[table_dist.sample(&mut rng)];

            let change = match op {
                Operation::Insert => None,
                Operation::Update => self.update(table, &schema, &mut rng, tick, commit_ts)?,
                Operation::Delete => self.delete(table, &schema, &mut rng, tick)?,
            };
            let change = match change {
                Some(change) => change,
                None => {
                    if op != Operation::Insert {
                        tracing::debug!(
                            "No {} target in '{}' at tick {}, falling back to insert",
                            op,
                            table.name,
                            tick
                        );
                    }
                    self.insert(table, schema.version, &mut rng, tick, commit_ts)?
                }
            };
            changes.push(change);
        }

        self.last_tick = tick;
        tracing::debug!(
            "Generated tick {} with {} changes at schema {}",
            tick,
            changes.len(),
            schema.version
        );

        Ok(TransactionBuffer {
            tick,
            schema_version: schema.version,
            commit_ts,
            changes,
        })
    }

    fn apply_scheduled_evolutions(&mut self, tick: u64) {
        let due: Vec<ScheduledEvolution> = self
            .schedule
            .iter()
            .filter(|e| e.at_tick > self.last_tick && e.at_tick <= tick)
            .cloned()
            .collect();

        for evolution in due {
            match self.registry.evolve(evolution.operation.clone()) {
                Ok(_) => self.register_generators(&evolution),
                Err(e) => tracing::warn!(
                    "Rejected {} scheduled at tick {}: {}",
                    evolution.operation.kind(),
                    evolution.at_tick,
                    e
                ),
            }
        }
    }

    fn register_generators(&mut self, evolution: &ScheduledEvolution) {
        let schema = Arc::clone(self.registry.current_schema());
        let Some(table) = schema.get_table(evolution.operation.table_name()) else {
            return;
        };

        let state = self
            .tables
            .entry(table.name.clone())
            .or_insert_with(|| TableState::new(evolution.weight, evolution.replica_identity));
        for (name, config) in &evolution.generators {
            state.bind(table, name, config.clone());
        }
    }

    fn insert<R: Rng>(
        &mut self,
        table: &TableDefinition,
        version: SchemaVersion,
        rng: &mut R,
        tick: u64,
        commit_ts: DateTime<Utc>,
    ) -> Result<LogicalChange, GeneratorError> {
        let state = self
            .tables
            .entry(table.name.clone())
            .or_insert_with(|| TableState::new(1, ReplicaIdentity::Default));
        let context = GenerationContext {
            index: state.inserted,
            sim_time: commit_ts,
        };

        let mut values = RowImage::new();
        for column in &table.columns {
            let value = state.value_for(table, column, rng, context)?;
            values.insert(column.name.clone(), value);
        }
        state.inserted += 1;

        let key = values
            .get(&table.primary_key().name)
            .and_then(PrimaryKey::from_value)
            .ok_or_else(|| GeneratorError::InvalidKey(table.name.clone()))?;

        self.store
            .insert(&table.name, key.clone(), values.clone(), version, tick)?;

        Ok(LogicalChange {
            table: table.name.clone(),
            op: Operation::Insert,
            key,
            before: None,
            after: Some(values),
        })
    }

    fn update<R: Rng>(
        &mut self,
        table: &TableDefinition,
        schema: &SchemaSnapshot,
        rng: &mut R,
        tick: u64,
        commit_ts: DateTime<Utc>,
    ) -> Result<Option<LogicalChange>, GeneratorError> {
        let value_columns: Vec<&ColumnDefinition> = table.value_columns().collect();
        if value_columns.is_empty() {
            return Ok(None);
        }

        let Some((key, old)) = self.pick_target(table, schema, rng)? else {
            return Ok(None);
        };

        let Some(state) = self.tables.get(&table.name) else {
            return Ok(None);
        };
        let context = GenerationContext {
            index: tick,
            sim_time: commit_ts,
        };

        let count = rng.gen_range(1..=value_columns.len());
        let mut chosen = rand::seq::index::sample(rng, value_columns.len(), count).into_vec();
        chosen.sort_unstable();

        let mut new_values = old.clone();
        for idx in chosen {
            let column = value_columns[idx];
            let value = state.value_for(table, column, rng, context)?;
            new_values.insert(column.name.clone(), value);
        }
        let before = before_image(table, state.identity, old);

        match self
            .store
            .apply(&table.name, &key, new_values.clone(), schema.version, tick)
        {
            Ok(_) => {}
            Err(RowStoreError::NoSuchRow { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        Ok(Some(LogicalChange {
            table: table.name.clone(),
            op: Operation::Update,
            key,
            before: Some(before),
            after: Some(new_values),
        }))
    }

    fn delete<R: Rng>(
        &mut self,
        table: &TableDefinition,
        schema: &SchemaSnapshot,
        rng: &mut R,
        tick: u64,
    ) -> Result<Option<LogicalChange>, GeneratorError> {
        let Some((key, old)) = self.pick_target(table, schema, rng)? else {
            return Ok(None);
        };
        let identity = self
            .tables
            .get(&table.name)
            .map_or(ReplicaIdentity::Default, |s| s.identity);
        let before = before_image(table, identity, old);

        match self.store.tombstone(&table.name, &key, tick) {
            Ok(_) => {}
            Err(RowStoreError::NoSuchRow { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        Ok(Some(LogicalChange {
            table: table.name.clone(),
            op: Operation::Delete,
            key,
            before: Some(before),
            after: None,
        }))
    }

    /// Pick a live row and return its key and values in the pinned schema.
    fn pick_target<R: Rng>(
        &self,
        table: &TableDefinition,
        schema: &SchemaSnapshot,
        rng: &mut R,
    ) -> Result<Option<(PrimaryKey, RowImage)>, GeneratorError> {
        let row = match self.store.random_live_row(&table.name, rng) {
            Ok(row) => row,
            Err(RowStoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let values = self.current_image(table, schema, row)?;
        Ok(Some((row.key.clone(), values)))
    }

    fn current_image(
        &self,
        table: &TableDefinition,
        schema: &SchemaSnapshot,
        row: &Row,
    ) -> Result<RowImage, GeneratorError> {
        if row.schema_version == schema.version {
            return Ok(row.values.clone());
        }
        let written_as = self.registry.schema_at(row.schema_version)?.table(&table.name)?;
        Ok(SchemaSnapshot::project(&row.values, written_as, table))
    }
}

/// Old row image as captured under the table's replica identity.
fn before_image(table: &TableDefinition, identity: ReplicaIdentity, old: RowImage) -> RowImage {
    match identity {
        ReplicaIdentity::Full => old,
        ReplicaIdentity::Default => {
            let pk = &table.primary_key().name;
            old.into_iter().filter(|(name, _)| name == pk).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::OpRatios;
    use cdc_core::{ColumnSpec, EvolutionOp, Value};
    use std::collections::{BTreeMap, HashSet};
    use std::time::Duration;

    fn clock() -> SimulationClock {
        SimulationClock::new(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            Duration::from_secs(1),
        )
    }

    fn orders_workload(ratios: OpRatios, identity: &str) -> WorkloadConfig {
        let yaml = format!(
            r#"
seed: 42
tables:
  - name: orders
    replica_identity: {identity}
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
          values: [pending, paid, shipped, cancelled]
      - name: amount
        type: int
        generator:
          type: int_range
          min: 1
          max: 1000
"#
        );
        let mut workload = WorkloadConfig::from_yaml(&yaml).unwrap();
        workload.op_ratios = ratios;
        workload
    }

    fn ratios(insert: f64, update: f64, delete: f64) -> OpRatios {
        OpRatios {
            insert,
            update,
            delete,
        }
    }

    #[test]
    fn test_insert_only_ticks() {
        let mut generator =
            ChangeGenerator::new(orders_workload(ratios(1.0, 0.0, 0.0), "default"), clock())
                .unwrap();

        for tick in 1..=10 {
            let buffer = generator.next_batch(tick).unwrap();
            assert_eq!(buffer.tick, tick);
            assert_eq!(buffer.schema_version, SchemaVersion(0));
            assert_eq!(buffer.changes.len(), 1);

            let change = &buffer.changes[0];
            assert_eq!(change.op, Operation::Insert);
            assert_eq!(change.key, PrimaryKey::Int(tick as i64));
            let after = change.after.as_ref().unwrap();
            assert_eq!(after.get("id"), Some(&Value::Int64(tick as i64)));
            assert!(matches!(after.get("amount"), Some(Value::Int32(_))));
        }
        assert_eq!(generator.row_store().live_count("orders"), 10);
    }

    #[test]
    fn test_update_without_rows_falls_back_to_insert() {
        let mut workload = orders_workload(ratios(0.0, 1.0, 0.0), "default");
        workload.transaction_size = TransactionSize::Fixed { size: 3 };
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        let buffer = generator.next_batch(1).unwrap();
        // first slot finds no rows; later slots update the inserted row
        assert_eq!(buffer.changes.len(), 3);
        assert_eq!(buffer.changes[0].op, Operation::Insert);
        assert!(buffer.changes[1..].iter().all(|c| c.op == Operation::Update));
    }

    #[test]
    fn test_delete_without_rows_falls_back_to_insert() {
        let mut generator =
            ChangeGenerator::new(orders_workload(ratios(0.0, 0.0, 1.0), "default"), clock())
                .unwrap();

        let first = generator.next_batch(1).unwrap();
        assert_eq!(first.changes[0].op, Operation::Insert);

        let second = generator.next_batch(2).unwrap();
        assert_eq!(second.changes[0].op, Operation::Delete);
        assert_eq!(second.changes[0].key, first.changes[0].key);

        let third = generator.next_batch(3).unwrap();
        assert_eq!(third.changes[0].op, Operation::Insert);
    }

    #[test]
    fn test_updates_and_deletes_target_live_rows() {
        let mut workload = orders_workload(ratios(0.4, 0.4, 0.2), "default");
        workload.transaction_size = TransactionSize::Uniform { min: 1, max: 5 };
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        let mut live: HashSet<PrimaryKey> = HashSet::new();
        for tick in 1..=200 {
            for change in generator.next_batch(tick).unwrap().changes {
                match change.op {
                    Operation::Insert => assert!(live.insert(change.key.clone())),
                    Operation::Update => assert!(live.contains(&change.key)),
                    Operation::Delete => assert!(live.remove(&change.key)),
                }
            }
        }
        assert_eq!(live.len(), generator.row_store().live_count("orders"));
    }

    #[test]
    fn test_update_images() {
        let mut workload = orders_workload(ratios(0.0, 1.0, 0.0), "default");
        workload.transaction_size = TransactionSize::Fixed { size: 2 };
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        let buffer = generator.next_batch(1).unwrap();
        let insert = &buffer.changes[0];
        let update = &buffer.changes[1];
        assert_eq!(update.op, Operation::Update);

        // default identity: key-only before image
        let before = update.before.as_ref().unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before.get("id"), Some(&Value::Int64(1)));

        // full after image
        let after = update.after.as_ref().unwrap();
        assert_eq!(
            after.keys().collect::<Vec<_>>(),
            vec!["amount", "id", "status"]
        );
        assert_eq!(after.get("id"), insert.after.as_ref().unwrap().get("id"));
    }

    #[test]
    fn test_full_identity_before_image() {
        let mut workload = orders_workload(ratios(0.0, 0.0, 1.0), "full");
        workload.transaction_size = TransactionSize::Fixed { size: 2 };
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        let buffer = generator.next_batch(1).unwrap();
        let delete = &buffer.changes[1];
        assert_eq!(delete.op, Operation::Delete);
        assert_eq!(delete.before, buffer.changes[0].after);
        assert_eq!(delete.after, None);
    }

    #[test]
    fn test_deterministic_per_tick() {
        let workload = orders_workload(ratios(0.5, 0.3, 0.2), "full");
        let mut gen1 = ChangeGenerator::new(workload.clone(), clock()).unwrap();
        let mut gen2 = ChangeGenerator::new(workload, clock()).unwrap();

        for tick in 1..=50 {
            assert_eq!(gen1.next_batch(tick).unwrap(), gen2.next_batch(tick).unwrap());
        }
    }

    #[test]
    fn test_tick_out_of_order() {
        let mut generator =
            ChangeGenerator::new(orders_workload(OpRatios::default(), "default"), clock())
                .unwrap();
        generator.next_batch(3).unwrap();

        let result = generator.next_batch(3);
        assert!(matches!(
            result,
            Err(GeneratorError::TickOutOfOrder { tick: 3, last: 3 })
        ));
    }

    #[test]
    fn test_scheduled_evolution_pins_new_version() {
        let mut workload = orders_workload(OpRatios::default(), "default");
        workload.evolution_schedule.push(ScheduledEvolution {
            at_tick: 11,
            operation: EvolutionOp::AddColumn {
                table: "orders".to_string(),
                column: ColumnSpec::nullable("shipped_at", ColumnType::Timestamp),
            },
            generators: BTreeMap::from([("shipped_at".to_string(), GeneratorConfig::SimTime)]),
            weight: 1,
            replica_identity: ReplicaIdentity::Default,
        });
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        for tick in 1..=10 {
            let buffer = generator.next_batch(tick).unwrap();
            assert_eq!(buffer.schema_version, SchemaVersion(0));
            assert!(!buffer.changes[0].after.as_ref().unwrap().contains_key("shipped_at"));
        }

        let buffer = generator.next_batch(11).unwrap();
        assert_eq!(buffer.schema_version, SchemaVersion(1));
        assert_eq!(
            buffer.changes[0].after.as_ref().unwrap().get("shipped_at"),
            Some(&Value::Timestamp(buffer.commit_ts))
        );
    }

    #[test]
    fn test_rejected_evolution_is_skipped() {
        let mut workload = orders_workload(OpRatios::default(), "default");
        workload.evolution_schedule.push(ScheduledEvolution {
            at_tick: 2,
            operation: EvolutionOp::DropColumn {
                table: "orders".to_string(),
                column: "id".to_string(),
            },
            generators: BTreeMap::new(),
            weight: 1,
            replica_identity: ReplicaIdentity::Default,
        });
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        generator.next_batch(1).unwrap();
        let buffer = generator.next_batch(2).unwrap();
        assert_eq!(buffer.schema_version, SchemaVersion(0));
        assert_eq!(buffer.changes.len(), 1);
    }

    #[test]
    fn test_update_projects_old_rows_to_new_schema() {
        let mut workload = orders_workload(ratios(1.0, 0.0, 0.0), "full");
        workload.evolution_schedule.push(ScheduledEvolution {
            at_tick: 2,
            operation: EvolutionOp::RenameColumn {
                table: "orders".to_string(),
                from: "status".to_string(),
                to: "state".to_string(),
            },
            generators: BTreeMap::new(),
            weight: 1,
            replica_identity: ReplicaIdentity::Default,
        });
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();
        let inserted = generator.next_batch(1).unwrap().changes[0].clone();

        // force a delete of the only row at the new version
        generator.op_dist = WeightedIndex::new([0.0, 0.0, 1.0]).unwrap();
        let buffer = generator.next_batch(2).unwrap();
        let delete = &buffer.changes[0];

        assert_eq!(delete.op, Operation::Delete);
        let before = delete.before.as_ref().unwrap();
        assert_eq!(
            before.get("state"),
            inserted.after.as_ref().unwrap().get("status")
        );
        assert!(!before.contains_key("status"));
    }

    #[test]
    fn test_tombstone_retention_purges() {
        let mut workload = orders_workload(ratios(0.0, 0.0, 1.0), "default");
        workload.tombstone_retention = TombstoneRetention::Ticks { ticks: 3 };
        let mut generator = ChangeGenerator::new(workload, clock()).unwrap();

        generator.next_batch(1).unwrap();
        let deleted = generator.next_batch(2).unwrap().changes[0].key.clone();
        assert!(generator.row_store().get("orders", &deleted).is_some());

        for tick in 3..=6 {
            generator.next_batch(tick).unwrap();
        }
        assert!(generator.row_store().get("orders", &deleted).is_none());
    }

    #[test]
    fn test_tick_seed_spreads_ticks() {
        assert_ne!(tick_seed(42, 1), tick_seed(42, 2));
        assert_eq!(tick_seed(42, 0), 42);
    }
}
