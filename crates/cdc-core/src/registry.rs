//! Schema registry: the append-only history of published schema versions.

use crate::evolution::EvolutionOp;
use crate::schema::{SchemaError, SchemaSnapshot, SchemaVersion, TableSpec};
use std::sync::Arc;

/// Read access to published schema versions.
///
/// Implemented by the live [`SchemaRegistry`] and by [`SchemaHistory`], the
/// consumer-side copy loaded from the published version feed.
pub trait SchemaLookup {
    /// Snapshot for `version`, if it was ever published.
    fn snapshot(&self, version: SchemaVersion) -> Option<&SchemaSnapshot>;
}

/// Holds every published schema version.
///
/// Versions are immutable once published; [`SchemaRegistry::evolve`] either
/// publishes a new version or leaves the registry untouched.
#[derive(Debug)]
pub struct SchemaRegistry {
    history: Vec<Arc<SchemaSnapshot>>,
}

impl SchemaRegistry {
    /// Create a registry and publish version 0 from the initial tables.
    pub fn new(tables: &[TableSpec]) -> Result<Self, SchemaError> {
        let initial = SchemaSnapshot::initial(tables)?;
        Ok(Self {
            history: vec![Arc::new(initial)],
        })
    }

    /// Apply an evolution and publish the resulting version.
    pub fn evolve(&mut self, op: EvolutionOp) -> Result<SchemaVersion, SchemaError> {
        let next = op.apply(self.current_schema())?;
        let version = next.version;

        tracing::info!(
            "Published schema {} ({} on table '{}')",
            version,
            op.kind(),
            op.table_name()
        );

        self.history.push(Arc::new(next));
        Ok(version)
    }

    /// The latest published snapshot.
    pub fn current_schema(&self) -> &Arc<SchemaSnapshot> {
        // history always holds at least version 0
        &self.history[self.history.len() - 1]
    }

    /// The latest published version number.
    pub fn current_version(&self) -> SchemaVersion {
        self.current_schema().version
    }

    /// Snapshot for a specific version.
    pub fn schema_at(&self, version: SchemaVersion) -> Result<&Arc<SchemaSnapshot>, SchemaError> {
        self.history
            .get(version.0 as usize)
            .ok_or(SchemaError::UnknownSchemaVersion(version))
    }

    /// All published versions, oldest first.
    pub fn history(&self) -> &[Arc<SchemaSnapshot>] {
        &self.history
    }
}

impl SchemaLookup for SchemaRegistry {
    fn snapshot(&self, version: SchemaVersion) -> Option<&SchemaSnapshot> {
        self.history.get(version.0 as usize).map(|s| s.as_ref())
    }
}

/// Consumer-side schema history, rebuilt from published snapshots.
#[derive(Debug, Clone, Default)]
pub struct SchemaHistory {
    snapshots: Vec<SchemaSnapshot>,
}

impl SchemaHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot. Later inserts for the same version replace earlier ones.
    pub fn insert(&mut self, snapshot: SchemaSnapshot) {
        match self
            .snapshots
            .binary_search_by_key(&snapshot.version, |s| s.version)
        {
            Ok(idx) => self.snapshots[idx] = snapshot,
            Err(idx) => self.snapshots.insert(idx, snapshot),
        }
    }

    /// Number of known versions.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no versions are known.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SchemaLookup for SchemaHistory {
    fn snapshot(&self, version: SchemaVersion) -> Option<&SchemaSnapshot> {
        self.snapshots
            .binary_search_by_key(&version, |s| s.version)
            .ok()
            .map(|idx| &self.snapshots[idx])
    }
}

impl From<&SchemaRegistry> for SchemaHistory {
    fn from(registry: &SchemaRegistry) -> Self {
        Self {
            snapshots: registry.history().iter().map(|s| (**s).clone()).collect(),
        }
    }
}
