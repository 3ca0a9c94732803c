//! Checkpoint of a simulation instance.

use cdc_core::{Lsn, SchemaVersion, Xid};
use checkpoint::Checkpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of the last durably written transaction.
///
/// Stored after every batch, once all of the batch's objects are written.
/// Resuming from it continues at `last_committed_lsn + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationCheckpoint {
    /// Commit LSN of the last written transaction
    pub last_committed_lsn: Lsn,
    /// Id of the last written transaction
    pub last_committed_xid: Xid,
    /// Tick that produced the last written transaction
    pub last_committed_tick: u64,
    /// Last object key written per table
    #[serde(default)]
    pub partition_cursor: BTreeMap<String, String>,
    /// Schema version current at the last written transaction
    pub schema_version: SchemaVersion,
    /// When this checkpoint was taken
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint for SimulationCheckpoint {
    const CHECKPOINT_TYPE: &'static str = "cdc-simulation";

    fn to_cli_string(&self) -> String {
        format!(
            "lsn={},xid={},tick={},schema={}",
            self.last_committed_lsn.0,
            self.last_committed_xid.0,
            self.last_committed_tick,
            self.schema_version.0
        )
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let mut fields = BTreeMap::new();
        for part in s.split(',') {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid checkpoint field '{part}'"))?;
            fields.insert(name.trim(), value.trim());
        }
        let field = |name: &str| -> anyhow::Result<u64> {
            let value = fields
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("Checkpoint is missing '{name}'"))?;
            Ok(value.parse()?)
        };

        Ok(Self {
            last_committed_lsn: Lsn(field("lsn")?),
            last_committed_xid: Xid(field("xid")?),
            last_committed_tick: field("tick")?,
            partition_cursor: BTreeMap::new(),
            schema_version: SchemaVersion(u32::try_from(field("schema")?)?),
            updated_at: Utc::now(),
        })
    }
}
