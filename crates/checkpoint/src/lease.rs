//! Advisory single-writer lease.
//!
//! A lease is a `{instance}.lease` file created with `create_new` next to
//! the checkpoint. The holder refreshes it at least every half TTL and
//! checks it before every write; a lease not refreshed within the holder's
//! TTL is stale and may be taken over, so a crashed writer does not block
//! its instance forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filesystem::{replace_file, sync_parent};
use crate::CheckpointError;

/// Contents of a lease file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Unique id of the holder
    pub holder: String,
    /// Process id of the holder
    pub pid: u32,
    /// When the lease was first acquired
    pub acquired_at: DateTime<Utc>,
    /// Last refresh
    pub renewed_at: DateTime<Utc>,
    /// TTL the holder renews against, in milliseconds
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

/// A held lease. Released explicitly with [`CheckpointLease::release`].
#[derive(Debug)]
pub struct CheckpointLease {
    path: PathBuf,
    instance: String,
    ttl: Duration,
    record: LeaseRecord,
}

impl CheckpointLease {
    /// Acquire the lease for `instance` in `dir`.
    ///
    /// Fails with [`CheckpointError::LeaseHeld`] while another holder's
    /// lease is younger than `ttl`.
    pub fn acquire(dir: &Path, instance: &str, ttl: Duration) -> Result<Self, CheckpointError> {
        std::fs::create_dir_all(dir)?;
        let path = lease_path(dir, instance);
        let now = Utc::now();
        let record = LeaseRecord {
            holder: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: now,
            renewed_at: now,
            ttl_ms: Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        };

        match create_lease_file(&path, &record) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = read_record(&path)?;
                if !is_stale(&existing, ttl, now) {
                    return Err(CheckpointError::LeaseHeld {
                        instance: instance.to_string(),
                        holder: existing.holder,
                        renewed_at: existing.renewed_at,
                    });
                }

                tracing::warn!(
                    "Taking over stale lease for '{}' from {} (last renewed {})",
                    instance,
                    existing.holder,
                    existing.renewed_at
                );
                std::fs::remove_file(&path)?;
                // a concurrent taker wins the create_new race
                create_lease_file(&path, &record).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        CheckpointError::LeaseHeld {
                            instance: instance.to_string(),
                            holder: "unknown".to_string(),
                            renewed_at: now,
                        }
                    } else {
                        e.into()
                    }
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Acquired lease for '{}' ({})", instance, record.holder);
        Ok(Self {
            path,
            instance: instance.to_string(),
            ttl,
            record,
        })
    }

    /// The holder's record.
    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// TTL this holder renews against.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Refresh the lease.
    ///
    /// Fails with [`CheckpointError::LeaseHeld`] if the lease was taken
    /// over in the meantime.
    pub fn renew(&mut self) -> Result<(), CheckpointError> {
        self.verify()?;
        self.record.renewed_at = Utc::now();
        let tmp = self.path.with_extension("lease.tmp");
        replace_file(&self.path, &tmp, &encode_record(&self.record)?)?;
        tracing::trace!("Renewed lease for '{}'", self.instance);
        Ok(())
    }

    /// Give up the lease.
    pub fn release(self) -> Result<(), CheckpointError> {
        self.verify()?;
        std::fs::remove_file(&self.path)?;
        tracing::info!("Released lease for '{}'", self.instance);
        Ok(())
    }

    /// Check that the lease file still names this holder.
    ///
    /// Fails with [`CheckpointError::LeaseHeld`] once another writer has
    /// taken the lease over.
    pub fn verify(&self) -> Result<(), CheckpointError> {
        let current = read_record(&self.path)?;
        if current.holder != self.record.holder {
            return Err(CheckpointError::LeaseHeld {
                instance: self.instance.clone(),
                holder: current.holder,
                renewed_at: current.renewed_at,
            });
        }
        Ok(())
    }
}

/// Path of the lease file for an instance.
pub fn lease_path(dir: &Path, instance: &str) -> PathBuf {
    dir.join(format!("{instance}.lease"))
}

/// A lease is stale once the holder's own TTL has passed since its last
/// renewal. Records without a TTL fall back to the acquirer's.
fn is_stale(record: &LeaseRecord, ttl: Duration, now: DateTime<Utc>) -> bool {
    let ttl = record.ttl_ms.map(Duration::from_millis).unwrap_or(ttl);
    match chrono::TimeDelta::from_std(ttl) {
        Ok(ttl) => record.renewed_at + ttl < now,
        Err(_) => false,
    }
}

fn create_lease_file(path: &Path, record: &LeaseRecord) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let data = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
    file.write_all(&data)?;
    file.sync_all()?;
    sync_parent(path)
}

fn encode_record(record: &LeaseRecord) -> Result<Vec<u8>, CheckpointError> {
    Ok(serde_json::to_vec_pretty(record).map_err(anyhow::Error::from)?)
}

fn read_record(path: &Path) -> Result<LeaseRecord, CheckpointError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CheckpointError::corrupt(path.display(), e))
}
