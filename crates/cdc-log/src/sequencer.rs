//! Assigns transaction ids and log sequence numbers.

use cdc_core::{
    BeginMarker, ChangeEvent, CommitMarker, Lsn, SequencedTransaction, TransactionBuffer, Xid,
};

/// Error type for sequencing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SequenceError {
    /// A transaction must contain at least one change
    #[error("Transaction for tick {tick} has no changes")]
    EmptyTransaction { tick: u64 },
}

/// Places transactions in a single totally ordered log.
///
/// Every member change gets the next LSN; markers do not consume LSNs. A
/// transaction's `final_lsn` and `commit_lsn` are the LSN of its last
/// member and its `end_lsn` is the position right after it, so LSNs across
/// transactions are gap-free.
#[derive(Debug, Clone, Default)]
pub struct LogSequencer {
    last_lsn: Lsn,
    last_xid: Xid,
}

impl LogSequencer {
    /// Create a sequencer positioned before LSN 1 and xid 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// LSN the next change will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.last_lsn.next()
    }

    /// LSN of the last change sequenced, [`Lsn::ZERO`] before the first.
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    /// Transaction id the next transaction will receive.
    pub fn next_xid(&self) -> Xid {
        self.last_xid.next()
    }

    /// Frame a transaction and assign its positions.
    pub fn sequence(
        &mut self,
        buffer: TransactionBuffer,
    ) -> Result<SequencedTransaction, SequenceError> {
        if buffer.changes.is_empty() {
            return Err(SequenceError::EmptyTransaction { tick: buffer.tick });
        }

        let xid = self.next_xid();
        let mut lsn = self.last_lsn;
        let events: Vec<ChangeEvent> = buffer
            .changes
            .into_iter()
            .map(|change| {
                lsn = lsn.next();
                ChangeEvent {
                    lsn,
                    xid,
                    table: change.table,
                    op: change.op,
                    before: change.before,
                    after: change.after,
                    schema_version: buffer.schema_version,
                    commit_ts: buffer.commit_ts,
                }
            })
            .collect();

        self.last_xid = xid;
        self.last_lsn = lsn;

        Ok(SequencedTransaction {
            tick: buffer.tick,
            begin: BeginMarker {
                xid,
                final_lsn: lsn,
                commit_ts: buffer.commit_ts,
                schema_version: buffer.schema_version,
            },
            events,
            commit: CommitMarker {
                xid,
                commit_lsn: lsn,
                end_lsn: lsn.next(),
                commit_ts: buffer.commit_ts,
            },
        })
    }
}
