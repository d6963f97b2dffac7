use std::collections::HashMap;

use tracing::{debug, info};

use crate::types::{ConnectionLine, Pid, Session, TransferLine};

/// Connection lines waiting for their transfer summary, keyed by pid.
/// Holds at most one entry per pid.
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: HashMap<Pid, ConnectionLine>,
}

impl EventBuffer {
    /// Stores the connection, returning whatever was pending for the same pid.
    pub fn insert_or_replace(&mut self, connection: ConnectionLine) -> Option<ConnectionLine> {
        self.pending.insert(connection.pid.clone(), connection)
    }

    pub fn take(&mut self, pid: &str) -> Option<ConnectionLine> {
        self.pending.remove(pid)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// What happened to a transfer line handed to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed(Session),
    Orphaned,
}

/// Pairs connection lines with the transfer summary of the same pid.
///
/// There is no expiry: a connection whose session never logs a summary stays
/// buffered until the correlator is dropped. Callers can inspect `pending()`
/// at the end of a run.
#[derive(Debug, Default)]
pub struct Correlator {
    buffer: EventBuffer,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers the connection. Returns true if it displaced a stale entry.
    pub fn observe_connection(&mut self, connection: ConnectionLine) -> bool {
        match self.buffer.insert_or_replace(connection) {
            Some(stale) => {
                debug!(
                    pid = %stale.pid,
                    timestamp = %stale.timestamp,
                    "replacing unmatched connection for pid"
                );
                true
            }
            None => false,
        }
    }

    pub fn observe_transfer(&mut self, transfer: TransferLine) -> TransferOutcome {
        match self.buffer.take(&transfer.pid) {
            Some(connection) => TransferOutcome::Completed(Session {
                connection,
                transfer,
            }),
            None => {
                info!(
                    pid = %transfer.pid,
                    timestamp = %transfer.timestamp,
                    "No connection found for transfer. Event will not be accounted"
                );
                TransferOutcome::Orphaned
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
