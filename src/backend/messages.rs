//! Commands understood by the backend actor

use tokio::sync::oneshot;

use super::error::BackendResult;

#[derive(Debug)]
pub enum BackendCommand {
    /// Send the buffer and the retry queue now, regardless of the active flag
    Flush {
        respond_to: oneshot::Sender<BackendResult<()>>,
    },

    /// Drain one last time and stop all timers
    Shutdown {
        respond_to: oneshot::Sender<BackendResult<()>>,
    },
}

/// Snapshot of a backend's write path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub active: bool,

    /// Bytes waiting in the write buffer
    pub buffered_bytes: usize,

    /// Failed batches waiting to be re-sent
    pub retry_batches: usize,

    pub retry_bytes: usize,

    /// Successful write requests
    pub flush_count: u64,

    /// Write requests that failed and were queued
    pub failed_flushes: u64,
}
