//! Core traits and callback types for the ackbuffer library.

use crate::error::BoxError;
use crate::message::{Checkpoint, Record, StreamId};
use crate::summary::SyncSummary;

/// A trait for sinks that durably persist batches of records.
///
/// The consumer calls `write` while holding its flush lock, one stream at a
/// time. Returning `Ok` means the batch is durable: the consumer then drops
/// its copy and may acknowledge checkpoints that depend on it. On `Err` the
/// batch stays buffered and no dependent checkpoint is acknowledged.
///
/// The consumer never passes an empty batch, but implementations should treat
/// one as a no-op.
///
/// Closures of the form `FnMut(&StreamId, &[Record]) -> Result<(), BoxError>`
/// implement this trait.
pub trait RecordWriter: Send {
    fn write(&mut self, stream: &StreamId, batch: &[Record]) -> Result<(), BoxError>;
}

impl<F> RecordWriter for F
where
    F: FnMut(&StreamId, &[Record]) -> Result<(), BoxError> + Send,
{
    fn write(&mut self, stream: &StreamId, batch: &[Record]) -> Result<(), BoxError> {
        self(stream, batch)
    }
}

/// Sets up destination resources before the first record is accepted.
pub type OnStartFunction = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Finalizes the destination exactly once at the end of the sync. The flag is
/// `true` when the sync failed and buffered data was discarded.
pub type OnCloseFunction = Box<dyn FnOnce(bool, &SyncSummary) -> Result<(), BoxError> + Send>;

/// Receives every checkpoint that became safe to acknowledge.
pub type OutputCollector = Box<dyn FnMut(Checkpoint) + Send>;
