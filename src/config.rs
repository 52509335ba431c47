//! Consumer configuration.

use crate::error::{Error, Result};
use crate::message::CheckpointScope;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default aggregate buffer capacity: 200 MiB.
pub const DEFAULT_BUFFER_CAPACITY_BYTES: usize = 200 * 1024 * 1024;

/// Default interval between periodic flushes.
pub const DEFAULT_PERIODIC_FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Intervals at or above this are treated as "never flush periodically".
pub const PERIODIC_FLUSH_DISABLED_AT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Tunables for a `BufferedStreamConsumer`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConsumerConfig {
    /// Aggregate estimate that triggers a flush of every stream.
    pub buffer_capacity_bytes: usize,
    /// Per-stream estimate that triggers a flush of that stream alone.
    pub stream_capacity_bytes: Option<usize>,
    /// Flush everything once more streams than this hold data.
    pub max_buffered_streams: Option<usize>,
    /// Flush everything when no full flush happened for this long.
    /// `None` disables periodic flushing.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub periodic_flush_interval: Option<Duration>,
    /// Scope of the checkpoints in this sync. `None` adopts the scope of the
    /// first checkpoint received.
    pub checkpoint_scope: Option<CheckpointScope>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity_bytes: DEFAULT_BUFFER_CAPACITY_BYTES,
            stream_capacity_bytes: None,
            max_buffered_streams: None,
            periodic_flush_interval: Some(DEFAULT_PERIODIC_FLUSH_INTERVAL),
            checkpoint_scope: None,
        }
    }
}

impl ConsumerConfig {
    pub fn with_buffer_capacity_bytes(mut self, bytes: usize) -> Self {
        self.buffer_capacity_bytes = bytes;
        self
    }

    pub fn with_stream_capacity_bytes(mut self, bytes: usize) -> Self {
        self.stream_capacity_bytes = Some(bytes);
        self
    }

    pub fn with_max_buffered_streams(mut self, streams: usize) -> Self {
        self.max_buffered_streams = Some(streams);
        self
    }

    pub fn with_periodic_flush_interval(mut self, interval: Duration) -> Self {
        self.periodic_flush_interval = Some(interval);
        self
    }

    /// Turns off the periodic flusher; only capacity and close flush.
    pub fn without_periodic_flush(mut self) -> Self {
        self.periodic_flush_interval = None;
        self
    }

    pub fn with_checkpoint_scope(mut self, scope: CheckpointScope) -> Self {
        self.checkpoint_scope = Some(scope);
        self
    }

    /// The interval the periodic flusher should run at, if it should run.
    pub fn effective_flush_interval(&self) -> Option<Duration> {
        self.periodic_flush_interval
            .filter(|interval| *interval < PERIODIC_FLUSH_DISABLED_AT)
    }

    /// Rejects values that would make the consumer spin or never buffer.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity_bytes == 0 {
            return Err(Error::invalid_config("buffer_capacity_bytes must be positive"));
        }
        if self.stream_capacity_bytes == Some(0) {
            return Err(Error::invalid_config("stream_capacity_bytes must be positive"));
        }
        if self.max_buffered_streams == Some(0) {
            return Err(Error::invalid_config("max_buffered_streams must be positive"));
        }
        if self.periodic_flush_interval == Some(Duration::ZERO) {
            return Err(Error::invalid_config(
                "periodic_flush_interval must be positive; use None to disable",
            ));
        }
        Ok(())
    }
}
