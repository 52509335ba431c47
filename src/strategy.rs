//! Buffering strategies for `BufferedStreamConsumer`.
//!
//! This module defines the `BufferingStrategy` trait and the in-memory
//! implementation used in production. A strategy owns the per-stream buffers
//! and decides *when* a flush should happen; it never performs I/O itself.
//! The consumer reads finished batches back out, hands them to the record
//! writer and only then clears them.

use crate::config::ConsumerConfig;
use crate::estimate::{PayloadSizeEstimator, SizeEstimator};
use crate::message::{Record, StreamId};
use std::collections::BTreeMap;

/// What a strategy asks the consumer to do after buffering a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Keep buffering.
    None,
    /// Flush the named stream only.
    FlushStream(StreamId),
    /// Flush every buffered stream.
    FlushAll,
}

/// Why a flush happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// A single stream reached its capacity.
    StreamCapacity,
    /// The aggregate buffer reached its capacity.
    BufferCapacity,
    /// The periodic flusher fired.
    Periodic,
    /// The caller asked for a flush.
    Manual,
    /// The consumer is closing.
    Close,
}

/// Information about a completed flush.
#[derive(Debug, Clone, Copy)]
pub struct FlushInfo {
    pub reason: FlushReason,
    pub streams: usize,
    pub records: usize,
    pub bytes: usize,
}

/// A trait that defines a stateful policy for buffering records and deciding
/// when they should be flushed.
pub trait BufferingStrategy: Send {
    /// Buffers `record` under `stream` and reports whether a flush is due.
    ///
    /// The record is always buffered, even when it alone exceeds every
    /// threshold; the returned trigger then asks for it to be flushed.
    fn add_record(&mut self, stream: &StreamId, record: Record) -> FlushTrigger;

    /// Records currently buffered for `stream`, in arrival order.
    fn batch(&self, stream: &StreamId) -> &[Record];

    /// Streams that currently hold buffered records.
    fn buffered_streams(&self) -> Vec<StreamId>;

    /// Drops the buffered records of `stream` after they were written.
    fn clear_stream(&mut self, stream: &StreamId);

    /// Estimated size of everything buffered, in bytes.
    fn buffered_bytes(&self) -> usize;

    /// Estimated size buffered for one stream, in bytes.
    fn stream_bytes(&self, stream: &StreamId) -> usize;

    fn is_empty(&self) -> bool {
        self.buffered_streams().is_empty()
    }

    /// Optional hook called after a flush completes.
    /// Useful for logging or metrics without overhead when unused.
    #[inline(always)]
    fn on_flush(&mut self, _info: &FlushInfo) {}
}

#[derive(Debug, Default)]
struct StreamBuffer {
    records: Vec<Record>,
    bytes: usize,
}

/// Buffers records in memory, grouped by stream.
///
/// Signals `FlushAll` when the aggregate estimate reaches
/// `buffer_capacity_bytes` or when more than `max_buffered_streams` streams
/// hold data, and `FlushStream` when one stream reaches
/// `stream_capacity_bytes`.
#[derive(Debug)]
pub struct InMemoryBufferingStrategy<E: SizeEstimator = PayloadSizeEstimator> {
    buffers: BTreeMap<StreamId, StreamBuffer>,
    buffered_bytes: usize,
    buffer_capacity_bytes: usize,
    stream_capacity_bytes: Option<usize>,
    max_buffered_streams: Option<usize>,
    estimator: E,
}

impl InMemoryBufferingStrategy<PayloadSizeEstimator> {
    /// Creates a strategy that flushes everything once `buffer_capacity_bytes`
    /// are buffered.
    pub fn new(buffer_capacity_bytes: usize) -> Self {
        Self::with_estimator(buffer_capacity_bytes, PayloadSizeEstimator)
    }

    /// Creates a strategy with the thresholds from `config`.
    pub fn from_config(config: &ConsumerConfig) -> Self {
        let mut strategy = Self::new(config.buffer_capacity_bytes);
        strategy.stream_capacity_bytes = config.stream_capacity_bytes;
        strategy.max_buffered_streams = config.max_buffered_streams;
        strategy
    }
}

impl<E: SizeEstimator> InMemoryBufferingStrategy<E> {
    pub fn with_estimator(buffer_capacity_bytes: usize, estimator: E) -> Self {
        Self {
            buffers: BTreeMap::new(),
            buffered_bytes: 0,
            buffer_capacity_bytes,
            stream_capacity_bytes: None,
            max_buffered_streams: None,
            estimator,
        }
    }

    /// Flush a single stream once it holds this many bytes.
    pub fn with_stream_capacity(mut self, bytes: usize) -> Self {
        self.stream_capacity_bytes = Some(bytes);
        self
    }

    /// Flush everything once more than `streams` streams hold data.
    pub fn with_max_buffered_streams(mut self, streams: usize) -> Self {
        self.max_buffered_streams = Some(streams);
        self
    }

    pub fn buffer_capacity_bytes(&self) -> usize {
        self.buffer_capacity_bytes
    }
}

impl<E: SizeEstimator> BufferingStrategy for InMemoryBufferingStrategy<E> {
    fn add_record(&mut self, stream: &StreamId, record: Record) -> FlushTrigger {
        let size = self.estimator.estimate(&record);
        let buffer = self.buffers.entry(stream.clone()).or_default();
        buffer.records.push(record);
        buffer.bytes = buffer.bytes.saturating_add(size);
        let stream_bytes = buffer.bytes;
        self.buffered_bytes = self.buffered_bytes.saturating_add(size);

        if self.buffered_bytes >= self.buffer_capacity_bytes {
            return FlushTrigger::FlushAll;
        }
        if self
            .max_buffered_streams
            .is_some_and(|max| self.buffers.len() > max)
        {
            return FlushTrigger::FlushAll;
        }
        if self
            .stream_capacity_bytes
            .is_some_and(|cap| stream_bytes >= cap)
        {
            return FlushTrigger::FlushStream(stream.clone());
        }
        FlushTrigger::None
    }

    fn batch(&self, stream: &StreamId) -> &[Record] {
        self.buffers
            .get(stream)
            .map(|b| b.records.as_slice())
            .unwrap_or(&[])
    }

    fn buffered_streams(&self) -> Vec<StreamId> {
        self.buffers.keys().cloned().collect()
    }

    fn clear_stream(&mut self, stream: &StreamId) {
        if let Some(buffer) = self.buffers.remove(stream) {
            self.buffered_bytes = self.buffered_bytes.saturating_sub(buffer.bytes);
        }
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn stream_bytes(&self, stream: &StreamId) -> usize {
        self.buffers.get(stream).map_or(0, |b| b.bytes)
    }

    fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
