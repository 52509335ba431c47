//! Per-stream counters reported to the close callback.

use crate::message::StreamId;
use std::collections::BTreeMap;

/// Counters for one stream over the life of a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Records accepted by `accept`, including skipped ones.
    pub records_received: u64,
    /// Records a validator asked to skip.
    pub records_ignored: u64,
    /// Records the writer confirmed.
    pub records_written: u64,
    pub batches_written: u64,
    /// Estimated bytes of the written records.
    pub bytes_written: u64,
}

/// Counters for every stream that saw traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    streams: BTreeMap<StreamId, StreamSummary>,
}

impl SyncSummary {
    pub fn stream(&self, stream: &StreamId) -> Option<&StreamSummary> {
        self.streams.get(stream)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamId, &StreamSummary)> {
        self.streams.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn total_records_written(&self) -> u64 {
        self.streams.values().map(|s| s.records_written).sum()
    }

    pub(crate) fn record_received(&mut self, stream: &StreamId) {
        self.entry(stream).records_received += 1;
    }

    pub(crate) fn record_ignored(&mut self, stream: &StreamId) {
        self.entry(stream).records_ignored += 1;
    }

    pub(crate) fn batch_written(&mut self, stream: &StreamId, records: usize, bytes: usize) {
        let entry = self.entry(stream);
        entry.records_written += records as u64;
        entry.batches_written += 1;
        entry.bytes_written += bytes as u64;
    }

    fn entry(&mut self, stream: &StreamId) -> &mut StreamSummary {
        self.streams.entry(stream.clone()).or_default()
    }
}
