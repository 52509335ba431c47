//! Defines the `SizeEstimator` trait and concrete implementations.

use crate::message::Record;

/// Bytes charged for the emission timestamp of every record.
const TIMESTAMP_BYTES: usize = std::mem::size_of::<i64>();

/// A trait for estimating how much buffer space a record occupies.
///
/// Estimates drive capacity flushes only; they are not memory accounting.
/// Implementations must be deterministic for a given record and must not
/// decrease as the payload grows.
pub trait SizeEstimator: Send {
    /// Returns the estimated size of the record in bytes.
    fn estimate(&self, record: &Record) -> usize;
}

/// Charges the serialized footprint of a record: payload, stream key and
/// timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadSizeEstimator;

impl PayloadSizeEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl SizeEstimator for PayloadSizeEstimator {
    #[inline]
    fn estimate(&self, record: &Record) -> usize {
        record.data.len()
            + record.stream.namespace.len()
            + record.stream.name.len()
            + TIMESTAMP_BYTES
    }
}

/// Charges the same amount for every record, turning byte capacities into
/// record-count capacities.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeEstimator {
    bytes_per_record: usize,
}

impl FixedSizeEstimator {
    pub fn new(bytes_per_record: usize) -> Self {
        Self { bytes_per_record }
    }
}

impl Default for FixedSizeEstimator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SizeEstimator for FixedSizeEstimator {
    #[inline(always)]
    fn estimate(&self, _record: &Record) -> usize {
        self.bytes_per_record
    }
}
