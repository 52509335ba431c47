//! Typed messages consumed by the engine.
//!
//! Wire decoding happens upstream; everything here is already deserialized.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifies one logical stream within a sync.
///
/// Both parts are case-sensitive. An empty namespace on an incoming record is
/// resolved against the catalog's default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamId {
    pub namespace: String,
    pub name: String,
}

impl StreamId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// A single record emitted by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Record {
    pub stream: StreamId,
    /// Serialized payload; the engine never looks inside it.
    pub data: Vec<u8>,
    /// Emission time in milliseconds since the Unix epoch.
    pub emitted_at: i64,
}

impl Record {
    pub fn new(stream: StreamId, data: impl Into<Vec<u8>>, emitted_at: i64) -> Self {
        Self {
            stream,
            data: data.into(),
            emitted_at,
        }
    }
}

/// Progress of a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamCheckpoint {
    pub stream: StreamId,
    pub state: Vec<u8>,
}

/// Progress shared by every stream of the sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalCheckpoint {
    pub shared_state: Vec<u8>,
    /// Optional per-stream status carried alongside the shared state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stream_states: Vec<StreamCheckpoint>,
}

/// A "resume from here" marker from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Checkpoint {
    Stream(StreamCheckpoint),
    Global(GlobalCheckpoint),
}

impl Checkpoint {
    /// Convenience constructor for a stream-scoped checkpoint.
    pub fn stream(stream: StreamId, state: impl Into<Vec<u8>>) -> Self {
        Self::Stream(StreamCheckpoint {
            stream,
            state: state.into(),
        })
    }

    /// Convenience constructor for a global checkpoint without per-stream status.
    pub fn global(shared_state: impl Into<Vec<u8>>) -> Self {
        Self::Global(GlobalCheckpoint {
            shared_state: shared_state.into(),
            stream_states: Vec::new(),
        })
    }

    pub fn scope(&self) -> CheckpointScope {
        match self {
            Self::Stream(_) => CheckpointScope::Stream,
            Self::Global(_) => CheckpointScope::Global,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamCheckpoint> {
        match self {
            Self::Stream(cp) => Some(cp),
            Self::Global(_) => None,
        }
    }

    pub fn as_global(&self) -> Option<&GlobalCheckpoint> {
        match self {
            Self::Global(cp) => Some(cp),
            Self::Stream(_) => None,
        }
    }
}

/// The checkpoint scope a sync runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CheckpointScope {
    /// One checkpoint per stream, acknowledged independently.
    Stream,
    /// A single checkpoint covering every stream.
    Global,
}

impl fmt::Display for CheckpointScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// One message of the ordered input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "message", rename_all = "snake_case"))]
pub enum Message {
    Record(Record),
    Checkpoint(Checkpoint),
    /// Anything else the protocol carries (logs, traces, ...). Ignored here.
    Other { kind: String },
}

impl From<Record> for Message {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Checkpoint> for Message {
    fn from(checkpoint: Checkpoint) -> Self {
        Self::Checkpoint(checkpoint)
    }
}
