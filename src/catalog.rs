//! The set of streams a sync declared up front.

use crate::error::{Error, Result};
use crate::message::StreamId;
use std::collections::BTreeSet;

/// Streams configured for the sync, plus the namespace applied to records
/// that arrive without one.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    default_namespace: String,
    streams: BTreeSet<StreamId>,
}

impl Catalog {
    pub fn new<I>(default_namespace: impl Into<String>, streams: I) -> Self
    where
        I: IntoIterator<Item = StreamId>,
    {
        Self {
            default_namespace: default_namespace.into(),
            streams: streams.into_iter().collect(),
        }
    }

    /// Adds a stream to the catalog.
    pub fn with_stream(mut self, stream: StreamId) -> Self {
        self.streams.insert(stream);
        self
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn contains(&self, stream: &StreamId) -> bool {
        self.streams.contains(stream)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamId> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Fills in the default namespace when `stream` has none.
    pub fn normalize(&self, stream: &mut StreamId) {
        if stream.namespace.is_empty() {
            stream.namespace.clone_from(&self.default_namespace);
        }
    }

    /// Normalizes `stream` and checks that it was declared.
    pub fn resolve(&self, stream: &mut StreamId) -> Result<()> {
        self.normalize(stream);
        if self.contains(stream) {
            Ok(())
        } else {
            Err(Error::UnknownStream {
                stream: stream.clone(),
            })
        }
    }
}
