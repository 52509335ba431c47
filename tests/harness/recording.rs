#![allow(dead_code)]

use ackbuffer::{
    BoxError, BufferingStrategy, Checkpoint, FlushInfo, FlushTrigger, InMemoryBufferingStrategy,
    Record, RecordWriter, StreamId, SyncSummary,
};
use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "public";
pub const STREAM_NAME: &str = "id_and_name";
pub const STREAM_NAME2: &str = "id_and_name2";

pub fn stream1() -> StreamId {
    StreamId::new(NAMESPACE, STREAM_NAME)
}

pub fn stream2() -> StreamId {
    StreamId::new(NAMESPACE, STREAM_NAME2)
}

/// A writer that keeps every batch it was handed and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    batches: Arc<Mutex<Vec<(StreamId, Vec<Record>)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<(StreamId, Vec<Record>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Every record written for `stream`, in write order.
    pub fn records_for(&self, stream: &StreamId) -> Vec<Record> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stream)
            .flat_map(|(_, batch)| batch.iter().cloned())
            .collect()
    }

    /// Whether some single write call received exactly `expected`.
    pub fn wrote_batch(&self, stream: &StreamId, expected: &[Record]) -> bool {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .any(|(s, batch)| s == stream && batch.as_slice() == expected)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl RecordWriter for RecordingWriter {
    fn write(&mut self, stream: &StreamId, batch: &[Record]) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "induced write failure").into());
        }
        self.batches
            .lock()
            .unwrap()
            .push((stream.clone(), batch.to_vec()));
        Ok(())
    }
}

/// Collects emitted checkpoints.
#[derive(Clone, Default)]
pub struct CheckpointLog {
    emitted: Arc<Mutex<Vec<Checkpoint>>>,
}

impl CheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collector(&self) -> impl FnMut(Checkpoint) + Send + 'static {
        let emitted = Arc::clone(&self.emitted);
        move |cp| emitted.lock().unwrap().push(cp)
    }

    pub fn emitted(&self) -> Vec<Checkpoint> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn count(&self, checkpoint: &Checkpoint) -> usize {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|cp| *cp == checkpoint)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.lock().unwrap().is_empty()
    }
}

/// Remembers the calls made to the lifecycle hooks.
#[derive(Clone, Default)]
pub struct LifecycleLog {
    started: Arc<Mutex<usize>>,
    closed: Arc<Mutex<Vec<(bool, SyncSummary)>>>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&self) -> impl FnOnce() -> Result<(), BoxError> + Send + 'static {
        let started = Arc::clone(&self.started);
        move || {
            *started.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub fn on_close(&self) -> impl FnOnce(bool, &SyncSummary) -> Result<(), BoxError> + Send + 'static {
        let closed = Arc::clone(&self.closed);
        move |has_failed, summary| {
            closed.lock().unwrap().push((has_failed, summary.clone()));
            Ok(())
        }
    }

    /// An on-close hook that records the call and then fails.
    pub fn failing_on_close(
        &self,
    ) -> impl FnOnce(bool, &SyncSummary) -> Result<(), BoxError> + Send + 'static {
        let closed = Arc::clone(&self.closed);
        move |has_failed, summary| {
            closed.lock().unwrap().push((has_failed, summary.clone()));
            Err("induced close failure".into())
        }
    }

    pub fn start_calls(&self) -> usize {
        *self.started.lock().unwrap()
    }

    /// The `has_failed` flag of every close call.
    pub fn close_calls(&self) -> Vec<bool> {
        self.closed.lock().unwrap().iter().map(|(f, _)| *f).collect()
    }

    pub fn last_summary(&self) -> Option<SyncSummary> {
        self.closed.lock().unwrap().last().map(|(_, s)| s.clone())
    }
}

/// Replays a fixed sequence of triggers over an in-memory buffer, then keeps
/// returning `FlushTrigger::None`.
pub struct ScriptedStrategy {
    inner: InMemoryBufferingStrategy,
    script: VecDeque<FlushTrigger>,
    flushes: Arc<Mutex<Vec<FlushInfo>>>,
}

impl ScriptedStrategy {
    pub fn new(script: impl IntoIterator<Item = FlushTrigger>) -> Self {
        Self {
            inner: InMemoryBufferingStrategy::new(usize::MAX),
            script: script.into_iter().collect(),
            flushes: Arc::default(),
        }
    }

    pub fn flushes(&self) -> Arc<Mutex<Vec<FlushInfo>>> {
        Arc::clone(&self.flushes)
    }
}

impl BufferingStrategy for ScriptedStrategy {
    fn add_record(&mut self, stream: &StreamId, record: Record) -> FlushTrigger {
        self.inner.add_record(stream, record);
        self.script.pop_front().unwrap_or(FlushTrigger::None)
    }

    fn batch(&self, stream: &StreamId) -> &[Record] {
        self.inner.batch(stream)
    }

    fn buffered_streams(&self) -> Vec<StreamId> {
        self.inner.buffered_streams()
    }

    fn clear_stream(&mut self, stream: &StreamId) {
        self.inner.clear_stream(stream)
    }

    fn buffered_bytes(&self) -> usize {
        self.inner.buffered_bytes()
    }

    fn stream_bytes(&self, stream: &StreamId) -> usize {
        self.inner.stream_bytes(stream)
    }

    fn on_flush(&mut self, info: &FlushInfo) {
        self.flushes.lock().unwrap().push(*info);
    }
}

/// Generates records for `stream` whose estimated sizes add up to at most
/// `target_bytes`, using the default payload estimator.
pub fn generate_records(rng: &mut StdRng, stream: &StreamId, target_bytes: usize) -> Vec<Record> {
    let mut records = Vec::new();
    let mut total = 0;
    for i in 0.. {
        let id: String = (0..7).map(|_| char::from(rng.sample(Alphanumeric))).collect();
        let payload = format!(r#"{{"id":"{id}","name":"human {i:8}"}}"#);
        let record = Record::new(stream.clone(), payload.into_bytes(), 1_700_000_000_000 + i);
        total += record.data.len() + stream.namespace.len() + stream.name.len() + 8;
        if total > target_bytes {
            break;
        }
        records.push(record);
    }
    records
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(0x005E_ED42)
}

pub fn state(stream: &StreamId, id: u8) -> Checkpoint {
    Checkpoint::stream(stream.clone(), format!(r#"{{"state_message_id":{id}}}"#).into_bytes())
}

pub fn global_state(id: u8) -> Checkpoint {
    Checkpoint::global(format!(r#"{{"state_message_id":{id}}}"#).into_bytes())
}
