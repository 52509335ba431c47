//! The buffered stream consumer.
//!
//! `BufferedStreamConsumer` takes the ordered message stream of one sync,
//! buffers records through a `BufferingStrategy`, writes them with a
//! `RecordWriter` when a flush is due, and forwards a checkpoint to the output
//! collector only after every record that precedes it has been written.
//!
//! Flushes come from three places: the strategy's capacity triggers (on the
//! ingestion thread), the periodic flusher (on its own thread), and `close`.
//! All of them go through the same `FlushCore` behind one mutex.

use crate::catalog::Catalog;
use crate::config::ConsumerConfig;
use crate::error::{BoxError, Error, Result};
use crate::flusher::PeriodicFlusher;
use crate::message::{Checkpoint, CheckpointScope, Message, Record, StreamId};
use crate::state::StateManager;
use crate::strategy::{BufferingStrategy, FlushInfo, FlushReason, FlushTrigger, InMemoryBufferingStrategy};
use crate::summary::SyncSummary;
use crate::traits::{OnCloseFunction, OnStartFunction, OutputCollector, RecordWriter};
use crate::validation::{NoValidator, RecordValidator, Verdict};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const FLUSHER_THREAD_NAME: &str = "ackbuffer-periodic-flush";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Closed,
}

/// Everything the flush lock protects.
struct FlushCore<W, S> {
    strategy: S,
    writer: W,
    state: StateManager,
    output: OutputCollector,
    summary: SyncSummary,
    /// Set on a fatal error; never cleared.
    failed: bool,
    /// A periodic flush failure waiting to be reported on the ingestion thread.
    deferred: Option<Error>,
    last_flush_all: Instant,
}

impl<W: RecordWriter, S: BufferingStrategy> FlushCore<W, S> {
    /// Writes the buffered batch of `stream` and drops it once durable.
    fn write_stream(&mut self, stream: &StreamId) -> Result<(usize, usize)> {
        let batch = self.strategy.batch(stream);
        if batch.is_empty() {
            return Ok((0, 0));
        }
        let records = batch.len();
        let bytes = self.strategy.stream_bytes(stream);
        self.writer
            .write(stream, batch)
            .map_err(|source| Error::write(stream.clone(), source))?;
        self.strategy.clear_stream(stream);
        self.summary.batch_written(stream, records, bytes);
        Ok((records, bytes))
    }

    fn apply(&mut self, trigger: FlushTrigger) -> Result<()> {
        match trigger {
            FlushTrigger::None => Ok(()),
            FlushTrigger::FlushStream(stream) => {
                self.flush_stream(&stream, FlushReason::StreamCapacity)
            }
            FlushTrigger::FlushAll => self.flush_all(FlushReason::BufferCapacity),
        }
    }

    fn flush_stream(&mut self, stream: &StreamId, reason: FlushReason) -> Result<()> {
        let (records, bytes) = self.write_stream(stream)?;
        self.state.mark_stream_flushed(stream);
        debug!(%stream, records, bytes, ?reason, "flushed stream");
        self.strategy.on_flush(&FlushInfo {
            reason,
            streams: 1,
            records,
            bytes,
        });
        self.emit_ackable();
        Ok(())
    }

    fn flush_all(&mut self, reason: FlushReason) -> Result<()> {
        let streams = self.strategy.buffered_streams();
        let mut records = 0;
        let mut bytes = 0;
        for stream in &streams {
            match self.write_stream(stream) {
                Ok((r, b)) => {
                    records += r;
                    bytes += b;
                    // Stream scope can acknowledge what is already durable even
                    // if a later stream fails.
                    self.state.mark_stream_flushed(stream);
                }
                Err(err) => {
                    self.emit_ackable();
                    return Err(err);
                }
            }
        }
        self.state.mark_all_flushed();
        self.last_flush_all = Instant::now();
        debug!(streams = streams.len(), records, bytes, ?reason, "flushed all streams");
        self.strategy.on_flush(&FlushInfo {
            reason,
            streams: streams.len(),
            records,
            bytes,
        });
        self.emit_ackable();
        Ok(())
    }

    fn emit_ackable(&mut self) {
        for checkpoint in self.state.take_ackable() {
            debug!(scope = %checkpoint.scope(), "emitting checkpoint");
            (self.output)(checkpoint);
        }
    }

    /// One wake-up of the periodic flusher. Returns the time until the next
    /// check, or `None` to stop the flusher.
    ///
    /// A failed write keeps the flusher alive: the records stay buffered and
    /// the next wake-up retries them. Only the first failure is kept for the
    /// ingestion thread.
    fn on_periodic_wake(&mut self, interval: Duration) -> Option<Duration> {
        if self.failed {
            return None;
        }
        let elapsed = self.last_flush_all.elapsed();
        if elapsed < interval {
            return Some(interval - elapsed);
        }

        info!(
            buffered_bytes = self.strategy.buffered_bytes(),
            "periodic buffer flush started"
        );
        if let Err(err) = self.flush_all(FlushReason::Periodic) {
            error!(error = %err, "periodic buffer flush failed");
            if self.deferred.is_none() {
                self.deferred = Some(err);
            }
        }
        Some(interval)
    }

    fn discard_buffers(&mut self) {
        for stream in self.strategy.buffered_streams() {
            let discarded = self.strategy.batch(&stream).len();
            warn!(%stream, records = discarded, "discarding unflushed records");
            self.strategy.clear_stream(&stream);
        }
    }
}

/// Consumes one sync's messages and acknowledges checkpoints once durable.
///
/// Lifecycle: `start` once, `accept` any number of times, `close` once. A
/// fatal error (protocol violation, validation failure) marks the consumer
/// as failed; every later `accept` is rejected and `close` discards the
/// buffers instead of flushing them.
pub struct BufferedStreamConsumer<W, S = InMemoryBufferingStrategy>
where
    W: RecordWriter + 'static,
    S: BufferingStrategy + 'static,
{
    core: Arc<Mutex<FlushCore<W, S>>>,
    catalog: Catalog,
    validator: Box<dyn RecordValidator>,
    on_start: Option<OnStartFunction>,
    on_close: Option<OnCloseFunction>,
    flush_interval: Option<Duration>,
    lifecycle: Lifecycle,
    flusher: Option<PeriodicFlusher>,
}

impl<W: RecordWriter + 'static> BufferedStreamConsumer<W> {
    /// Creates a consumer whose in-memory strategy uses the thresholds from
    /// `config`.
    pub fn from_config<O>(writer: W, catalog: Catalog, config: ConsumerConfig, output: O) -> Result<Self>
    where
        O: FnMut(Checkpoint) + Send + 'static,
    {
        let strategy = InMemoryBufferingStrategy::from_config(&config);
        Self::new(writer, strategy, catalog, config, output)
    }
}

impl<W, S> BufferedStreamConsumer<W, S>
where
    W: RecordWriter + 'static,
    S: BufferingStrategy + 'static,
{
    /// Creates a consumer. `output` receives each checkpoint once it is safe to
    /// acknowledge.
    pub fn new<O>(
        writer: W,
        strategy: S,
        catalog: Catalog,
        config: ConsumerConfig,
        output: O,
    ) -> Result<Self>
    where
        O: FnMut(Checkpoint) + Send + 'static,
    {
        config.validate()?;
        let core = FlushCore {
            strategy,
            writer,
            state: StateManager::new(config.checkpoint_scope),
            output: Box::new(output),
            summary: SyncSummary::default(),
            failed: false,
            deferred: None,
            last_flush_all: Instant::now(),
        };
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            catalog,
            validator: Box::new(NoValidator),
            on_start: None,
            on_close: None,
            flush_interval: config.effective_flush_interval(),
            lifecycle: Lifecycle::Created,
            flusher: None,
        })
    }

    /// Validates every record before it is buffered.
    pub fn with_validator<V: RecordValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Runs once from `start`, before any record is accepted.
    pub fn with_on_start<F>(mut self, on_start: F) -> Self
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.on_start = Some(Box::new(on_start));
        self
    }

    /// Runs once from `close` with the failure flag and the sync summary.
    pub fn with_on_close<F>(mut self, on_close: F) -> Self
    where
        F: FnOnce(bool, &SyncSummary) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.on_close = Some(Box::new(on_close));
        self
    }

    /// Runs the start callback and launches the periodic flusher.
    pub fn start(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Created {
            return Err(Error::illegal_state("consumer has already been started"));
        }
        self.lifecycle = Lifecycle::Started;
        info!(
            streams = self.catalog.len(),
            periodic_flush = ?self.flush_interval,
            "starting buffered stream consumer"
        );

        if let Some(on_start) = self.on_start.take() {
            if let Err(source) = on_start() {
                error!(error = %source, "start callback failed");
                self.core.lock().failed = true;
                return Err(Error::Start(source));
            }
        }

        self.core.lock().last_flush_all = Instant::now();
        if let Some(interval) = self.flush_interval {
            let core = Arc::clone(&self.core);
            let flusher = PeriodicFlusher::spawn(FLUSHER_THREAD_NAME, interval, move || {
                core.lock().on_periodic_wake(interval)
            })?;
            self.flusher = Some(flusher);
        }
        Ok(())
    }

    /// Processes the next message of the sync.
    ///
    /// The message is handled even when an earlier periodic flush failed; that
    /// failure is returned afterwards, once, unless handling the message
    /// produced an error of its own.
    pub fn accept(&mut self, message: impl Into<Message>) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Created => {
                return Err(Error::illegal_state("cannot accept messages before start"))
            }
            Lifecycle::Closed => {
                return Err(Error::illegal_state("cannot accept messages after close"))
            }
            Lifecycle::Started => {}
        }
        if self.core.lock().failed {
            return Err(Error::AlreadyFailed);
        }

        match message.into() {
            Message::Record(record) => self.accept_record(record)?,
            Message::Checkpoint(checkpoint) => self.accept_checkpoint(checkpoint)?,
            Message::Other { kind } => warn!(%kind, "ignoring unexpected message"),
        }
        self.core.lock().deferred.take().map_or(Ok(()), Err)
    }

    fn accept_record(&mut self, mut record: Record) -> Result<()> {
        if let Err(err) = self.catalog.resolve(&mut record.stream) {
            return Err(self.fail(err));
        }
        let verdict = match self.validator.validate(&record) {
            Ok(verdict) => verdict,
            Err(err) => return Err(self.fail(err)),
        };

        let stream = record.stream.clone();
        let mut core = self.core.lock();
        core.summary.record_received(&stream);
        if verdict == Verdict::Skip {
            core.summary.record_ignored(&stream);
            return Ok(());
        }
        let trigger = core.strategy.add_record(&stream, record);
        core.apply(trigger)
    }

    fn accept_checkpoint(&mut self, mut checkpoint: Checkpoint) -> Result<()> {
        if let Checkpoint::Stream(cp) = &mut checkpoint {
            if let Err(err) = self.catalog.resolve(&mut cp.stream) {
                return Err(self.fail(err));
            }
        }
        let result = self.core.lock().state.add_checkpoint(checkpoint);
        result.map_err(|err| self.fail(err))
    }

    fn fail(&self, err: Error) -> Error {
        error!(error = %err, "fatal error; consumer marked as failed");
        self.core.lock().failed = true;
        err
    }

    /// Flushes every stream now and emits what became ackable.
    pub fn flush(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Started {
            return Err(Error::illegal_state("can only flush a started consumer"));
        }
        let mut core = self.core.lock();
        if core.failed {
            return Err(Error::AlreadyFailed);
        }
        core.flush_all(FlushReason::Manual)
    }

    /// Ends the sync. Must be called exactly once after `start`.
    ///
    /// On success the remaining buffers are written and their checkpoints
    /// emitted before the close callback runs. When `has_failed` is set, or
    /// the consumer failed, buffers are discarded and nothing is emitted.
    pub fn close(&mut self, has_failed: bool) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Created => return Err(Error::illegal_state("cannot close before start")),
            Lifecycle::Closed => return Err(Error::illegal_state("consumer has already been closed")),
            Lifecycle::Started => {}
        }
        self.lifecycle = Lifecycle::Closed;

        if let Some(mut flusher) = self.flusher.take() {
            flusher.stop();
        }

        let mut core = self.core.lock();
        for (stream, summary) in core.summary.iter() {
            if summary.records_ignored > 0 {
                warn!(%stream, ignored = summary.records_ignored, "records were ignored by validation");
            }
        }

        let deferred = core.deferred.take();
        let mut failed = has_failed || core.failed || deferred.is_some();
        let mut result = deferred.map_or(Ok(()), Err);
        if failed {
            error!("executing failed close procedure");
            core.discard_buffers();
        } else {
            info!("executing successful close procedure");
            if let Err(err) = core.flush_all(FlushReason::Close) {
                error!(error = %err, "final flush failed");
                failed = true;
                result = Err(err);
            }
        }
        let summary = core.summary.clone();
        drop(core);

        if let Some(on_close) = self.on_close.take() {
            if let Err(source) = on_close(failed, &summary) {
                error!(error = %source, "close callback failed");
                if result.is_ok() {
                    result = Err(Error::Close(source));
                }
            }
        }
        result
    }

    /// Whether a fatal error has marked the consumer as failed.
    pub fn is_failed(&self) -> bool {
        self.core.lock().failed
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    /// Per-stream counters so far.
    pub fn summary(&self) -> SyncSummary {
        self.core.lock().summary.clone()
    }

    /// Estimated size of the records currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.core.lock().strategy.buffered_bytes()
    }

    /// Number of checkpoints still waiting for their records to be written.
    pub fn pending_checkpoints(&self) -> usize {
        self.core.lock().state.pending_count()
    }

    /// The checkpoint scope of the sync, once known.
    pub fn checkpoint_scope(&self) -> Option<CheckpointScope> {
        self.core.lock().state.scope()
    }
}

impl<W, S> std::fmt::Debug for BufferedStreamConsumer<W, S>
where
    W: RecordWriter + 'static,
    S: BufferingStrategy + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedStreamConsumer")
            .field("lifecycle", &self.lifecycle)
            .field("streams", &self.catalog.len())
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::FixedSizeEstimator;

    type Written = Arc<Mutex<Vec<(StreamId, Vec<Record>)>>>;
    type Emitted = Arc<Mutex<Vec<Checkpoint>>>;

    fn users() -> StreamId {
        StreamId::new("public", "users")
    }

    fn catalog() -> Catalog {
        Catalog::new("public", [users()])
    }

    fn consumer(
        capacity: usize,
    ) -> (
        BufferedStreamConsumer<impl RecordWriter, InMemoryBufferingStrategy<FixedSizeEstimator>>,
        Written,
        Emitted,
    ) {
        let written: Written = Arc::default();
        let emitted: Emitted = Arc::default();
        let w = Arc::clone(&written);
        let e = Arc::clone(&emitted);
        let writer = move |stream: &StreamId, batch: &[Record]| -> std::result::Result<(), BoxError> {
            w.lock().push((stream.clone(), batch.to_vec()));
            Ok(())
        };
        let strategy = InMemoryBufferingStrategy::with_estimator(capacity, FixedSizeEstimator::new(1));
        let consumer = BufferedStreamConsumer::new(
            writer,
            strategy,
            catalog(),
            ConsumerConfig::default().without_periodic_flush(),
            move |cp| e.lock().push(cp),
        )
        .unwrap();
        (consumer, written, emitted)
    }

    fn record(i: u8) -> Record {
        Record::new(users(), vec![i], 0)
    }

    #[test]
    fn accept_before_start_is_rejected() {
        let (mut consumer, _, _) = consumer(10);
        assert!(matches!(consumer.accept(record(1)), Err(Error::IllegalState { .. })));
    }

    #[test]
    fn capacity_trigger_writes_and_emits() {
        let (mut consumer, written, emitted) = consumer(3);
        consumer.start().unwrap();
        consumer.accept(record(1)).unwrap();
        consumer.accept(Checkpoint::stream(users(), b"a".to_vec())).unwrap();
        consumer.accept(record(2)).unwrap();
        assert!(emitted.lock().is_empty());
        consumer.accept(record(3)).unwrap();

        assert_eq!(written.lock().len(), 1);
        assert_eq!(written.lock()[0].1.len(), 3);
        assert_eq!(*emitted.lock(), vec![Checkpoint::stream(users(), b"a".to_vec())]);
        assert_eq!(consumer.buffered_bytes(), 0);
        consumer.close(false).unwrap();
    }

    #[test]
    fn manual_flush_emits_pending() {
        let (mut consumer, written, emitted) = consumer(100);
        consumer.start().unwrap();
        consumer.accept(record(1)).unwrap();
        consumer.accept(Checkpoint::stream(users(), b"a".to_vec())).unwrap();
        consumer.flush().unwrap();
        assert_eq!(written.lock().len(), 1);
        assert_eq!(emitted.lock().len(), 1);
        consumer.close(false).unwrap();
        assert_eq!(written.lock().len(), 1);
        assert_eq!(emitted.lock().len(), 1);
    }

    #[test]
    fn namespace_is_defaulted_before_buffering() {
        let (mut consumer, written, _) = consumer(100);
        consumer.start().unwrap();
        consumer
            .accept(Record::new(StreamId::new("", "users"), b"x".to_vec(), 0))
            .unwrap();
        consumer.close(false).unwrap();
        let written = written.lock();
        assert_eq!(written[0].0, users());
        assert_eq!(written[0].1[0].stream, users());
    }

    #[test]
    fn message_after_failed_periodic_flush_is_still_buffered() {
        let failing = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let written: Written = Arc::default();
        let emitted: Emitted = Arc::default();
        let writer = {
            let failing = Arc::clone(&failing);
            let w = Arc::clone(&written);
            move |stream: &StreamId, batch: &[Record]| -> std::result::Result<(), BoxError> {
                if failing.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err("sink down".into());
                }
                w.lock().push((stream.clone(), batch.to_vec()));
                Ok(())
            }
        };
        let e = Arc::clone(&emitted);
        let mut consumer = BufferedStreamConsumer::new(
            writer,
            InMemoryBufferingStrategy::with_estimator(100, FixedSizeEstimator::new(1)),
            catalog(),
            ConsumerConfig::default().without_periodic_flush(),
            move |cp| e.lock().push(cp),
        )
        .unwrap();
        consumer.start().unwrap();

        consumer.accept(record(1)).unwrap();
        let next = consumer.core.lock().on_periodic_wake(Duration::ZERO);
        assert_eq!(next, Some(Duration::ZERO));

        // The stored failure is reported, but the record is not lost.
        assert!(matches!(consumer.accept(record(2)), Err(Error::Write { .. })));
        consumer.accept(Checkpoint::stream(users(), b"after-2".to_vec())).unwrap();
        assert!(!consumer.is_failed());
        assert!(emitted.lock().is_empty());

        failing.store(false, std::sync::atomic::Ordering::SeqCst);
        consumer.close(false).unwrap();
        let records: Vec<Record> = written.lock().iter().flat_map(|(_, b)| b.clone()).collect();
        assert_eq!(records, vec![record(1), record(2)]);
        assert_eq!(
            *emitted.lock(),
            vec![Checkpoint::stream(users(), b"after-2".to_vec())]
        );
    }

    #[test]
    fn periodic_wake_retries_after_failure() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let emitted: Emitted = Arc::default();
        let writer = {
            let attempts = Arc::clone(&attempts);
            move |_: &StreamId, _: &[Record]| -> std::result::Result<(), BoxError> {
                if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    return Err("sink down".into());
                }
                Ok(())
            }
        };
        let e = Arc::clone(&emitted);
        let mut consumer = BufferedStreamConsumer::new(
            writer,
            InMemoryBufferingStrategy::with_estimator(100, FixedSizeEstimator::new(1)),
            catalog(),
            ConsumerConfig::default().without_periodic_flush(),
            move |cp| e.lock().push(cp),
        )
        .unwrap();
        consumer.start().unwrap();
        consumer.accept(record(1)).unwrap();
        consumer.accept(Checkpoint::stream(users(), b"a".to_vec())).unwrap();

        assert!(consumer.core.lock().on_periodic_wake(Duration::ZERO).is_some());
        assert!(emitted.lock().is_empty());
        assert!(consumer.core.lock().on_periodic_wake(Duration::ZERO).is_some());
        assert_eq!(*emitted.lock(), vec![Checkpoint::stream(users(), b"a".to_vec())]);

        // The first failure is still reported to the ingestion thread.
        assert!(matches!(consumer.accept(record(2)), Err(Error::Write { .. })));
        consumer.close(false).unwrap();
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn other_messages_are_ignored() {
        let (mut consumer, written, emitted) = consumer(100);
        consumer.start().unwrap();
        consumer
            .accept(Message::Other {
                kind: "log".to_string(),
            })
            .unwrap();
        consumer.close(false).unwrap();
        assert!(written.lock().is_empty());
        assert!(emitted.lock().is_empty());
    }
}
