//! # ackbuffer
//!
//! Checkpoint-safe buffering and flushing for the destination side of a
//! replication pipeline.
//!
//! ## Overview
//!
//! A source connector emits an ordered stream of *records* and *checkpoints*.
//! `ackbuffer` groups the records by stream, buffers them in memory, writes
//! them to a sink in batches, and hands each checkpoint back to the caller
//! only once every record that came before it has been written. A resumed
//! sync can then restart from the last acknowledged checkpoint without losing
//! data.
//!
//! ## Key Features
//!
//! * **Never acks early**: a checkpoint is emitted only after its records are durable
//! * **Stream or global checkpoints**: per-stream acknowledgment is independent; global
//!   checkpoints wait for a flush of every stream
//! * **Pluggable buffering**: the `BufferingStrategy` trait decides when to flush
//! * **Periodic flushing**: a timer thread keeps checkpoints moving when traffic is low
//! * **Fail fast**: protocol and validation errors poison the consumer for the rest of the sync
//!
//! ## Quick Start
//!
//! ```rust
//! use ackbuffer::*;
//!
//! fn main() -> Result<()> {
//!     let users = StreamId::new("public", "users");
//!     let catalog = Catalog::new("public", [users.clone()]);
//!
//!     // Any closure over (&StreamId, &[Record]) is a RecordWriter.
//!     let writer = |stream: &StreamId, batch: &[Record]| -> std::result::Result<(), BoxError> {
//!         println!("writing {} records to {stream}", batch.len());
//!         Ok(())
//!     };
//!
//!     let mut consumer = BufferedStreamConsumer::from_config(
//!         writer,
//!         catalog,
//!         ConsumerConfig::default(),
//!         |checkpoint| println!("safe to resume from {checkpoint:?}"),
//!     )?;
//!
//!     consumer.start()?;
//!     consumer.accept(Record::new(users.clone(), br#"{"id":1}"#.to_vec(), 0))?;
//!     consumer.accept(Checkpoint::stream(users, br#"{"cursor":1}"#.to_vec()))?;
//!     consumer.close(false)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! * **`BufferingStrategy`**: owns the buffers and returns a `FlushTrigger` per record
//! * **`RecordWriter`**: persists one stream's batch; injected by the caller
//! * **`StateManager`**: tracks pending and ackable checkpoints
//! * **`PeriodicFlusher`**: timer thread sharing the consumer's flush lock
//! * **`BufferedStreamConsumer`**: drives the lifecycle and the flush protocol

pub mod catalog;
pub mod config;
pub mod consumer;
pub mod error;
pub mod estimate;
pub mod flusher;
pub mod message;
pub mod sink;
pub mod state;
pub mod strategy;
pub mod summary;
pub mod traits;
pub mod validation;

// Re-export the main public API for user convenience.
pub use catalog::Catalog;
pub use config::ConsumerConfig;
pub use consumer::BufferedStreamConsumer;
pub use error::{BoxError, Error, Result};
pub use estimate::{FixedSizeEstimator, PayloadSizeEstimator, SizeEstimator};
pub use flusher::PeriodicFlusher;
pub use message::{
    Checkpoint, CheckpointScope, GlobalCheckpoint, Message, Record, StreamCheckpoint, StreamId,
};
pub use sink::{decode_frames, FramedRecordWriter};
pub use state::StateManager;
pub use strategy::{
    BufferingStrategy, FlushInfo, FlushReason, FlushTrigger, InMemoryBufferingStrategy,
};
pub use summary::{StreamSummary, SyncSummary};
pub use traits::{OnCloseFunction, OnStartFunction, OutputCollector, RecordWriter};
pub use validation::{
    CompositeValidator, FnValidator, NoValidator, RecordValidator, SizeValidator, Verdict,
};
