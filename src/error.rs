use crate::message::{CheckpointScope, StreamId};
use thiserror::Error;

/// Boxed error returned by injected collaborators (writers, lifecycle hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Custom error types for the ackbuffer library.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O errors from std::io operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record or checkpoint referenced a stream that is not in the catalog.
    #[error("Unknown stream {stream}: not declared in the configured catalog")]
    UnknownStream { stream: StreamId },

    /// A checkpoint arrived whose scope differs from the scope of the sync.
    #[error("Checkpoint scope mismatch: sync uses {expected} checkpoints, received {received}")]
    CheckpointScopeMismatch {
        expected: CheckpointScope,
        received: CheckpointScope,
    },

    /// A record was rejected by a validator.
    #[error("Validation failed ({validator}): {reason}")]
    ValidationFailed {
        validator: &'static str,
        reason: String,
    },

    /// The record writer failed to persist a batch.
    #[error("Failed to write batch for stream {stream}: {source}")]
    Write {
        stream: StreamId,
        #[source]
        source: BoxError,
    },

    /// The on-start callback failed.
    #[error("Start callback failed: {0}")]
    Start(#[source] BoxError),

    /// The on-close callback failed.
    #[error("Close callback failed: {0}")]
    Close(#[source] BoxError),

    /// The consumer previously hit a fatal error and rejects further input.
    #[error("Consumer has failed and no longer accepts messages")]
    AlreadyFailed,

    /// A lifecycle method was called out of order.
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    /// Configuration values that cannot drive a consumer.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Malformed frame while decoding sink output.
    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },
}

impl Error {
    /// Create a new `IllegalState` error with a descriptive message.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error with a descriptive message.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new `InvalidFrame` error with a descriptive message.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Create a new `ValidationFailed` error for the named validator.
    pub fn validation_failed(validator: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            validator,
            reason: reason.into(),
        }
    }

    /// Wrap a writer failure for `stream`.
    pub fn write(stream: StreamId, source: impl Into<BoxError>) -> Self {
        Self::Write {
            stream,
            source: source.into(),
        }
    }

    /// Whether this error is a protocol violation by the upstream source.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownStream { .. } | Self::CheckpointScopeMismatch { .. }
        )
    }
}

/// Result type alias for the library operations.
pub type Result<T> = std::result::Result<T, Error>;
