//! Validation strategies for incoming records.
//!
//! This module defines the `RecordValidator` trait and core implementations.
//! A validator either accepts a record, asks for it to be skipped, or fails;
//! a failure is fatal for the rest of the sync.

use crate::error::{Error, Result};
use crate::message::Record;

/// Outcome of validating a record that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Buffer the record.
    Accept,
    /// Drop the record and count it as ignored.
    Skip,
}

/// A trait for record validation strategies.
pub trait RecordValidator: Send {
    /// Validates the record according to the implementation's rules.
    ///
    /// Returns `Ok(Verdict)` for records that may continue, or an error
    /// (usually `Error::ValidationFailed`) that aborts the sync.
    fn validate(&self, record: &Record) -> Result<Verdict>;

    /// Returns the name of this validator for diagnostics/monitoring.
    fn name(&self) -> &'static str;
}

/// A no-op validator that accepts every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoValidator;

impl RecordValidator for NoValidator {
    #[inline(always)]
    fn validate(&self, _record: &Record) -> Result<Verdict> {
        Ok(Verdict::Accept)
    }

    fn name(&self) -> &'static str {
        "NoValidator"
    }
}

/// Size-based validator for quick sanity checks on the payload.
#[derive(Clone, Copy, Debug)]
pub struct SizeValidator {
    min_size: usize,
    max_size: usize,
}

impl SizeValidator {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self { min_size, max_size }
    }
}

impl RecordValidator for SizeValidator {
    #[inline(always)]
    fn validate(&self, record: &Record) -> Result<Verdict> {
        let size = record.data.len();
        if size < self.min_size {
            return Err(Error::validation_failed(
                self.name(),
                format!("payload size {size} is less than min {}", self.min_size),
            ));
        }
        if size > self.max_size {
            return Err(Error::validation_failed(
                self.name(),
                format!("payload size {size} exceeds max {}", self.max_size),
            ));
        }
        Ok(Verdict::Accept)
    }

    fn name(&self) -> &'static str {
        "SizeValidator"
    }
}

/// Adapts a closure into a validator.
pub struct FnValidator<F> {
    name: &'static str,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Record) -> Result<Verdict> + Send,
{
    pub fn new(name: &'static str, check: F) -> Self {
        Self { name, check }
    }
}

impl<F> std::fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl<F> RecordValidator for FnValidator<F>
where
    F: Fn(&Record) -> Result<Verdict> + Send,
{
    fn validate(&self, record: &Record) -> Result<Verdict> {
        (self.check)(record)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Compose multiple validators into a pipeline.
///
/// Validators run in insertion order. The first error or `Skip` wins.
pub struct CompositeValidator {
    validators: Vec<Box<dyn RecordValidator>>,
}

impl CompositeValidator {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Adds a validator to the pipeline (AND semantics).
    pub fn add<V: RecordValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

impl Default for CompositeValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.validators.iter().map(|v| v.name()).collect();
        f.debug_struct("CompositeValidator")
            .field("validators", &names)
            .finish()
    }
}

impl RecordValidator for CompositeValidator {
    fn validate(&self, record: &Record) -> Result<Verdict> {
        for v in &self.validators {
            if v.validate(record)? == Verdict::Skip {
                return Ok(Verdict::Skip);
            }
        }
        Ok(Verdict::Accept)
    }

    fn name(&self) -> &'static str {
        "CompositeValidator"
    }
}
