//! Background thread that flushes on a timer.

use crate::error::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Runs a wake-up callback on its own thread until stopped.
///
/// The callback decides what a wake-up means. It returns how long to sleep
/// before the next wake-up, or `None` to end the thread. Stopping wakes the
/// thread immediately and joins it, so no callback runs after `stop` returns.
#[derive(Debug)]
pub struct PeriodicFlusher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicFlusher {
    /// Spawns the timer thread. The first wake-up happens after `first_wait`.
    pub fn spawn<F>(name: impl Into<String>, first_wait: Duration, mut on_wake: F) -> Result<Self>
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            let mut wait = first_wait;
            loop {
                match shutdown_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => match on_wake() {
                        Some(next) => wait = next,
                        None => break,
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("periodic flusher exiting");
        })?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // A full channel or a finished thread both mean the signal is moot.
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("periodic flusher thread panicked");
            }
        }
    }
}

impl Drop for PeriodicFlusher {
    fn drop(&mut self) {
        self.stop();
    }
}
