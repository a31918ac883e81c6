use crate::cancel::CancellationToken;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("{sentinel:?} did not appear within {waited:?}")]
    Timeout { sentinel: PathBuf, waited: Duration },

    #[error("wait for {0:?} was cancelled")]
    Cancelled(PathBuf),
}

/// Blocks until the probe wrapper has created its sentinel directory.
///
/// A missing sentinel just means "not ready yet". Without a timeout the wait
/// only ends when the sentinel shows up or the token is cancelled.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    sentinel: PathBuf,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl ReadinessGate {
    pub fn new(sentinel: impl Into<PathBuf>) -> Self {
        Self {
            sentinel: sentinel.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    pub fn is_ready(&self) -> bool {
        self.sentinel.exists()
    }

    pub fn wait(&self, cancel: &CancellationToken) -> Result<(), ReadinessError> {
        if self.is_ready() {
            return Ok(());
        }

        tracing::info!(sentinel = %self.sentinel.display(), "waiting for probe wrapper to be available");
        let start_time = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(ReadinessError::Cancelled(self.sentinel.clone()));
            }

            let waited = start_time.elapsed();
            if let Some(timeout) = self.timeout {
                if waited >= timeout {
                    return Err(ReadinessError::Timeout {
                        sentinel: self.sentinel.clone(),
                        waited,
                    });
                }
            }

            let nap = match self.timeout {
                Some(timeout) => self.poll_interval.min(timeout - waited),
                None => self.poll_interval,
            };
            std::thread::sleep(nap);

            if self.is_ready() {
                tracing::info!(waited = ?start_time.elapsed(), "probe wrapper is available");
                return Ok(());
            }
            tracing::debug!(sentinel = %self.sentinel.display(), "probe wrapper not ready yet");
        }
    }
}
