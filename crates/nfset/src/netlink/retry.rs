//! Bounded retry loop around a single non-blocking send.
//!
//! A netlink send on a non-blocking socket can be rejected while the
//! kernel applies backpressure. [`RetryPolicy::run`] keeps retrying such a
//! send for a bounded number of attempts with a short fixed pause, retries
//! signal interruptions without limit, and gives up on anything else.
//!
//! ```text
//! Idle -> Sending -+-> ok ------------------------------> Done
//!                  +-> would block, count <  max -> sleep -> Sending
//!                  +-> would block, count == max --------> Exhausted
//!                  +-> interrupted ---------------------> Sending
//!                  +-> other error ---------------------> Exhausted
//! ```
//!
//! The counter lives in the `run` call, so concurrent requests never share
//! retry state. The pause blocks the calling thread.

use std::io;
use std::time::Duration;

use super::error::{Error, Result};
use super::socket::SendErrorKind;

/// Default number of "would block" failures tolerated per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Default pause between "would block" retries.
pub const DEFAULT_BACKOFF: Duration = Duration::from_micros(10);

/// Retry configuration for one logical send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// A send fails once this many "would block" errors were seen.
    pub max_attempts: u32,
    /// Pause after each "would block" error.
    #[cfg_attr(feature = "serde", serde(rename = "backoff_us", with = "micros"))]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What happened while delivering one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Total number of send calls, including the successful one.
    pub attempts: u32,
    /// Calls that failed with "would block".
    pub would_block: u32,
    /// Calls that were interrupted by a signal.
    pub interrupted: u32,
}

impl SendReport {
    /// Count one send call. `failure` is the kind of error it returned.
    ///
    /// Interrupted sends are retried without limit, so the counters
    /// saturate instead of wrapping.
    fn record(&mut self, failure: Option<SendErrorKind>) {
        self.attempts = self.attempts.saturating_add(1);
        match failure {
            Some(SendErrorKind::WouldBlock) => {
                self.would_block = self.would_block.saturating_add(1)
            }
            Some(SendErrorKind::Interrupted) => {
                self.interrupted = self.interrupted.saturating_add(1)
            }
            Some(SendErrorKind::Other) | None => {}
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default bound and pause.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of "would block" failures after which a send fails.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the pause between "would block" retries.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Worst-case time spent sleeping for one request.
    pub fn max_backoff(&self) -> Duration {
        self.backoff
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }

    /// Drive `send` until it succeeds, the bound is reached, or it fails
    /// with a non-transient error.
    pub fn run<F>(&self, mut send: F) -> Result<SendReport>
    where
        F: FnMut() -> io::Result<()>,
    {
        let mut report = SendReport::default();

        loop {
            let err = match send() {
                Ok(()) => {
                    report.record(None);
                    return Ok(report);
                }
                Err(err) => err,
            };

            let kind = SendErrorKind::classify(&err);
            report.record(Some(kind));

            match kind {
                SendErrorKind::WouldBlock => {
                    if report.would_block >= self.max_attempts {
                        tracing::warn!(
                            attempts = report.attempts,
                            would_block = report.would_block,
                            "netlink send still blocked, giving up"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: report.attempts,
                        });
                    }
                    tracing::trace!(would_block = report.would_block, "send would block");
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
                SendErrorKind::Interrupted => {}
                SendErrorKind::Other => {
                    tracing::debug!(error = %err, attempts = report.attempts, "netlink send failed");
                    return Err(Error::Send(err));
                }
            }
        }
    }
}

#[cfg(feature = "serde")]
mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}
