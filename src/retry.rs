//! Retry classification and exponential backoff
//!
//! The streamer waits on a source that has not produced its bytes yet. This
//! module supplies the delay sequence it sleeps through between attempts and
//! decides which read errors count as "try again" rather than "give up".
//!
//! # Example
//!
//! ```
//! use usenet_file_server::config::RetryConfig;
//! use usenet_file_server::retry::Backoff;
//! use std::time::Duration;
//!
//! let mut backoff = Backoff::new(&RetryConfig::default());
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(150));
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (interrupted reads, a descriptor that would block) should return `true`.
/// Permanent failures (missing file, corrupt archive, bad range) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
        )
    }
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // I/O errors can be retryable in some cases
            Error::Io(e) => e.is_retryable(),
            // A range past the end stays past the end
            Error::RangeNotSatisfiable { .. } => false,
            // Already the result of exhausted retries
            Error::SourceUnavailable { .. } => false,
            // Corrupt or unsupported archives are reported, not retried
            Error::Archive(_) => false,
            Error::InvalidReference(_) => false,
            Error::NotFound(_) => false,
            Error::Config { .. } => false,
            Error::ApiServerError(_) => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Exponential backoff delay sequence
///
/// Starts at `initial_delay`, multiplies by `backoff_multiplier` per step and
/// never exceeds `max_delay` (before jitter).
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Create a backoff sequence from retry settings
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_delay.min(config.max_delay),
            initial: config.initial_delay,
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Return the delay to wait now and advance the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        // Saturate at the cap when the product leaves Duration's range
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = next.min(self.max);

        if self.jitter {
            add_jitter(delay)
        } else {
            delay
        }
    }

    /// Start over from the initial delay (after the source produced data again)
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
pub(crate) fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(delay)
}
