//! Retry policy for lookup attempts
//!
//! Maps each [`Classification`] onto a [`RetryDecision`] with its own named
//! delay, optionally jittered to keep workers from retrying in lockstep.
//!
//! # Example
//!
//! ```
//! use record_sweep::config::RetryConfig;
//! use record_sweep::retry::{RetryDecision, RetryPolicy};
//! use record_sweep::types::Classification;
//!
//! let policy = RetryPolicy::new(RetryConfig::default());
//! assert_eq!(
//!     policy.decide(&Classification::ClientError(404)),
//!     RetryDecision::GiveUp
//! );
//! ```

use crate::config::RetryConfig;
use crate::types::Classification;
use rand::Rng;
use std::time::Duration;

/// What the coordinator should do after one attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop; the attempt succeeded
    Done,
    /// Keep the proxy, wait, then try again
    RetryAfter(Duration),
    /// Drop the proxy from the pool and try again immediately
    EvictAndRetry,
    /// Stop; the failure is permanent
    GiveUp,
}

/// Named delays and the attempt budget for one subject
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum attempts per subject
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decide how to continue after `classification`
    pub fn decide(&self, classification: &Classification) -> RetryDecision {
        match classification {
            Classification::Success(_) => RetryDecision::Done,
            Classification::RateLimited => {
                RetryDecision::RetryAfter(self.jittered(self.config.rate_limit_delay))
            }
            Classification::ServerError(_) => {
                RetryDecision::RetryAfter(self.jittered(self.config.server_error_delay))
            }
            Classification::ConnectionFailure(_) => RetryDecision::EvictAndRetry,
            Classification::ClientError(_) => RetryDecision::GiveUp,
        }
    }

    /// Delay before asking an exhausted pool for a proxy again
    pub fn unavailable_backoff(&self) -> Duration {
        self.jittered(self.config.unavailable_backoff)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
