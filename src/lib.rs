//! # record-sweep
//!
//! Bulk, quota-aware lookups against a remote record-search API, spread over
//! a rotating pool of outbound proxies.
//!
//! Each subject is handled by a [`RetryCoordinator`] that borrows a proxy from
//! the shared [`ProxyPool`], runs one [`LookupExecutor`] attempt through it and
//! decides whether to retry, evict the proxy, or give up. Results are merged
//! into a shared [`ResultAccumulator`] and periodically written out by a
//! [`CheckpointWriter`]. The [`Orchestrator`] ties it all together.
//!
//! ## Quick Start
//!
//! ```no_run
//! use record_sweep::{Config, HttpExecutor, Orchestrator, ProxyPool, ProxyValidator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     let candidates = record_sweep::input::load_proxies("proxies.txt")?;
//!     let usable = ProxyValidator::new(&config.proxy).validate_all(&candidates).await?;
//!     let pool = Arc::new(ProxyPool::new(
//!         usable,
//!         config.proxy.quota_per_window,
//!         config.proxy.window,
//!     ));
//!
//!     let executor = Arc::new(HttpExecutor::new(&config.api));
//!     let subjects = record_sweep::input::load_subjects("subjects.csv")?;
//!
//!     let orchestrator = Orchestrator::new(config, pool, executor).await?;
//!     let summary = orchestrator.run(subjects).await?;
//!     println!("{} records written", summary.records);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Shared result set
pub mod accumulator;
/// Atomic result persistence
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Per-subject retry state machine
pub mod coordinator;
/// Error types
pub mod error;
/// Single lookup attempts
pub mod executor;
/// Subject and proxy list loading
pub mod input;
/// Run orchestration
pub mod orchestrator;
/// Proxy pool and validation
pub mod proxy;
/// Retry decisions and delays
pub mod retry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use accumulator::ResultAccumulator;
pub use checkpoint::CheckpointWriter;
pub use config::Config;
pub use coordinator::RetryCoordinator;
pub use error::{Error, Result};
pub use executor::{HttpExecutor, LookupExecutor};
pub use orchestrator::Orchestrator;
pub use proxy::{Lease, ProxyPool, ProxyValidator};
pub use types::{
    Classification, Event, ResultRecord, RunSummary, Subject, SubjectId, SubjectOutcome,
};
