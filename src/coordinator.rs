//! Per-subject retry state machine.
//!
//! ```text
//! Acquiring ──none──▶ (backoff) ──▶ Acquiring
//!     │
//!   lease
//!     ▼
//! Attempting ──success──────────▶ Success
//!     │──429 / 5xx──▶ (delay) ──▶ Acquiring
//!     │──transport──▶ (evict) ──▶ Acquiring
//!     └──other 4xx──────────────▶ Rejected
//! ```
//!
//! Every pass through `Acquiring` that does not end in success costs one
//! attempt; once `max_retries` attempts are spent the subject is `Exhausted`.

use crate::executor::LookupExecutor;
use crate::proxy::{Lease, ProxyPool};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{Classification, Event, Subject, SubjectOutcome};
use std::sync::Arc;

enum State {
    Acquiring,
    Attempting(Lease),
}

/// Drives lookups for one subject at a time; cheap to clone per worker
#[derive(Clone)]
pub struct RetryCoordinator {
    pool: Arc<ProxyPool>,
    executor: Arc<dyn LookupExecutor>,
    policy: RetryPolicy,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl RetryCoordinator {
    /// Create a coordinator sharing `pool` and `executor` with other workers
    pub fn new(
        pool: Arc<ProxyPool>,
        executor: Arc<dyn LookupExecutor>,
        policy: RetryPolicy,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            pool,
            executor,
            policy,
            event_tx,
        }
    }

    /// Run the retry loop for `subject` until it succeeds, is rejected, or runs out of attempts
    pub async fn run(&self, subject: &Subject) -> SubjectOutcome {
        let max_retries = self.policy.max_retries();
        let mut attempts: u32 = 0;
        let mut state = State::Acquiring;

        loop {
            state = match state {
                State::Acquiring => {
                    if attempts >= max_retries {
                        return self.exhausted(subject, attempts);
                    }

                    match self.pool.acquire().await {
                        Some(lease) => State::Attempting(lease),
                        None => {
                            attempts += 1;
                            tracing::debug!(
                                subject_id = %subject.id,
                                attempt = attempts,
                                "no proxy under quota, backing off"
                            );
                            self.emit(Event::PoolUnavailable {
                                subject_id: subject.id.clone(),
                            });
                            self.emit_failed(subject, attempts, None, "pool_unavailable");

                            if attempts < max_retries {
                                tokio::time::sleep(self.policy.unavailable_backoff()).await;
                            }
                            State::Acquiring
                        }
                    }
                }

                State::Attempting(lease) => {
                    attempts += 1;
                    let classification = self.executor.execute(subject, lease.address()).await;

                    match self.policy.decide(&classification) {
                        RetryDecision::Done => {
                            let records = match classification {
                                Classification::Success(records) => records,
                                _ => Vec::new(),
                            };
                            tracing::debug!(
                                subject_id = %subject.id,
                                proxy = %lease.address(),
                                records = records.len(),
                                attempts,
                                "lookup succeeded"
                            );
                            self.emit(Event::SubjectCompleted {
                                subject_id: subject.id.clone(),
                                records: records.len(),
                                attempts,
                            });
                            return SubjectOutcome::Success { records, attempts };
                        }

                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                subject_id = %subject.id,
                                proxy = %lease.address(),
                                attempt = attempts,
                                max_retries,
                                outcome = %classification,
                                delay_ms = delay.as_millis() as u64,
                                "lookup failed, retrying"
                            );
                            self.emit_failed(
                                subject,
                                attempts,
                                Some(lease.address()),
                                classification.kind(),
                            );

                            if attempts < max_retries {
                                tokio::time::sleep(delay).await;
                            }
                            State::Acquiring
                        }

                        RetryDecision::EvictAndRetry => {
                            // The request never completed, so it must not count against quota
                            self.pool.release(&lease).await;
                            let removed = self.pool.evict(lease.address()).await;
                            let remaining = self.pool.len().await;

                            tracing::warn!(
                                subject_id = %subject.id,
                                proxy = %lease.address(),
                                attempt = attempts,
                                outcome = %classification,
                                remaining,
                                "proxy connection failed, evicting"
                            );
                            self.emit_failed(
                                subject,
                                attempts,
                                Some(lease.address()),
                                classification.kind(),
                            );
                            if removed {
                                self.executor.forget_endpoint(lease.address()).await;
                                self.emit(Event::ProxyEvicted {
                                    address: lease.address().to_string(),
                                    remaining,
                                });
                            }
                            State::Acquiring
                        }

                        RetryDecision::GiveUp => {
                            let status = match classification {
                                Classification::ClientError(status) => status,
                                _ => 0,
                            };
                            tracing::warn!(
                                subject_id = %subject.id,
                                proxy = %lease.address(),
                                status,
                                "lookup rejected, not retrying"
                            );
                            self.emit(Event::SubjectRejected {
                                subject_id: subject.id.clone(),
                                status,
                            });
                            return SubjectOutcome::Rejected { status, attempts };
                        }
                    }
                }
            };
        }
    }

    fn exhausted(&self, subject: &Subject, attempts: u32) -> SubjectOutcome {
        tracing::warn!(
            subject_id = %subject.id,
            name = %subject.full_name(),
            attempts,
            "retry budget exhausted, no records for subject"
        );
        self.emit(Event::SubjectExhausted {
            subject_id: subject.id.clone(),
            attempts,
        });
        SubjectOutcome::Exhausted { attempts }
    }

    fn emit_failed(&self, subject: &Subject, attempt: u32, proxy: Option<&str>, reason: &str) {
        self.emit(Event::AttemptFailed {
            subject_id: subject.id.clone(),
            attempt,
            proxy: proxy.map(str::to_string),
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
