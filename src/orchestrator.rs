//! Run orchestration: worker pool, pacing, draining and checkpoints.

use crate::accumulator::ResultAccumulator;
use crate::checkpoint::CheckpointWriter;
use crate::config::Config;
use crate::coordinator::RetryCoordinator;
use crate::error::{Error, Result};
use crate::executor::LookupExecutor;
use crate::proxy::ProxyPool;
use crate::retry::RetryPolicy;
use crate::types::{Event, RunSummary, Subject, SubjectOutcome};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinError, JoinSet};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What a finished worker task reports back
#[derive(Debug)]
enum Completion {
    Succeeded,
    Exhausted,
    Rejected,
}

/// Owns one sweep over a list of subjects
pub struct Orchestrator {
    config: Arc<Config>,
    pool: Arc<ProxyPool>,
    executor: Arc<dyn LookupExecutor>,
    accumulator: ResultAccumulator,
    checkpoint: Arc<CheckpointWriter>,
    event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator over an already validated proxy pool
    ///
    /// Fails if the configuration is invalid or the pool is empty.
    pub async fn new(
        config: Config,
        pool: Arc<ProxyPool>,
        executor: Arc<dyn LookupExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        if pool.is_empty().await {
            return Err(Error::NoProxies);
        }

        let accumulator = ResultAccumulator::new();
        let checkpoint = Arc::new(CheckpointWriter::new(
            config.checkpoint.output_path.clone(),
            config.checkpoint.interval,
            accumulator.clone(),
        ));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            pool,
            executor,
            accumulator,
            checkpoint,
            event_tx,
        })
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The shared proxy pool
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// The shared result set
    pub fn accumulator(&self) -> &ResultAccumulator {
        &self.accumulator
    }

    /// Look up every subject and write the final result file
    ///
    /// Individual subject failures never abort the run; only a failed final
    /// write does.
    pub async fn run(&self, subjects: Vec<Subject>) -> Result<RunSummary> {
        let dispatch = &self.config.dispatch;
        let total = subjects.len();
        let mut summary = RunSummary {
            subjects: total,
            ..Default::default()
        };

        tracing::info!(
            subjects = total,
            workers = dispatch.workers,
            output = %self.checkpoint.path().display(),
            "starting sweep"
        );

        let workers = Arc::new(Semaphore::new(dispatch.workers));
        let coordinator = RetryCoordinator::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.executor),
            RetryPolicy::new(self.config.retry.clone()),
            self.event_tx.clone(),
        );
        let mut in_flight: JoinSet<Completion> = JoinSet::new();

        for (index, subject) in subjects.into_iter().enumerate() {
            // Wait for a free worker, checkpointing while we wait
            let permit = loop {
                tokio::select! {
                    permit = Arc::clone(&workers).acquire_owned() => {
                        break permit.map_err(|_| Error::Other("worker pool closed".to_string()))?;
                    }
                    _ = tokio::time::sleep(dispatch.drain_interval) => {
                        self.drain_finished(&mut in_flight, &mut summary);
                        self.checkpoint_if_due().await;
                    }
                }
            };

            let coordinator = coordinator.clone();
            let accumulator = self.accumulator.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let outcome = coordinator.run(&subject).await;
                let completion = match &outcome {
                    SubjectOutcome::Success { .. } => Completion::Succeeded,
                    SubjectOutcome::Exhausted { .. } => Completion::Exhausted,
                    SubjectOutcome::Rejected { .. } => Completion::Rejected,
                };
                accumulator.absorb(&subject, outcome.into_records()).await;
                completion
            });

            if index + 1 < total && !dispatch.submit_pacing.is_zero() {
                tokio::time::sleep(dispatch.submit_pacing).await;
            }

            self.drain_finished(&mut in_flight, &mut summary);
            self.checkpoint_if_due().await;
        }

        tracing::debug!(in_flight = in_flight.len(), "all subjects submitted, draining");

        let mut tick = tokio::time::interval(dispatch.drain_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while !in_flight.is_empty() {
            tokio::select! {
                Some(joined) = in_flight.join_next() => {
                    Self::record(joined, &mut summary);
                }
                _ = tick.tick() => {
                    self.checkpoint_if_due().await;
                }
            }
        }

        let records = self.checkpoint.final_checkpoint().await?;
        self.event_tx
            .send(Event::CheckpointWritten {
                path: self.checkpoint.path().to_path_buf(),
                records,
            })
            .ok();

        summary.records = records;
        summary.checkpoints = self.checkpoint.writes();

        let proxies_left = self.pool.len().await;
        tracing::info!(
            subjects = summary.subjects,
            succeeded = summary.succeeded,
            exhausted = summary.exhausted,
            rejected = summary.rejected,
            records = summary.records,
            proxies_left,
            "sweep finished"
        );
        Ok(summary)
    }

    fn drain_finished(&self, in_flight: &mut JoinSet<Completion>, summary: &mut RunSummary) {
        while let Some(joined) = in_flight.try_join_next() {
            Self::record(joined, summary);
        }
    }

    fn record(joined: std::result::Result<Completion, JoinError>, summary: &mut RunSummary) {
        match joined {
            Ok(Completion::Succeeded) => summary.succeeded += 1,
            Ok(Completion::Exhausted) => summary.exhausted += 1,
            Ok(Completion::Rejected) => summary.rejected += 1,
            Err(e) => {
                tracing::error!(error = %e, "worker task failed, subject yields no records");
                summary.exhausted += 1;
            }
        }
    }

    /// Periodic checkpoint; a failed write is logged and retried on the next tick
    async fn checkpoint_if_due(&self) {
        match self.checkpoint.maybe_checkpoint(Instant::now()).await {
            Ok(Some(records)) => {
                self.event_tx
                    .send(Event::CheckpointWritten {
                        path: self.checkpoint.path().to_path_buf(),
                        records,
                    })
                    .ok();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    path = %self.checkpoint.path().display(),
                    error = %e,
                    "periodic checkpoint failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.config.dispatch.workers)
            .field("output", &self.checkpoint.path())
            .finish_non_exhaustive()
    }
}
