//! Worker pool: drains the priority queue, correlates each event into its
//! workflow, dispatches it to the AgentAPI, and feeds the outcome back into
//! both the durable event store and the queue's retry/dead-letter machinery.
//!
//! A fixed number of workers poll [`PriorityQueue::claim_next`] concurrently.
//! Each claimed entry is looked up in the [`EventStore`], correlated, and
//! dispatched; failures are classified through [`DispatcherError::is_retryable`]
//! and turned into either a rescheduled retry (with the floor the error type
//! imposes) or a dead-letter, mirroring the exponential-backoff-with-jitter
//! policy [`RetryPolicy`] already implements for other delivery paths.

use crate::retry::RetryPolicy;
use hookrelay_core::correlation::CorrelationEngine;
use hookrelay_core::dispatch::Dispatcher;
use hookrelay_core::store::{EventStatus, EventStore};
use hookrelay_queue::message::Timestamp as QueueTimestamp;
use hookrelay_queue::priority_queue::{EntryId, EntryStatus, PriorityQueue, QueueEventId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

/// Tunables for the worker pool, independent of the per-error retry policy.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers draining the queue.
    pub worker_count: usize,

    /// How long a worker sleeps after finding the queue empty before polling
    /// again.
    pub idle_poll_interval: Duration,

    /// Per-job timeout: a dispatch that runs longer than this is treated as
    /// a [`hookrelay_core::dispatch::AgentApiError::Timeout`] failure.
    pub job_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            idle_poll_interval: Duration::from_millis(250),
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// §4.7 retry policy: `max_retries`/`retry_base`/`retry_max`/`retry_multiplier`
/// come from `RETRY_BASE_MS`/`RETRY_MAX_MS`/`MAX_RETRIES`/`RETRY_MULTIPLIER`.
/// `RateLimited`/`Server5xx` errors additionally impose a 60s floor via
/// [`hookrelay_core::dispatch::AgentApiError::delay_floor`], applied on top
/// of whatever this policy computes. ±10% jitter throughout.
pub fn default_dispatch_retry_policy(
    max_retries: u32,
    retry_base: Duration,
    retry_max: Duration,
    retry_multiplier: f64,
) -> RetryPolicy {
    RetryPolicy::new(max_retries, retry_base, retry_max, retry_multiplier).with_jitter_percent(0.10)
}

/// Drains a [`PriorityQueue`], correlating and dispatching each claimed
/// event. Construct with [`WorkerPool::new`] and run with [`WorkerPool::spawn`].
pub struct WorkerPool {
    queue: Arc<PriorityQueue>,
    event_store: Arc<dyn EventStore>,
    correlation_engine: Arc<CorrelationEngine>,
    dispatcher: Arc<dyn Dispatcher>,
    retry_policy: RetryPolicy,
    config: WorkerPoolConfig,
    shutdown: Arc<AtomicBool>,
    idle_notify: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<PriorityQueue>,
        event_store: Arc<dyn EventStore>,
        correlation_engine: Arc<CorrelationEngine>,
        dispatcher: Arc<dyn Dispatcher>,
        retry_policy: RetryPolicy,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            event_store,
            correlation_engine,
            dispatcher,
            retry_policy,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            idle_notify: Arc::new(Notify::new()),
        }
    }

    /// Spawn `config.worker_count` background tasks, each running
    /// [`Self::run_worker`] until [`Self::shutdown`] is called.
    pub fn spawn(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|id| {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.run_worker(id).await })
            })
            .collect()
    }

    /// Signal every worker to stop claiming new entries and return once the
    /// in-flight dispatch (if any) has finished its current iteration. Callers
    /// should `.await` the handles returned by [`Self::spawn`] afterward to
    /// block until workers have actually drained their in-flight work.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.idle_notify.notify_waiters();
    }

    #[instrument(skip(self), fields(worker_id = worker_id))]
    async fn run_worker(&self, worker_id: usize) {
        info!("worker started");
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.queue.claim_next(QueueTimestamp::now()).await {
                Ok(Some(entry)) => {
                    self.process_entry(entry.entry_id.clone(), entry.event_id.clone(), entry.retry_count)
                        .await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                        _ = self.idle_notify.notified() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to claim next queue entry");
                    tokio::time::sleep(self.config.idle_poll_interval).await;
                }
            }
        }
        info!("worker stopped");
    }

    /// Process a single claimed entry end to end: load, correlate, dispatch,
    /// and resolve (complete, retry, or dead-letter).
    #[instrument(skip(self), fields(event_id = %event_id, entry_id = %entry_id))]
    async fn process_entry(&self, entry_id: EntryId, event_id: QueueEventId, retry_count: u16) {
        let delivery_id = match hookrelay_core::DeliveryId::new(event_id.as_str().to_string()) {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "queue entry has an invalid delivery id; dead-lettering");
                self.dead_letter(&entry_id, format!("invalid delivery id: {e}")).await;
                return;
            }
        };

        let record = match self.event_store.get(&delivery_id).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "event record missing for queued entry");
                self.fail_entry(&entry_id, &delivery_id, retry_count, format!("event lookup failed: {e}"), None)
                    .await;
                return;
            }
        };

        if let Err(e) = self
            .event_store
            .update_status(&delivery_id, EventStatus::Processing, None, None)
            .await
        {
            debug!(error = %e, "could not mark event processing (may already be terminal)");
        }

        let correlation = match tokio::time::timeout(self.config.job_timeout, self.correlation_engine.correlate(&record.envelope)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(error = %e, "correlation failed");
                self.fail_entry(&entry_id, &delivery_id, retry_count, format!("correlation failed: {e}"), None)
                    .await;
                return;
            }
            Err(_) => {
                warn!("correlation timed out");
                self.fail_entry(&entry_id, &delivery_id, retry_count, "correlation timed out".to_string(), None)
                    .await;
                return;
            }
        };

        let dispatch_result = tokio::time::timeout(
            self.config.job_timeout,
            self.dispatcher.dispatch(&record.envelope, correlation.workflow.as_ref()),
        )
        .await;

        match dispatch_result {
            Ok(Ok(outcome)) => {
                debug!(?outcome, "dispatch succeeded");
                if let Err(e) = self
                    .event_store
                    .update_status(&delivery_id, EventStatus::Processed, None, None)
                    .await
                {
                    warn!(error = %e, "could not mark event processed");
                }
                if let Err(e) = self.queue.complete(&entry_id, QueueTimestamp::now()).await {
                    warn!(error = %e, "could not mark queue entry completed");
                }
            }
            Ok(Err(dispatcher_error)) => {
                let floor = match &dispatcher_error {
                    hookrelay_core::dispatch::DispatcherError::AgentApi(e) => e.delay_floor(),
                    hookrelay_core::dispatch::DispatcherError::CircuitOpen => {
                        Some(Duration::from_secs(60))
                    }
                };
                if dispatcher_error.is_retryable() {
                    self.fail_entry(
                        &entry_id,
                        &delivery_id,
                        retry_count,
                        dispatcher_error.to_string(),
                        floor,
                    )
                    .await;
                } else {
                    error!(error = %dispatcher_error, "non-retryable dispatch failure; dead-lettering");
                    if let Err(e) = self
                        .event_store
                        .update_status(
                            &delivery_id,
                            EventStatus::Failed,
                            Some(retry_count),
                            Some(dispatcher_error.to_string()),
                        )
                        .await
                    {
                        warn!(error = %e, "could not mark event failed");
                    }
                    self.dead_letter(&entry_id, dispatcher_error.to_string()).await;
                }
            }
            Err(_) => {
                warn!("dispatch timed out");
                self.fail_entry(
                    &entry_id,
                    &delivery_id,
                    retry_count,
                    "dispatch timed out".to_string(),
                    None,
                )
                .await;
            }
        }
    }

    /// Reschedule or dead-letter a failed entry per the §4.7 retry table:
    /// the computed backoff delay is raised to any floor the error imposes
    /// (e.g. the 60s minimum for rate-limited/server errors).
    async fn fail_entry(
        &self,
        entry_id: &EntryId,
        delivery_id: &hookrelay_core::DeliveryId,
        retry_count: u16,
        error_message: String,
        floor: Option<Duration>,
    ) {
        let mut delay = self.retry_policy.calculate_delay(retry_count as u32);
        if let Some(floor) = floor {
            delay = delay.max(floor);
        }

        match self.queue.fail(entry_id, error_message.clone(), delay, QueueTimestamp::now()).await {
            Ok(EntryStatus::Dead) => {
                error!(error = %error_message, "entry exhausted retries; moved to dead letter");
                if let Err(e) = self
                    .event_store
                    .update_status(delivery_id, EventStatus::Failed, Some(retry_count), Some(error_message))
                    .await
                {
                    warn!(error = %e, "could not mark event failed after dead-lettering");
                }
            }
            Ok(_) => {
                if let Err(e) = self
                    .event_store
                    .update_status(
                        delivery_id,
                        EventStatus::Failed,
                        Some(retry_count + 1),
                        Some(error_message),
                    )
                    .await
                {
                    warn!(error = %e, "could not record retry attempt on event");
                }
            }
            Err(e) => {
                error!(error = %e, "failed to record retry/dead-letter transition on queue entry");
            }
        }
        self.idle_notify.notify_one();
    }

    async fn dead_letter(&self, entry_id: &EntryId, error_message: String) {
        if let Err(e) = self
            .queue
            .dead_letter(entry_id, error_message, QueueTimestamp::now())
            .await
        {
            error!(error = %e, "failed to dead-letter queue entry");
        }
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
