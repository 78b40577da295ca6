//! # Queue Delivery Outcome Module
//!
//! Describes the result of handing a correlated event to the worker pool's
//! dispatch step and, on failure, the bookkeeping needed to decide whether
//! the event should be moved to the dead letter queue.
//!
//! This module intentionally holds no delivery loop of its own — the worker
//! pool in `hookrelay-service` drives delivery and calls into
//! [`crate::dlq_storage`] directly when an event exhausts its retries. This
//! module exists to give that call site a single, well-typed outcome and a
//! shared retry/DLQ configuration to read from.

use crate::dlq_storage::DlqStorageService;
use crate::retry::RetryPolicy;
use hookrelay_core::EventId;
use std::sync::Arc;

/// Shared configuration for the retry and dead-letter behavior applied to a
/// single event's delivery attempt(s).
#[derive(Clone)]
pub struct QueueDeliveryConfig {
    /// Backoff policy applied between delivery attempts.
    pub retry_policy: RetryPolicy,

    /// Whether events that exhaust retries should be persisted to the DLQ.
    pub enable_dlq: bool,

    /// DLQ storage backend; `None` disables persistence even if
    /// `enable_dlq` is set, matching [`crate::dlq_storage::persist_to_dlq`]'s
    /// graceful degradation.
    pub dlq_service: Option<Arc<DlqStorageService>>,
}

impl Default for QueueDeliveryConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            enable_dlq: true,
            dlq_service: None,
        }
    }
}

impl QueueDeliveryConfig {
    /// Attach a DLQ storage backend to this configuration.
    pub fn with_dlq_service(mut self, dlq_service: Arc<DlqStorageService>) -> Self {
        self.dlq_service = Some(dlq_service);
        self
    }
}

/// Outcome of attempting to deliver one event to its target queue(s).
#[derive(Debug, Clone, PartialEq)]
pub enum QueueDeliveryOutcome {
    /// Every target queue accepted the event.
    AllQueuesSucceeded {
        event_id: EventId,
        successful_count: usize,
    },

    /// The event matched no routing rule; nothing needed delivering.
    NoTargetQueues { event_id: EventId },

    /// Some but not all target queues accepted the event.
    SomeQueuesFailed {
        event_id: EventId,
        successful_count: usize,
        failed_count: usize,
        persisted_to_dlq: bool,
    },

    /// No target queue accepted the event.
    CompleteFailure {
        event_id: EventId,
        error: String,
        persisted_to_dlq: bool,
    },
}

impl QueueDeliveryOutcome {
    /// `true` if nothing was lost: every targeted queue (if any) succeeded.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::AllQueuesSucceeded { .. } | Self::NoTargetQueues { .. }
        )
    }

    /// `true` if at least one target queue failed to accept the event.
    pub fn has_failures(&self) -> bool {
        matches!(
            self,
            Self::SomeQueuesFailed { .. } | Self::CompleteFailure { .. }
        )
    }
}

#[cfg(test)]
#[path = "queue_delivery_tests.rs"]
mod tests;
