//! # Queue Runtime
//!
//! In-process priority queue for reliable webhook event processing, backed by
//! a durable mirror table for crash recovery. This is not a client to an
//! external message broker: events never leave the process between being
//! enqueued and being claimed by a worker.
//!
//! This library provides:
//! - Priority (desc) / scheduled-time (asc) / entry-id (asc) ordering
//! - A bounded queue with `QueueFull` back-pressure
//! - Durable mirroring and crash-recovery reload of in-flight entries
//! - Retry scheduling with exponential backoff
//!
//! ## Module Organization
//!
//! - [priority_queue] - The queue itself, its entry store trait, and adapters

// Module declarations
pub mod message;
pub mod priority_queue;

// Re-export commonly used types at crate root for convenience
pub use message::Timestamp;
pub use priority_queue::{
    EntryId, EntryStatus, FilesystemQueueEntryStore, InMemoryQueueEntryStore, PriorityQueue,
    QueueEntry, QueueEntryError, QueueEntryStore, QueueEventId,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
