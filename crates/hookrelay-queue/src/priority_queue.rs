//! Bounded, priority-ordered, durably-mirrored job queue.
//!
//! This is an in-process ordering structure, not a client to an external
//! message broker: every state transition is written through to a
//! [`QueueEntryStore`] before taking any external effect, so a crash between
//! "claimed" and "completed" is always recoverable on restart.

use crate::message::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use ulid::Ulid;

/// Internal identifier for a queue entry, distinct from the event it wraps.
/// ULID-based so ties in `(priority, scheduled_at)` break deterministically
/// on creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Identifier of the event a queue entry wraps. Kept as an opaque string
/// rather than reusing `hookrelay_core::EventId` directly, since this crate
/// has no dependency on `hookrelay-core` — callers convert at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEventId(String);

impl QueueEventId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

/// A single unit of work awaiting dispatch, mirrored to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_id: EntryId,
    pub event_id: QueueEventId,
    /// 1-10, higher served first.
    pub priority: u8,
    pub scheduled_at: Timestamp,
    pub status: EntryStatus,
    pub retry_count: u16,
    pub max_retries: u16,
    pub last_error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl QueueEntry {
    pub fn new(event_id: QueueEventId, priority: u8, scheduled_at: Timestamp, max_retries: u16) -> Self {
        Self {
            entry_id: EntryId::new(),
            event_id,
            priority: priority.clamp(1, 10),
            scheduled_at,
            status: EntryStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Dequeue ordering key: higher priority first, then earlier
    /// `scheduled_at`, then the ULID `entry_id` as a stable tie-break.
    fn order_key(&self) -> (std::cmp::Reverse<u8>, &Timestamp, &EntryId) {
        (std::cmp::Reverse(self.priority), &self.scheduled_at, &self.entry_id)
    }
}

#[derive(Debug, Error, Clone)]
pub enum QueueEntryError {
    #[error("queue is full (max {max})")]
    QueueFull { max: usize },

    #[error("an entry for event {event_id} is already pending or processing")]
    AlreadyQueued { event_id: QueueEventId },

    #[error("entry {entry_id} not found")]
    NotFound { entry_id: EntryId },

    #[error("entry {entry_id} is in status {status:?}, expected {expected:?}")]
    InvalidTransition {
        entry_id: EntryId,
        status: EntryStatus,
        expected: EntryStatus,
    },

    #[error("durable store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("serialization failure: {message}")]
    Serialization { message: String },

    #[error("io failure: {message}")]
    Io { message: String },
}

impl QueueEntryError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::StoreUnavailable { .. } | Self::Io { .. }
        )
    }
}

/// Durable mirror for queue entries. Every enqueue and status transition is
/// written through here before the in-memory ordering structure is updated,
/// so [`PriorityQueue::recover`] can rebuild in-memory state after a crash.
#[async_trait]
pub trait QueueEntryStore: Send + Sync {
    async fn put(&self, entry: &QueueEntry) -> Result<(), QueueEntryError>;

    async fn get(&self, entry_id: &EntryId) -> Result<Option<QueueEntry>, QueueEntryError>;

    /// All entries with `status ∈ {pending, processing}`, for startup recovery.
    async fn load_recoverable(&self) -> Result<Vec<QueueEntry>, QueueEntryError>;

    /// Remove terminal (`completed`/`dead`) entries whose `completed_at`
    /// predates `cutoff`. Returns the number of entries removed.
    async fn prune(&self, cutoff: Timestamp) -> Result<Vec<EntryId>, QueueEntryError>;
}

/// In-memory [`QueueEntryStore`], for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryQueueEntryStore {
    entries: RwLock<HashMap<EntryId, QueueEntry>>,
}

impl InMemoryQueueEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueEntryStore for InMemoryQueueEntryStore {
    async fn put(&self, entry: &QueueEntry) -> Result<(), QueueEntryError> {
        let mut entries = self.entries.write().map_err(|_| QueueEntryError::StoreUnavailable {
            message: "in-memory queue entry store lock poisoned".to_string(),
        })?;
        entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, entry_id: &EntryId) -> Result<Option<QueueEntry>, QueueEntryError> {
        let entries = self.entries.read().map_err(|_| QueueEntryError::StoreUnavailable {
            message: "in-memory queue entry store lock poisoned".to_string(),
        })?;
        Ok(entries.get(entry_id).cloned())
    }

    async fn load_recoverable(&self) -> Result<Vec<QueueEntry>, QueueEntryError> {
        let entries = self.entries.read().map_err(|_| QueueEntryError::StoreUnavailable {
            message: "in-memory queue entry store lock poisoned".to_string(),
        })?;
        Ok(entries
            .values()
            .filter(|e| matches!(e.status, EntryStatus::Pending | EntryStatus::Processing))
            .cloned()
            .collect())
    }

    async fn prune(&self, cutoff: Timestamp) -> Result<Vec<EntryId>, QueueEntryError> {
        let mut entries = self.entries.write().map_err(|_| QueueEntryError::StoreUnavailable {
            message: "in-memory queue entry store lock poisoned".to_string(),
        })?;
        let stale: Vec<EntryId> = entries
            .values()
            .filter(|e| is_stale_terminal(e, &cutoff))
            .map(|e| e.entry_id.clone())
            .collect();
        for id in &stale {
            entries.remove(id);
        }
        Ok(stale)
    }
}

fn is_stale_terminal(entry: &QueueEntry, cutoff: &Timestamp) -> bool {
    matches!(entry.status, EntryStatus::Completed | EntryStatus::Dead)
        && entry.completed_at.as_ref().is_some_and(|t| t < cutoff)
}

/// Filesystem-backed [`QueueEntryStore`]: one JSON file per entry, written
/// via write-to-temp-then-rename, mirroring
/// `hookrelay_core::store::FilesystemEventStore`'s durability discipline.
pub struct FilesystemQueueEntryStore {
    root: std::path::PathBuf,
}

impl FilesystemQueueEntryStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, entry_id: &EntryId) -> std::path::PathBuf {
        self.root.join(format!("{}.json", entry_id.as_str()))
    }
}

#[async_trait]
impl QueueEntryStore for FilesystemQueueEntryStore {
    async fn put(&self, entry: &QueueEntry) -> Result<(), QueueEntryError> {
        let path = self.path_for(&entry.entry_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(entry).map_err(|e| QueueEntryError::Serialization {
            message: e.to_string(),
        })?;
        std::fs::write(&tmp_path, json).map_err(|e| QueueEntryError::Io {
            message: e.to_string(),
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| QueueEntryError::Io {
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn get(&self, entry_id: &EntryId) -> Result<Option<QueueEntry>, QueueEntryError> {
        let path = self.path_for(entry_id);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let entry = serde_json::from_slice(&bytes).map_err(|e| QueueEntryError::Serialization {
                    message: e.to_string(),
                })?;
                Ok(Some(entry))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QueueEntryError::Io {
                message: e.to_string(),
            }),
        }
    }

    async fn load_recoverable(&self) -> Result<Vec<QueueEntry>, QueueEntryError> {
        let mut out = Vec::new();
        let dir = std::fs::read_dir(&self.root).map_err(|e| QueueEntryError::Io {
            message: e.to_string(),
        })?;
        for entry in dir {
            let entry = entry.map_err(|e| QueueEntryError::Io {
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| QueueEntryError::Io {
                message: e.to_string(),
            })?;
            let queue_entry: QueueEntry =
                serde_json::from_slice(&bytes).map_err(|e| QueueEntryError::Serialization {
                    message: e.to_string(),
                })?;
            if matches!(queue_entry.status, EntryStatus::Pending | EntryStatus::Processing) {
                out.push(queue_entry);
            }
        }
        Ok(out)
    }

    async fn prune(&self, cutoff: Timestamp) -> Result<Vec<EntryId>, QueueEntryError> {
        let mut stale = Vec::new();
        let dir = std::fs::read_dir(&self.root).map_err(|e| QueueEntryError::Io {
            message: e.to_string(),
        })?;
        for entry in dir {
            let entry = entry.map_err(|e| QueueEntryError::Io {
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| QueueEntryError::Io {
                message: e.to_string(),
            })?;
            let queue_entry: QueueEntry =
                serde_json::from_slice(&bytes).map_err(|e| QueueEntryError::Serialization {
                    message: e.to_string(),
                })?;
            if is_stale_terminal(&queue_entry, &cutoff) {
                std::fs::remove_file(&path).map_err(|e| QueueEntryError::Io {
                    message: e.to_string(),
                })?;
                stale.push(queue_entry.entry_id);
            }
        }
        Ok(stale)
    }
}

/// The in-process priority/scheduled-time ordering structure described in
/// §4.6, backed by a durable [`QueueEntryStore`] mirror.
pub struct PriorityQueue {
    store: Arc<dyn QueueEntryStore>,
    max_size: usize,
    entries: RwLock<HashMap<EntryId, QueueEntry>>,
    /// `event_id -> entry_id` for entries currently pending or processing,
    /// enforcing "at most one live entry per event" (§3 QueueEntry invariant).
    live_by_event: RwLock<HashMap<QueueEventId, EntryId>>,
}

impl PriorityQueue {
    pub fn new(store: Arc<dyn QueueEntryStore>, max_size: usize) -> Self {
        Self {
            store,
            max_size,
            entries: RwLock::new(HashMap::new()),
            live_by_event: RwLock::new(HashMap::new()),
        }
    }

    /// Load `pending`/`processing` entries from the store, resetting any
    /// stale `processing` entry (crashed mid-job) back to `pending` before
    /// admitting it. Must be called once at startup before any enqueue.
    pub async fn recover(&self) -> Result<usize, QueueEntryError> {
        let recoverable = self.store.load_recoverable().await?;
        let mut recovered = 0;
        for mut entry in recoverable {
            if entry.status == EntryStatus::Processing {
                entry.status = EntryStatus::Pending;
                entry.started_at = None;
                self.store.put(&entry).await?;
            }
            self.admit_in_memory(entry);
            recovered += 1;
        }
        Ok(recovered)
    }

    fn admit_in_memory(&self, entry: QueueEntry) {
        let mut live_by_event = self.live_by_event.write().unwrap();
        live_by_event.insert(entry.event_id.clone(), entry.entry_id.clone());
        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.entry_id.clone(), entry);
    }

    fn live_count(&self) -> usize {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| matches!(e.status, EntryStatus::Pending | EntryStatus::Processing))
            .count()
    }

    /// Admit a new entry. Writes through to the durable store before
    /// updating in-memory ordering state.
    pub async fn enqueue(
        &self,
        event_id: QueueEventId,
        priority: u8,
        scheduled_at: Timestamp,
        max_retries: u16,
    ) -> Result<QueueEntry, QueueEntryError> {
        {
            let live_by_event = self.live_by_event.read().unwrap();
            if live_by_event.contains_key(&event_id) {
                return Err(QueueEntryError::AlreadyQueued { event_id });
            }
        }
        if self.live_count() >= self.max_size {
            return Err(QueueEntryError::QueueFull { max: self.max_size });
        }

        let entry = QueueEntry::new(event_id, priority, scheduled_at, max_retries);
        self.store.put(&entry).await?;
        self.admit_in_memory(entry.clone());
        Ok(entry)
    }

    /// Selection rule (§4.6): among `pending` entries with
    /// `scheduled_at ≤ now`, pick the one with highest priority, earliest
    /// `scheduled_at`, lowest `entry_id` (stable tie-break). Atomically
    /// transitions it to `processing`.
    pub async fn claim_next(&self, now: Timestamp) -> Result<Option<QueueEntry>, QueueEntryError> {
        let candidate_id = {
            let entries = self.entries.read().unwrap();
            entries
                .values()
                .filter(|e| e.status == EntryStatus::Pending && e.scheduled_at <= now)
                .min_by(|a, b| a.order_key().cmp(&b.order_key()))
                .map(|e| e.entry_id.clone())
        };

        let Some(entry_id) = candidate_id else {
            return Ok(None);
        };

        let mut entry = {
            let entries = self.entries.read().unwrap();
            entries
                .get(&entry_id)
                .cloned()
                .ok_or(QueueEntryError::NotFound { entry_id: entry_id.clone() })?
        };

        if entry.status != EntryStatus::Pending {
            // Lost the race to another worker between the scan and the claim.
            return Ok(None);
        }

        entry.status = EntryStatus::Processing;
        entry.started_at = Some(now.clone());
        self.store.put(&entry).await?;

        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.entry_id.clone(), entry.clone());
        drop(entries);

        Ok(Some(entry))
    }

    /// Mark an entry `completed`, removing it from the live-event index.
    pub async fn complete(&self, entry_id: &EntryId, now: Timestamp) -> Result<(), QueueEntryError> {
        self.transition_terminal(entry_id, EntryStatus::Completed, now, None)
            .await
    }

    /// Apply the §4.7 retry/dead-letter decision for a failed job: either
    /// reschedule `pending` at `now + delay` with `retry_count` incremented,
    /// or move to `dead` if retries are exhausted.
    pub async fn fail(
        &self,
        entry_id: &EntryId,
        error: String,
        delay: std::time::Duration,
        now: Timestamp,
    ) -> Result<EntryStatus, QueueEntryError> {
        let mut entry = {
            let entries = self.entries.read().unwrap();
            entries
                .get(entry_id)
                .cloned()
                .ok_or_else(|| QueueEntryError::NotFound { entry_id: entry_id.clone() })?
        };

        entry.last_error = Some(error);

        if entry.retry_count + 1 <= entry.max_retries {
            entry.retry_count += 1;
            entry.status = EntryStatus::Pending;
            entry.scheduled_at = Timestamp::from_datetime(
                now.as_datetime() + chrono::Duration::from_std(delay).unwrap_or_default(),
            );
            entry.started_at = None;
            self.store.put(&entry).await?;
            let mut entries = self.entries.write().unwrap();
            entries.insert(entry.entry_id.clone(), entry);
            Ok(EntryStatus::Pending)
        } else {
            entry.status = EntryStatus::Dead;
            entry.completed_at = Some(now);
            self.store.put(&entry).await?;
            self.retire(entry);
            Ok(EntryStatus::Dead)
        }
    }

    /// Force an entry straight to `dead`, bypassing the retry-count check
    /// `fail` applies. Used for errors the worker pool has classified as
    /// non-retryable (§4.7), where no amount of remaining retry budget
    /// should cause another attempt.
    pub async fn dead_letter(&self, entry_id: &EntryId, error: String, now: Timestamp) -> Result<(), QueueEntryError> {
        self.transition_terminal(entry_id, EntryStatus::Dead, now, Some(error))
            .await
    }

    async fn transition_terminal(
        &self,
        entry_id: &EntryId,
        status: EntryStatus,
        now: Timestamp,
        error: Option<String>,
    ) -> Result<(), QueueEntryError> {
        let mut entry = {
            let entries = self.entries.read().unwrap();
            entries
                .get(entry_id)
                .cloned()
                .ok_or_else(|| QueueEntryError::NotFound { entry_id: entry_id.clone() })?
        };
        entry.status = status;
        entry.completed_at = Some(now);
        if error.is_some() {
            entry.last_error = error;
        }
        self.store.put(&entry).await?;
        self.retire(entry);
        Ok(())
    }

    fn retire(&self, entry: QueueEntry) {
        let mut live_by_event = self.live_by_event.write().unwrap();
        live_by_event.remove(&entry.event_id);
        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.entry_id.clone(), entry);
    }

    /// Drop completed/dead entries older than `cutoff` from both the durable
    /// store and the in-memory ordering map. `live_by_event` never holds a
    /// terminal entry (it's cleared in [`Self::retire`]), so pruning never
    /// touches it. Returns the number of entries removed.
    pub async fn prune(&self, cutoff: Timestamp) -> Result<usize, QueueEntryError> {
        let stale = self.store.prune(cutoff).await?;
        let mut entries = self.entries.write().unwrap();
        for id in &stale {
            entries.remove(id);
        }
        Ok(stale.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "priority_queue_tests.rs"]
mod tests;
