//! `EventStore`: durable append-only persistence for webhook events, plus
//! the [`Deduplicator`] that sits in front of it.
//!
//! Two adapters are provided, matching the in-memory/filesystem pairing used
//! throughout this crate (see [`crate::adapters`]): [`InMemoryEventStore`]
//! for tests and single-process deployments that don't need restart
//! durability, and [`FilesystemEventStore`] for a JSON-file-per-event
//! persisted store that can reload its index on startup.

use crate::webhook::{EventEntity, EventEnvelope};
use crate::{DeliveryId, EventId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Default soft-dedup window: provider retries and accidental re-sends of
/// the same logical event within this window are suppressed even when they
/// carry a new delivery ID.
pub const DEFAULT_DUP_WINDOW: Duration = Duration::from_secs(3600);

/// Default retry ceiling; exceeding it moves a queue entry to `dead`.
pub const MAX_RETRIES: u16 = 5;

// ============================================================================
// EventRecord
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Received,
    Processing,
    Processed,
    Failed,
    Duplicate,
}

/// Canonical, immutable-once-persisted event record. `id` is the
/// provider-assigned delivery identifier and is the store's primary key;
/// `event_id` is the ULID assigned during normalization, used for ordering
/// and cross-referencing with `QueueEntry`/`Workflow`.
///
/// `envelope` carries the full normalized event (repository, entity,
/// session/correlation IDs) so the worker pool can hand it straight to
/// `CorrelationEngine`/`Dispatcher` without re-deriving anything from the
/// raw payload. `provider`/`event_type`/`action`/`payload` are denormalized
/// copies of the same data, kept at the top level for the admin query API
/// and dedup/audit bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: DeliveryId,
    pub event_id: EventId,
    pub provider: String,
    pub event_type: String,
    pub action: Option<String>,
    pub received_at: Timestamp,
    pub payload: serde_json::Value,
    pub raw_bytes_hash: String,
    pub semantic_key: String,
    pub status: EventStatus,
    pub retry_count: u16,
    pub last_error: Option<String>,
    pub envelope: EventEnvelope,
}

impl EventRecord {
    /// Build a record from a freshly normalized envelope, computing the
    /// semantic dedup key from whatever identifying fields the payload
    /// carries (entity number, PR head SHA, sender login). The record's
    /// `id` (the hard dedup key) is taken from the envelope's own
    /// `delivery_id` — the provider-assigned delivery identifier — not
    /// re-derived by the caller.
    pub fn from_envelope(raw_bytes_hash: String, envelope: EventEnvelope) -> Self {
        let id = envelope.delivery_id.clone();
        let entity_number = match &envelope.entity {
            EventEntity::PullRequest { number } | EventEntity::Issue { number } => {
                Some(number.to_string())
            }
            EventEntity::Branch { name } => Some(name.clone()),
            EventEntity::Release { tag } => Some(tag.clone()),
            EventEntity::Repository | EventEntity::Unknown => None,
        };
        let head_sha = envelope
            .payload
            .pointer("/pull_request/head/sha")
            .and_then(|v| v.as_str())
            .map(String::from);
        let user = envelope
            .payload
            .pointer("/sender/login")
            .and_then(|v| v.as_str())
            .map(String::from);

        let semantic_key = compute_semantic_key(
            &envelope.event_type,
            envelope.action.as_deref(),
            &envelope.repository.full_name,
            entity_number.as_deref(),
            head_sha.as_deref(),
            user.as_deref(),
        );

        Self {
            id,
            event_id: envelope.event_id,
            provider: envelope.provider.clone(),
            event_type: envelope.event_type.clone(),
            action: envelope.action.clone(),
            received_at: Timestamp::now(),
            payload: envelope.payload.clone(),
            raw_bytes_hash,
            semantic_key,
            status: EventStatus::Received,
            retry_count: 0,
            last_error: None,
            envelope,
        }
    }
}

/// SHA-256 of the raw HTTP body, used for content-based soft dedup.
pub fn compute_raw_bytes_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Deterministic digest of `(type, action, repo, number, head_sha, user)`;
/// missing components are substituted with an empty string but positions are
/// preserved so the digest stays comparable across partially-populated
/// events.
pub fn compute_semantic_key(
    event_type: &str,
    action: Option<&str>,
    repository: &str,
    entity_number: Option<&str>,
    head_sha: Option<&str>,
    user: Option<&str>,
) -> String {
    let joined = [
        event_type,
        action.unwrap_or(""),
        repository,
        entity_number.unwrap_or(""),
        head_sha.unwrap_or(""),
        user.unwrap_or(""),
    ]
    .join("|");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of an `insert` call: whether the event was newly admitted or
/// recognized as a duplicate by either dedup layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

// ============================================================================
// EventStore
// ============================================================================

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Conditional-on-absent insert implementing both dedup layers: hard
    /// dedup on `id`, soft dedup on `(semantic_key, raw_bytes_hash)` within
    /// `dup_window`.
    async fn insert(&self, event: EventRecord, dup_window: Duration) -> Result<InsertOutcome, EventStoreError>;

    /// Monotonic status update; cannot transition away from `Processed`.
    async fn update_status(
        &self,
        id: &DeliveryId,
        new_status: EventStatus,
        retry_count: Option<u16>,
        last_error: Option<String>,
    ) -> Result<(), EventStoreError>;

    async fn get(&self, id: &DeliveryId) -> Result<EventRecord, EventStoreError>;

    /// Admin-only: resets status to `Received` and archives the prior
    /// record in the sidecar event history for audit.
    async fn reset_for_replay(&self, id: &DeliveryId) -> Result<(), EventStoreError>;

    /// Archived copies of a record produced by `reset_for_replay`, oldest
    /// first.
    async fn event_history(&self, id: &DeliveryId) -> Result<Vec<EventRecord>, EventStoreError>;

    /// Remove terminal (`Processed`/`Failed`/`Duplicate`) records received
    /// before `cutoff`, along with their archived history. Records still
    /// `Received`/`Processing` are kept regardless of age — pruning must
    /// never drop work the worker pool hasn't finished with. Returns the
    /// number of records removed.
    async fn prune(&self, cutoff: Timestamp) -> Result<usize, EventStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("event not found: {id}")]
    NotFound { id: String },

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl EventStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Io { .. })
    }
}

// ============================================================================
// Deduplicator
// ============================================================================

/// Thin collaborator wrapping an [`EventStore`] with a configured dedup
/// window. Kept as its own type (rather than folded entirely into the
/// store) so the ingress pipeline has an explicit, mockable "has this event
/// already happened" stage distinct from "persist this event".
pub struct Deduplicator {
    dup_window: Duration,
}

impl Deduplicator {
    pub fn new(dup_window: Duration) -> Self {
        Self { dup_window }
    }

    pub fn dup_window(&self) -> Duration {
        self.dup_window
    }

    pub async fn insert(
        &self,
        store: &(dyn EventStore),
        candidate: EventRecord,
    ) -> Result<InsertOutcome, EventStoreError> {
        store.insert(candidate, self.dup_window).await
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DUP_WINDOW)
    }
}

// ============================================================================
// In-memory adapter
// ============================================================================

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<DeliveryId, EventRecord>>,
    history: RwLock<HashMap<DeliveryId, Vec<EventRecord>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err(message: &str) -> EventStoreError {
        EventStoreError::StoreUnavailable {
            message: format!("{message} (lock poisoned)"),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: EventRecord, dup_window: Duration) -> Result<InsertOutcome, EventStoreError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Self::lock_err("event store"))?;

        if events.contains_key(&event.id) {
            return Ok(InsertOutcome::Duplicate);
        }

        let is_soft_duplicate = events.values().any(|existing| {
            existing.semantic_key == event.semantic_key
                && existing.raw_bytes_hash == event.raw_bytes_hash
                && event.received_at.duration_since(existing.received_at) <= dup_window
        });
        if is_soft_duplicate {
            return Ok(InsertOutcome::Duplicate);
        }

        events.insert(event.id.clone(), event);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_status(
        &self,
        id: &DeliveryId,
        new_status: EventStatus,
        retry_count: Option<u16>,
        last_error: Option<String>,
    ) -> Result<(), EventStoreError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Self::lock_err("event store"))?;

        let record = events.get_mut(id).ok_or_else(|| EventStoreError::NotFound {
            id: id.as_str().to_string(),
        })?;

        if record.status == EventStatus::Processed && new_status != EventStatus::Processed {
            return Err(EventStoreError::InvalidTransition {
                from: record.status,
                to: new_status,
            });
        }

        record.status = new_status;
        if let Some(retry_count) = retry_count {
            record.retry_count = retry_count;
        }
        if let Some(last_error) = last_error {
            record.last_error = Some(last_error);
        }

        Ok(())
    }

    async fn get(&self, id: &DeliveryId) -> Result<EventRecord, EventStoreError> {
        let events = self
            .events
            .read()
            .map_err(|_| Self::lock_err("event store"))?;
        events.get(id).cloned().ok_or_else(|| EventStoreError::NotFound {
            id: id.as_str().to_string(),
        })
    }

    async fn reset_for_replay(&self, id: &DeliveryId) -> Result<(), EventStoreError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Self::lock_err("event store"))?;
        let record = events.get_mut(id).ok_or_else(|| EventStoreError::NotFound {
            id: id.as_str().to_string(),
        })?;

        let mut history = self
            .history
            .write()
            .map_err(|_| Self::lock_err("event history"))?;
        history.entry(id.clone()).or_default().push(record.clone());

        record.status = EventStatus::Received;
        Ok(())
    }

    async fn event_history(&self, id: &DeliveryId) -> Result<Vec<EventRecord>, EventStoreError> {
        let history = self
            .history
            .read()
            .map_err(|_| Self::lock_err("event history"))?;
        Ok(history.get(id).cloned().unwrap_or_default())
    }

    async fn prune(&self, cutoff: Timestamp) -> Result<usize, EventStoreError> {
        let stale_ids: Vec<DeliveryId> = {
            let mut events = self.events.write().map_err(|_| Self::lock_err("event store"))?;
            let stale: Vec<DeliveryId> = events
                .values()
                .filter(|record| {
                    matches!(
                        record.status,
                        EventStatus::Processed | EventStatus::Failed | EventStatus::Duplicate
                    ) && record.received_at < cutoff
                })
                .map(|record| record.id.clone())
                .collect();
            for id in &stale {
                events.remove(id);
            }
            stale
        };

        if !stale_ids.is_empty() {
            let mut history = self.history.write().map_err(|_| Self::lock_err("event history"))?;
            for id in &stale_ids {
                history.remove(id);
            }
        }

        Ok(stale_ids.len())
    }
}

// ============================================================================
// Filesystem adapter
// ============================================================================

/// Single-process, restart-durable `EventStore`. Keeps the same in-memory
/// index as [`InMemoryEventStore`] for fast reads, but mirrors every mutation
/// to a JSON file per delivery ID under `root/<sanitized-id>.json` using
/// write-to-temp-then-rename for atomicity, the same discipline
/// `FilesystemBlobStorage` uses for payload blobs.
pub struct FilesystemEventStore {
    root: PathBuf,
    inner: InMemoryEventStore,
}

impl FilesystemEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inner: InMemoryEventStore::new(),
        }
    }

    /// Rebuild the in-memory index by scanning `root` for event JSON files.
    /// Called once at startup; there is no separate "pending"/"processing"
    /// distinction here since the store itself carries no queue semantics
    /// (that crash-recovery reload lives in `hookrelay-queue`).
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self, EventStoreError> {
        let root = root.into();
        let store = Self::new(root.clone());
        if !root.exists() {
            return Ok(store);
        }

        let mut read_dir = tokio::fs::read_dir(&root)
            .await
            .map_err(|e| EventStoreError::Io { message: e.to_string() })?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| EventStoreError::Io { message: e.to_string() })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| EventStoreError::Io { message: e.to_string() })?;
            let record: EventRecord = serde_json::from_slice(&bytes)
                .map_err(|e| EventStoreError::Serialization { message: e.to_string() })?;
            store
                .inner
                .events
                .write()
                .map_err(|_| InMemoryEventStore::lock_err("event store"))?
                .insert(record.id.clone(), record);
        }

        Ok(store)
    }

    fn path_for(&self, id: &DeliveryId) -> PathBuf {
        let sanitized: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }

    async fn write_through(&self, record: &EventRecord) -> Result<(), EventStoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| EventStoreError::Io { message: e.to_string() })?;

        let path = self.path_for(&record.id);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| EventStoreError::Serialization { message: e.to_string() })?;

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| EventStoreError::Io { message: e.to_string() })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| EventStoreError::Io { message: e.to_string() })?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for FilesystemEventStore {
    async fn insert(&self, event: EventRecord, dup_window: Duration) -> Result<InsertOutcome, EventStoreError> {
        let outcome = self.inner.insert(event.clone(), dup_window).await?;
        if outcome == InsertOutcome::Inserted {
            self.write_through(&event).await?;
        }
        Ok(outcome)
    }

    async fn update_status(
        &self,
        id: &DeliveryId,
        new_status: EventStatus,
        retry_count: Option<u16>,
        last_error: Option<String>,
    ) -> Result<(), EventStoreError> {
        self.inner
            .update_status(id, new_status, retry_count, last_error)
            .await?;
        let record = self.inner.get(id).await?;
        self.write_through(&record).await
    }

    async fn get(&self, id: &DeliveryId) -> Result<EventRecord, EventStoreError> {
        self.inner.get(id).await
    }

    async fn reset_for_replay(&self, id: &DeliveryId) -> Result<(), EventStoreError> {
        self.inner.reset_for_replay(id).await?;
        let record = self.inner.get(id).await?;
        self.write_through(&record).await
    }

    async fn event_history(&self, id: &DeliveryId) -> Result<Vec<EventRecord>, EventStoreError> {
        self.inner.event_history(id).await
    }

    async fn prune(&self, cutoff: Timestamp) -> Result<usize, EventStoreError> {
        let stale_ids: Vec<DeliveryId> = {
            let events = self.inner.events.read().map_err(|_| InMemoryEventStore::lock_err("event store"))?;
            events
                .values()
                .filter(|record| {
                    matches!(
                        record.status,
                        EventStatus::Processed | EventStatus::Failed | EventStatus::Duplicate
                    ) && record.received_at < cutoff
                })
                .map(|record| record.id.clone())
                .collect()
        };

        for id in &stale_ids {
            let path = self.path_for(id);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(EventStoreError::Io { message: e.to_string() });
                }
            }
        }

        self.inner.prune(cutoff).await
    }
}

/// Convenience re-export so callers constructing a filesystem-backed store
/// don't need to reach into `std::path`.
pub fn default_store_root() -> &'static Path {
    Path::new("./data/events")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
