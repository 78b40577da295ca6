//! Correlation engine: identifier extraction and workflow association.
//!
//! Groups related events from a repository, pull request, branch, commit, or
//! user into long-running [`Workflow`]s. Each incoming event is reduced to a
//! set of [`Identifier`]s; the engine looks up which active workflow, if any,
//! already claims one of them and appends the event, or opens a new workflow
//! when the event matches a start trigger (PR opened/reopened, push to a
//! default branch).

use crate::webhook::{EventEntity, EventEnvelope};
use crate::{EventId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

// ============================================================================
// Identifier
// ============================================================================

/// Kind of identifier used to correlate events into workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    Repository,
    PullRequest,
    Branch,
    Commit,
    User,
}

/// A `(kind, value)` pair that links events across time, e.g.
/// `pull_request:acme/web#42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn repository(full_name: &str) -> Self {
        Self::new(IdentifierKind::Repository, full_name.to_string())
    }

    pub fn pull_request(full_name: &str, number: u32) -> Self {
        Self::new(IdentifierKind::PullRequest, format!("{full_name}#{number}"))
    }

    pub fn branch(full_name: &str, branch_ref: &str) -> Self {
        Self::new(IdentifierKind::Branch, format!("{full_name}:{branch_ref}"))
    }

    pub fn commit(sha: &str) -> Self {
        Self::new(IdentifierKind::Commit, sha.to_string())
    }

    pub fn user(login: &str) -> Self {
        Self::new(IdentifierKind::User, login.to_string())
    }
}

/// `(workflow_id, event_id, recorded_at)` — one row of the correlation
/// multimap.
pub type CorrelationEntry = (String, EventId, Timestamp);

// ============================================================================
// Workflow
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowType {
    PullRequestWorkflow,
    PushWorkflow,
    GenericWorkflow,
}

/// A time-bounded grouping of correlated events representing the lifecycle
/// of a PR, a push chain, or an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub triggering_event_id: EventId,
    pub completing_event_id: Option<EventId>,
    pub last_event_id: EventId,
    pub event_ids: Vec<EventId>,
    pub identifiers: HashSet<Identifier>,
}

impl Workflow {
    fn new(
        workflow_id: String,
        workflow_type: WorkflowType,
        triggering_event_id: EventId,
        identifiers: HashSet<Identifier>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            workflow_id,
            workflow_type,
            status: WorkflowStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
            triggering_event_id,
            completing_event_id: None,
            last_event_id: triggering_event_id,
            event_ids: vec![triggering_event_id],
            identifiers,
        }
    }

    /// Append-only: the event is pushed, never inserted or removed elsewhere.
    fn append(&mut self, event_id: EventId, identifiers: &HashSet<Identifier>) {
        self.event_ids.push(event_id);
        self.last_event_id = event_id;
        self.updated_at = Timestamp::now();
        self.identifiers.extend(identifiers.iter().cloned());
    }

    fn complete(&mut self, completing_event_id: EventId) {
        self.status = WorkflowStatus::Completed;
        self.completed_at = Some(Timestamp::now());
        self.completing_event_id = Some(completing_event_id);
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, WorkflowStatus::Active)
    }
}

/// Result of correlating a single event: the workflow it now belongs to, if
/// any. `None` means the event is dispatched stand-alone.
#[derive(Debug, Clone)]
pub struct CorrelationOutcome {
    pub workflow: Option<Workflow>,
}

// ============================================================================
// CorrelationIndex
// ============================================================================

/// Durable multimap from [`Identifier`] to the workflows it has touched,
/// plus the workflow records themselves. Mutable in-memory state backed by
/// storage for durability; callers serialize concurrent appends to the same
/// workflow via the per-workflow lock `hookrelay-queue` provides.
#[async_trait]
pub trait CorrelationIndex: Send + Sync {
    async fn record(&self, identifier: Identifier, entry: CorrelationEntry) -> Result<(), CorrelationError>;

    async fn lookup(&self, identifier: &Identifier) -> Result<Vec<CorrelationEntry>, CorrelationError>;

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>, CorrelationError>;

    async fn put_workflow(&self, workflow: Workflow) -> Result<(), CorrelationError>;

    /// Remove workflows last updated before `cutoff`, along with every
    /// identifier-index entry that pointed at them. A workflow is pruned
    /// regardless of status — an active workflow that never completes must
    /// not pin its identifiers in the index forever. Returns the number of
    /// workflows removed.
    async fn prune(&self, cutoff: Timestamp) -> Result<usize, CorrelationError>;
}

/// Per-process in-memory implementation. Horizontal scaling requires moving
/// this state to a shared store (see crate-level design notes).
#[derive(Default)]
pub struct InMemoryCorrelationIndex {
    identifiers: RwLock<HashMap<Identifier, Vec<CorrelationEntry>>>,
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl InMemoryCorrelationIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationIndex for InMemoryCorrelationIndex {
    async fn record(&self, identifier: Identifier, entry: CorrelationEntry) -> Result<(), CorrelationError> {
        let mut guard = self.identifiers.write().map_err(|_| CorrelationError::Internal {
            message: "identifier index lock poisoned".to_string(),
        })?;
        guard.entry(identifier).or_default().push(entry);
        Ok(())
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Vec<CorrelationEntry>, CorrelationError> {
        let guard = self.identifiers.read().map_err(|_| CorrelationError::Internal {
            message: "identifier index lock poisoned".to_string(),
        })?;
        Ok(guard.get(identifier).cloned().unwrap_or_default())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>, CorrelationError> {
        let guard = self.workflows.read().map_err(|_| CorrelationError::Internal {
            message: "workflow map lock poisoned".to_string(),
        })?;
        Ok(guard.get(workflow_id).cloned())
    }

    async fn put_workflow(&self, workflow: Workflow) -> Result<(), CorrelationError> {
        let mut guard = self.workflows.write().map_err(|_| CorrelationError::Internal {
            message: "workflow map lock poisoned".to_string(),
        })?;
        guard.insert(workflow.workflow_id.clone(), workflow);
        Ok(())
    }

    async fn prune(&self, cutoff: Timestamp) -> Result<usize, CorrelationError> {
        let stale_ids: Vec<String> = {
            let mut workflows = self.workflows.write().map_err(|_| CorrelationError::Internal {
                message: "workflow map lock poisoned".to_string(),
            })?;
            let stale: Vec<String> = workflows
                .iter()
                .filter(|(_, workflow)| workflow.updated_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                workflows.remove(id);
            }
            stale
        };

        if !stale_ids.is_empty() {
            let stale_set: HashSet<&str> = stale_ids.iter().map(String::as_str).collect();
            let mut identifiers = self.identifiers.write().map_err(|_| CorrelationError::Internal {
                message: "identifier index lock poisoned".to_string(),
            })?;
            identifiers.retain(|_, entries| {
                entries.retain(|(workflow_id, _, _)| !stale_set.contains(workflow_id.as_str()));
                !entries.is_empty()
            });
        }

        Ok(stale_ids.len())
    }
}

// ============================================================================
// CorrelationEngine
// ============================================================================

pub struct CorrelationEngine {
    index: std::sync::Arc<dyn CorrelationIndex>,
    cancel_on_workflow_complete: bool,
}

impl CorrelationEngine {
    pub fn new(index: std::sync::Arc<dyn CorrelationIndex>) -> Self {
        Self {
            index,
            cancel_on_workflow_complete: false,
        }
    }

    /// `CANCEL_ON_WORKFLOW_COMPLETE` — whether completing a workflow should
    /// cancel in-flight retries for the same workflow. Default off.
    pub fn with_cancel_on_complete(mut self, cancel: bool) -> Self {
        self.cancel_on_workflow_complete = cancel;
        self
    }

    pub fn cancel_on_workflow_complete(&self) -> bool {
        self.cancel_on_workflow_complete
    }

    pub async fn correlate(&self, event: &EventEnvelope) -> Result<CorrelationOutcome, CorrelationError> {
        let identifiers = extract_identifiers(event);

        let mut candidate_ids: HashSet<String> = HashSet::new();
        for identifier in &identifiers {
            for (workflow_id, _, _) in self.index.lookup(identifier).await? {
                candidate_ids.insert(workflow_id);
            }
        }

        let mut candidates = Vec::new();
        for workflow_id in candidate_ids {
            if let Some(workflow) = self.index.get_workflow(&workflow_id).await? {
                if workflow.is_active() {
                    candidates.push(workflow);
                }
            }
        }

        let mut workflow = if let Some(mut existing) = candidates
            .into_iter()
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
        {
            existing.append(event.event_id, &identifiers);
            existing
        } else if is_workflow_start_trigger(event) {
            Workflow::new(
                generate_workflow_id(event),
                workflow_type_for(event),
                event.event_id,
                identifiers.clone(),
            )
        } else {
            return Ok(CorrelationOutcome { workflow: None });
        };

        if is_workflow_completion_trigger(event) {
            workflow.complete(event.event_id);
        }

        self.index.put_workflow(workflow.clone()).await?;

        let recorded_at = Timestamp::now();
        for identifier in identifiers {
            self.index
                .record(identifier, (workflow.workflow_id.clone(), event.event_id, recorded_at))
                .await?;
        }

        Ok(CorrelationOutcome {
            workflow: Some(workflow),
        })
    }
}

/// Extract the identifier set for an event per the trigger table: PR events
/// yield repository/PR/branch/commit/user, pushes yield repository/branch/
/// one identifier per commit/pusher, issues yield repository/assignee. Check
/// runs/suites are the one row without `repository`: commit plus associated
/// PRs only, since a repo-wide identifier would let a check event attach to
/// any active workflow in the same repo regardless of which commit it ran
/// against.
fn extract_identifiers(event: &EventEnvelope) -> HashSet<Identifier> {
    let mut ids = HashSet::new();
    let full_name = event.repository.full_name.as_str();

    match event.event_type.as_str() {
        "pull_request" | "pull_request_review" | "pull_request_review_comment" => {
            ids.insert(Identifier::repository(full_name));
            if let Some(pr) = event.payload.get("pull_request") {
                if let Some(number) = pr.get("number").and_then(|n| n.as_u64()) {
                    ids.insert(Identifier::pull_request(full_name, number as u32));
                }
                if let Some(head_ref) = pr.pointer("/head/ref").and_then(|v| v.as_str()) {
                    ids.insert(Identifier::branch(full_name, head_ref));
                }
                if let Some(head_sha) = pr.pointer("/head/sha").and_then(|v| v.as_str()) {
                    ids.insert(Identifier::commit(head_sha));
                }
                if let Some(login) = pr.pointer("/user/login").and_then(|v| v.as_str()) {
                    ids.insert(Identifier::user(login));
                }
            }
        }
        "push" => {
            ids.insert(Identifier::repository(full_name));
            if let Some(ref_str) = event.payload.get("ref").and_then(|v| v.as_str()) {
                ids.insert(Identifier::branch(full_name, ref_str));
            }
            if let Some(commits) = event.payload.get("commits").and_then(|v| v.as_array()) {
                for commit in commits {
                    if let Some(sha) = commit.get("id").and_then(|v| v.as_str()) {
                        ids.insert(Identifier::commit(sha));
                    }
                }
            }
            if let Some(pusher) = event.payload.pointer("/pusher/name").and_then(|v| v.as_str()) {
                ids.insert(Identifier::user(pusher));
            }
        }
        "check_run" | "check_suite" => {
            let anchor = &event.event_type;
            if let Some(head_sha) = event
                .payload
                .pointer(&format!("/{anchor}/head_sha"))
                .and_then(|v| v.as_str())
            {
                ids.insert(Identifier::commit(head_sha));
            }
            if let Some(prs) = event
                .payload
                .pointer(&format!("/{anchor}/pull_requests"))
                .and_then(|v| v.as_array())
            {
                for pr in prs {
                    if let Some(number) = pr.get("number").and_then(|v| v.as_u64()) {
                        ids.insert(Identifier::pull_request(full_name, number as u32));
                    }
                }
            }
        }
        "issues" | "issue_comment" | "Issue" => {
            ids.insert(Identifier::repository(full_name));
            let assignee = event
                .payload
                .pointer("/issue/assignee/login")
                .and_then(|v| v.as_str())
                .or_else(|| event.payload.pointer("/data/assignee/name").and_then(|v| v.as_str()));
            if let Some(assignee) = assignee {
                ids.insert(Identifier::user(assignee));
            }
        }
        _ => {}
    }

    ids
}

fn is_workflow_start_trigger(event: &EventEnvelope) -> bool {
    match event.event_type.as_str() {
        "pull_request" => matches!(event.action.as_deref(), Some("opened") | Some("reopened")),
        "push" => event
            .payload
            .get("ref")
            .and_then(|v| v.as_str())
            .map(|r| {
                let branch = r.strip_prefix("refs/heads/").unwrap_or(r);
                matches!(branch, "main" | "master" | "develop")
            })
            .unwrap_or(false),
        _ => false,
    }
}

fn is_workflow_completion_trigger(event: &EventEnvelope) -> bool {
    match event.event_type.as_str() {
        "pull_request" => event.action.as_deref() == Some("closed"),
        "check_suite" => {
            event.action.as_deref() == Some("completed")
                && matches!(
                    event
                        .payload
                        .pointer("/check_suite/conclusion")
                        .and_then(|v| v.as_str()),
                    Some("success") | Some("failure")
                )
        }
        _ => false,
    }
}

fn workflow_type_for(event: &EventEnvelope) -> WorkflowType {
    match event.event_type.as_str() {
        "pull_request" => WorkflowType::PullRequestWorkflow,
        "push" => WorkflowType::PushWorkflow,
        _ => WorkflowType::GenericWorkflow,
    }
}

/// Deterministic workflow ID prefixed by the triggering event's entity,
/// e.g. `wf_pr_acme_web_42_<ts>`.
fn generate_workflow_id(event: &EventEnvelope) -> String {
    let repo_slug = event.repository.full_name.replace('/', "_");
    let ts = event.occurred_at.to_rfc3339().replace([':', '.'], "-");
    match &event.entity {
        EventEntity::PullRequest { number } => format!("wf_pr_{repo_slug}_{number}_{ts}"),
        EventEntity::Branch { name } => format!("wf_push_{repo_slug}_{name}_{ts}"),
        _ => format!("wf_generic_{repo_slug}_{ts}"),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("correlation index unavailable: {message}")]
    IndexUnavailable { message: String },

    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CorrelationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. })
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
