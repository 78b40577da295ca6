//! Dispatcher: routes a correlated [`EventEnvelope`] to the downstream
//! AgentAPI (`/deploy/code`, `/validate/code`, `/workflow/merge`, `/review`,
//! `/workflow/post_merge`, `/recovery/failure`) and classifies the outcome
//! for the worker pool's retry policy.
//!
//! The routing table itself ([`select_target`]) is pure and synchronous;
//! the actual HTTP call goes through [`AgentApiClient`], which production
//! code wraps in a [`crate::circuit_breaker::CircuitBreaker`] the same way
//! a circuit-breaker-wrapped client wraps downstream calls.

use crate::correlation::Workflow;
use crate::webhook::EventEnvelope;
use crate::EventId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Routing table (§4.9)
// ============================================================================

/// One of the fixed AgentAPI endpoints a correlated event can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchTarget {
    DeployCode,
    ValidateCode,
    WorkflowMerge,
    Review,
    PostMerge,
    RecoveryFailure,
}

impl DispatchTarget {
    pub fn path(&self) -> &'static str {
        match self {
            Self::DeployCode => "/deploy/code",
            Self::ValidateCode => "/validate/code",
            Self::WorkflowMerge => "/workflow/merge",
            Self::Review => "/review",
            Self::PostMerge => "/workflow/post_merge",
            Self::RecoveryFailure => "/recovery/failure",
        }
    }
}

impl std::fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Select the downstream action for an event per the §4.9 routing table.
/// `None` means "record the event, make no outbound call".
pub fn select_target(event: &EventEnvelope) -> Option<DispatchTarget> {
    match event.event_type.as_str() {
        "pull_request" => match event.action.as_deref() {
            Some("opened") | Some("reopened") => Some(DispatchTarget::DeployCode),
            Some("synchronize") => Some(DispatchTarget::ValidateCode),
            Some("ready_for_review") => Some(DispatchTarget::Review),
            Some("closed") => {
                let merged = event
                    .payload
                    .pointer("/pull_request/merged")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if merged {
                    Some(DispatchTarget::WorkflowMerge)
                } else {
                    None
                }
            }
            _ => None,
        },
        "push" => {
            let is_default_branch = event
                .payload
                .get("ref")
                .and_then(|v| v.as_str())
                .map(|r| {
                    let branch = r.strip_prefix("refs/heads/").unwrap_or(r);
                    matches!(branch, "main" | "master" | "develop")
                })
                .unwrap_or(false);
            if is_default_branch {
                Some(DispatchTarget::PostMerge)
            } else {
                None
            }
        }
        "check_run" => {
            let failed = event.action.as_deref() == Some("completed")
                && event
                    .payload
                    .pointer("/check_run/conclusion")
                    .and_then(|v| v.as_str())
                    == Some("failure");
            if failed {
                Some(DispatchTarget::RecoveryFailure)
            } else {
                None
            }
        }
        _ => None,
    }
}

// ============================================================================
// AgentApiClient — the outbound HTTP boundary
// ============================================================================

/// A single outbound call to the AgentAPI, carrying the tracing identifiers
/// every call must include per §4.9.
#[derive(Debug, Clone, Serialize)]
pub struct AgentApiRequest {
    pub event_id: EventId,
    pub correlation_id: Option<String>,
    pub body: serde_json::Value,
}

/// The AgentAPI's JSON response body: one of `deployment_id`, `validation_id`,
/// `workflow_id`, or `recovery_id`, per §6.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentApiResponse {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl AgentApiResponse {
    /// Pull whichever `*_id` field the endpoint returned.
    pub fn result_id(&self) -> Option<&str> {
        ["deployment_id", "validation_id", "workflow_id", "recovery_id"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(|v| v.as_str()))
    }
}

/// Thin HTTP boundary to the AgentAPI. Implementations are responsible for
/// bearer-token auth and the configured request timeout; retry/backoff is
/// the worker pool's job, not the client's.
#[async_trait]
pub trait AgentApiClient: Send + Sync {
    async fn call(
        &self,
        target: DispatchTarget,
        request: AgentApiRequest,
    ) -> Result<AgentApiResponse, AgentApiError>;
}

/// Error taxonomy for an AgentAPI call, matching the §4.7 classification
/// table exactly so the worker pool's retry decision is a single match.
#[derive(Debug, thiserror::Error, Clone)]
pub enum AgentApiError {
    #[error("request to AgentAPI timed out")]
    Timeout,

    #[error("connection to AgentAPI failed: {message}")]
    Connection { message: String },

    #[error("AgentAPI returned server error {status}")]
    Server5xx { status: u16 },

    #[error("AgentAPI rate limited the request, retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },

    #[error("AgentAPI rejected credentials (status {status})")]
    Auth { status: u16 },

    #[error("AgentAPI rejected the request as invalid (status {status})")]
    Validation { status: u16 },

    #[error("AgentAPI has no resource for this request")]
    NotFound,

    #[error("request body could not be serialized for AgentAPI: {message}")]
    MalformedPayload { message: String },

    #[error("unclassified AgentAPI failure: {message}")]
    Unknown { message: String },
}

impl AgentApiError {
    /// §4.7 classification table: should the worker pool retry this error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Connection { .. } => true,
            Self::Server5xx { .. } => true,
            Self::RateLimited { .. } => true,
            Self::Auth { .. } => false,
            Self::Validation { .. } => false,
            Self::NotFound => false,
            Self::MalformedPayload { .. } => false,
            Self::Unknown { .. } => true,
        }
    }

    /// Floor on the retry delay this error imposes (§4.7: `RateLimited`/
    /// `ServerError` get a ≥60s floor regardless of attempt count).
    pub fn delay_floor(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_s } => {
                Some(std::time::Duration::from_secs((*retry_after_s).max(60)))
            }
            Self::Server5xx { .. } => Some(std::time::Duration::from_secs(60)),
            _ => None,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Outcome of dispatching a single event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The event matched a routing rule and the AgentAPI call succeeded.
    Called {
        target: DispatchTarget,
        result_id: Option<String>,
    },
    /// The event matched no routing rule; it is recorded but no call is made.
    Recorded,
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum DispatcherError {
    #[error("AgentAPI call failed: {0}")]
    AgentApi(#[from] AgentApiError),

    #[error("circuit breaker is open for the AgentAPI client")]
    CircuitOpen,
}

impl DispatcherError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AgentApi(e) => e.is_retryable(),
            Self::CircuitOpen => true,
        }
    }
}

/// Routes a correlated event to the downstream AgentAPI and reports the
/// outcome. Every implementor must stamp `correlation_id = workflow_id` (if
/// any) and `event_id` onto the outbound call, per §4.9.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        event: &EventEnvelope,
        workflow: Option<&Workflow>,
    ) -> Result<DispatchOutcome, DispatcherError>;
}

/// Builds the JSON body AgentAPI expects for a given target from the raw
/// provider payload. Kept deliberately small: only the fields the
/// downstream actually needs are pulled out of the opaque payload, per the
/// "dynamic payloads" design note in §9.
fn build_request_body(event: &EventEnvelope, target: DispatchTarget) -> serde_json::Value {
    match target {
        DispatchTarget::DeployCode | DispatchTarget::ValidateCode | DispatchTarget::Review => {
            serde_json::json!({
                "repository": event.repository.full_name,
                "pr_data": event.payload.get("pull_request").cloned().unwrap_or(serde_json::Value::Null),
            })
        }
        DispatchTarget::WorkflowMerge => serde_json::json!({
            "repository": event.repository.full_name,
            "pull_request": event.payload.get("pull_request").cloned().unwrap_or(serde_json::Value::Null),
        }),
        DispatchTarget::PostMerge => serde_json::json!({
            "repository": event.repository.full_name,
            "ref": event.payload.get("ref"),
            "commits": event.payload.get("commits"),
        }),
        DispatchTarget::RecoveryFailure => serde_json::json!({
            "repository": event.repository.full_name,
            "check_run": event.payload.get("check_run"),
        }),
    }
}

/// Default [`Dispatcher`]: applies the routing table, builds the request
/// body, and delegates the HTTP call to an injected [`AgentApiClient`].
pub struct AgentApiDispatcher {
    client: std::sync::Arc<dyn AgentApiClient>,
}

impl AgentApiDispatcher {
    pub fn new(client: std::sync::Arc<dyn AgentApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatcher for AgentApiDispatcher {
    async fn dispatch(
        &self,
        event: &EventEnvelope,
        workflow: Option<&Workflow>,
    ) -> Result<DispatchOutcome, DispatcherError> {
        let Some(target) = select_target(event) else {
            return Ok(DispatchOutcome::Recorded);
        };

        let request = AgentApiRequest {
            event_id: event.event_id,
            correlation_id: workflow.map(|w| w.workflow_id.clone()),
            body: build_request_body(event, target),
        };

        let response = self.client.call(target, request).await?;

        Ok(DispatchOutcome::Called {
            target,
            result_id: response.result_id().map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
