use super::*;
use crate::webhook::{EventEntity, EventEnvelope};
use crate::{CorrelationId, DeliveryId, EventId, Repository, RepositoryId, SessionId, Timestamp, User, UserId, UserType};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

fn test_repository() -> Repository {
    Repository::new(
        RepositoryId::new(42),
        "web".to_string(),
        "acme/web".to_string(),
        User {
            id: UserId::new(1),
            login: "acme".to_string(),
            user_type: UserType::Organization,
        },
        false,
    )
}

fn test_event(event_type: &str, action: Option<&str>, payload: serde_json::Value) -> EventEnvelope {
    let now = Timestamp::now();
    EventEnvelope {
        event_id: EventId::new(),
        delivery_id: DeliveryId::new("d1".to_string()).unwrap(),
        provider: "github".to_string(),
        event_type: event_type.to_string(),
        action: action.map(|s| s.to_string()),
        repository: test_repository(),
        entity: EventEntity::Unknown,
        session_id: SessionId::new("acme/web".to_string()).unwrap(),
        correlation_id: CorrelationId::new(),
        occurred_at: now,
        processed_at: now,
        payload,
    }
}

#[test]
fn pr_opened_routes_to_deploy_code() {
    let event = test_event("pull_request", Some("opened"), serde_json::json!({"pull_request": {"number": 42}}));
    assert_eq!(select_target(&event), Some(DispatchTarget::DeployCode));
}

#[test]
fn pr_reopened_routes_to_deploy_code() {
    let event = test_event("pull_request", Some("reopened"), serde_json::json!({}));
    assert_eq!(select_target(&event), Some(DispatchTarget::DeployCode));
}

#[test]
fn pr_synchronize_routes_to_validate_code() {
    let event = test_event("pull_request", Some("synchronize"), serde_json::json!({}));
    assert_eq!(select_target(&event), Some(DispatchTarget::ValidateCode));
}

#[test]
fn pr_ready_for_review_routes_to_review() {
    let event = test_event("pull_request", Some("ready_for_review"), serde_json::json!({}));
    assert_eq!(select_target(&event), Some(DispatchTarget::Review));
}

#[test]
fn pr_closed_merged_routes_to_workflow_merge() {
    let event = test_event(
        "pull_request",
        Some("closed"),
        serde_json::json!({"pull_request": {"merged": true}}),
    );
    assert_eq!(select_target(&event), Some(DispatchTarget::WorkflowMerge));
}

#[test]
fn pr_closed_unmerged_is_recorded_only() {
    let event = test_event(
        "pull_request",
        Some("closed"),
        serde_json::json!({"pull_request": {"merged": false}}),
    );
    assert_eq!(select_target(&event), None);
}

#[test]
fn push_to_main_routes_to_post_merge() {
    let event = test_event("push", None, serde_json::json!({"ref": "refs/heads/main"}));
    assert_eq!(select_target(&event), Some(DispatchTarget::PostMerge));
}

#[test]
fn push_to_feature_branch_is_recorded_only() {
    let event = test_event("push", None, serde_json::json!({"ref": "refs/heads/feature/x"}));
    assert_eq!(select_target(&event), None);
}

#[test]
fn check_run_failure_routes_to_recovery_failure() {
    let event = test_event(
        "check_run",
        Some("completed"),
        serde_json::json!({"check_run": {"conclusion": "failure"}}),
    );
    assert_eq!(select_target(&event), Some(DispatchTarget::RecoveryFailure));
}

#[test]
fn check_run_success_is_recorded_only() {
    let event = test_event(
        "check_run",
        Some("completed"),
        serde_json::json!({"check_run": {"conclusion": "success"}}),
    );
    assert_eq!(select_target(&event), None);
}

#[test]
fn unknown_event_type_is_recorded_only() {
    let event = test_event("star", None, serde_json::json!({}));
    assert_eq!(select_target(&event), None);
}

struct MockAgentApiClient {
    calls: Mutex<Vec<(DispatchTarget, AgentApiRequest)>>,
    response: Result<AgentApiResponse, AgentApiError>,
}

impl MockAgentApiClient {
    fn ok(result_id: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("deployment_id".to_string(), serde_json::json!(result_id));
        Self {
            calls: Mutex::new(Vec::new()),
            response: Ok(AgentApiResponse { fields }),
        }
    }

    fn err(error: AgentApiError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Err(error),
        }
    }
}

#[async_trait]
impl AgentApiClient for MockAgentApiClient {
    async fn call(
        &self,
        target: DispatchTarget,
        request: AgentApiRequest,
    ) -> Result<AgentApiResponse, AgentApiError> {
        self.calls.lock().unwrap().push((target, request.clone()));
        self.response.clone()
    }
}

#[tokio::test]
async fn dispatch_calls_agent_api_for_routed_event() {
    let client = Arc::new(MockAgentApiClient::ok("dep-123"));
    let dispatcher = AgentApiDispatcher::new(client.clone());
    let event = test_event("pull_request", Some("opened"), serde_json::json!({"pull_request": {"number": 42}}));

    let outcome = dispatcher.dispatch(&event, None).await.unwrap();

    match outcome {
        DispatchOutcome::Called { target, result_id } => {
            assert_eq!(target, DispatchTarget::DeployCode);
            assert_eq!(result_id.as_deref(), Some("dep-123"));
        }
        DispatchOutcome::Recorded => panic!("expected a call"),
    }
    assert_eq!(client.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn dispatch_carries_correlation_id_from_workflow() {
    let client = Arc::new(MockAgentApiClient::ok("dep-456"));
    let dispatcher = AgentApiDispatcher::new(client.clone());
    let event = test_event("pull_request", Some("opened"), serde_json::json!({}));
    let now = crate::Timestamp::now();
    let workflow = crate::correlation::Workflow {
        workflow_id: "wf-1".to_string(),
        workflow_type: crate::correlation::WorkflowType::PullRequestWorkflow,
        status: crate::correlation::WorkflowStatus::Active,
        created_at: now,
        updated_at: now,
        completed_at: None,
        triggering_event_id: event.event_id,
        completing_event_id: None,
        last_event_id: event.event_id,
        event_ids: vec![event.event_id],
        identifiers: std::collections::HashSet::new(),
    };

    dispatcher.dispatch(&event, Some(&workflow)).await.unwrap();

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls[0].1.correlation_id.as_deref(), Some("wf-1"));
}

#[tokio::test]
async fn dispatch_skips_agent_api_call_for_unrouted_event() {
    let client = Arc::new(MockAgentApiClient::ok("unused"));
    let dispatcher = AgentApiDispatcher::new(client.clone());
    let event = test_event("star", None, serde_json::json!({}));

    let outcome = dispatcher.dispatch(&event, None).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Recorded));
    assert_eq!(client.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn dispatch_propagates_agent_api_error() {
    let client = Arc::new(MockAgentApiClient::err(AgentApiError::Server5xx { status: 503 }));
    let dispatcher = AgentApiDispatcher::new(client);
    let event = test_event("pull_request", Some("synchronize"), serde_json::json!({}));

    let err = dispatcher.dispatch(&event, None).await.unwrap_err();

    assert!(err.is_retryable());
}

#[test]
fn retryable_errors_match_classification_table() {
    assert!(AgentApiError::Timeout.is_retryable());
    assert!(AgentApiError::Connection { message: "refused".into() }.is_retryable());
    assert!(AgentApiError::Server5xx { status: 502 }.is_retryable());
    assert!(AgentApiError::RateLimited { retry_after_s: 5 }.is_retryable());
    assert!(AgentApiError::Unknown { message: "?".into() }.is_retryable());

    assert!(!AgentApiError::Auth { status: 401 }.is_retryable());
    assert!(!AgentApiError::Validation { status: 422 }.is_retryable());
    assert!(!AgentApiError::NotFound.is_retryable());
    assert!(!AgentApiError::MalformedPayload { message: "bad".into() }.is_retryable());
}

#[test]
fn rate_limited_and_server_errors_get_sixty_second_floor() {
    let short = AgentApiError::RateLimited { retry_after_s: 2 };
    assert_eq!(short.delay_floor(), Some(std::time::Duration::from_secs(60)));

    let long = AgentApiError::RateLimited { retry_after_s: 120 };
    assert_eq!(long.delay_floor(), Some(std::time::Duration::from_secs(120)));

    let server = AgentApiError::Server5xx { status: 500 };
    assert_eq!(server.delay_floor(), Some(std::time::Duration::from_secs(60)));

    assert_eq!(AgentApiError::Timeout.delay_floor(), None);
}

#[test]
fn result_id_reads_whichever_id_field_is_present() {
    let mut fields = serde_json::Map::new();
    fields.insert("workflow_id".to_string(), serde_json::json!("wf-99"));
    let response = AgentApiResponse { fields };
    assert_eq!(response.result_id(), Some("wf-99"));
}

