//! Linear-specific webhook provider.
//!
//! Mirrors [`super::github_provider::GithubWebhookProvider`]'s structure: it
//! maps Linear's header names onto the shared [`WebhookHeaders`] shape and
//! delegates the rest of the pipeline to [`WebhookProcessorImpl`].
//!
//! Linear has no notion of a GitHub-style "repository"; its webhooks carry a
//! `team` (a short key such as `ENG`) and workspace. To keep a single
//! [`EventEnvelope`] shape across providers, the team is mapped onto
//! `Repository` with `full_name` set to the team key and `owner` to the
//! workspace. Must be registered under the canonical provider ID `"linear"`.

use crate::{
    webhook::{
        EventEntity, EventEnvelope, NormalizationError, PayloadStorer, SignatureValidator,
        StorageError, StorageReference, ValidationStatus, WebhookError, WebhookHeaders,
        WebhookProcessor, WebhookProcessorImpl, WebhookRequest,
    },
    Repository, RepositoryId, User, UserId, UserType, ValidationError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Webhook provider for Linear events.
pub struct LinearWebhookProvider {
    inner: WebhookProcessorImpl,
}

impl LinearWebhookProvider {
    /// The canonical provider ID used when registering this provider.
    pub const PROVIDER_ID: &'static str = "linear";

    pub fn new(
        signature_validator: Option<Arc<dyn SignatureValidator>>,
        payload_storer: Option<Arc<dyn PayloadStorer>>,
    ) -> Self {
        Self {
            inner: WebhookProcessorImpl::new(
                signature_validator,
                payload_storer,
                Self::PROVIDER_ID,
                linear_entity_from_payload,
            )
            .with_repository_extractor(extract_linear_repository),
        }
    }

    /// Parse raw HTTP headers into the canonical [`WebhookHeaders`] shape.
    ///
    /// Linear's exact header scheme is not fully documented at the time of
    /// writing; this implementation follows the `Linear-Event`/
    /// `Linear-Delivery`/`Linear-Signature` convention, overridable via
    /// configuration (see `SignatureValidator` wiring in `hookrelay-service`).
    pub fn parse_headers(
        headers: &HashMap<String, String>,
    ) -> Result<WebhookHeaders, ValidationError> {
        WebhookHeaders::from_named_headers(
            headers,
            "Linear-Event",
            "Linear-Delivery",
            "Linear-Signature",
            true,
        )
    }
}

fn linear_entity_from_payload(_event_type: &str, payload: &serde_json::Value) -> EventEntity {
    EventEntity::from_linear_payload(payload)
}

fn extract_linear_repository(payload: &serde_json::Value) -> Result<Repository, NormalizationError> {
    let issue = payload
        .get("data")
        .ok_or_else(|| NormalizationError::MissingRequiredField {
            field: "data".to_string(),
        })?;

    let team = issue
        .get("team")
        .ok_or_else(|| NormalizationError::MissingRequiredField {
            field: "data.team".to_string(),
        })?;

    let team_key = team
        .get("key")
        .and_then(|k| k.as_str())
        .ok_or_else(|| NormalizationError::MissingRequiredField {
            field: "data.team.key".to_string(),
        })?;

    let team_id = team
        .get("id")
        .and_then(|i| i.as_str())
        .map(|s| {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            s.hash(&mut hasher);
            hasher.finish()
        })
        .unwrap_or(0);

    let workspace_login = payload
        .get("organizationId")
        .and_then(|o| o.as_str())
        .unwrap_or("linear-workspace");

    Ok(team_as_repository(team_key, team_id, workspace_login))
}

#[async_trait]
impl WebhookProcessor for LinearWebhookProvider {
    #[instrument(skip(self, request), fields(
        provider = Self::PROVIDER_ID,
        event_type = %request.event_type(),
        delivery_id = %request.delivery_id(),
    ))]
    async fn process_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<EventEnvelope, WebhookError> {
        self.inner.process_webhook(request).await
    }

    async fn validate_signature(
        &self,
        payload: &[u8],
        signature: &str,
        event_type: &str,
    ) -> Result<(), ValidationError> {
        self.inner
            .validate_signature(payload, signature, event_type)
            .await
    }

    async fn store_raw_payload(
        &self,
        request: &WebhookRequest,
        validation_status: ValidationStatus,
    ) -> Result<StorageReference, StorageError> {
        self.inner
            .store_raw_payload(request, validation_status)
            .await
    }

    async fn normalize_event(
        &self,
        request: &WebhookRequest,
    ) -> Result<EventEnvelope, NormalizationError> {
        self.inner.normalize_event(request).await
    }
}

/// Build the synthetic `Repository` a Linear team maps onto. Exposed so
/// normalization logic elsewhere (e.g. replay tooling) can reconstruct the
/// same mapping.
pub fn team_as_repository(team_key: &str, team_id: u64, workspace_login: &str) -> Repository {
    Repository::new(
        RepositoryId::new(team_id),
        team_key.to_string(),
        team_key.to_string(),
        User {
            id: UserId::new(0),
            login: workspace_login.to_string(),
            user_type: UserType::Organization,
        },
        true,
    )
}

#[cfg(test)]
#[path = "linear_provider_tests.rs"]
mod tests;
