//! GitHub-specific webhook provider.
//!
//! Encapsulates GitHub-specific header parsing (`X-GitHub-Event`,
//! `X-GitHub-Delivery`, `X-Hub-Signature-256`) and delegates the shared
//! pipeline (signature validation, storage, normalization) to
//! [`WebhookProcessorImpl`].
//!
//! Must be registered under the canonical provider ID `"github"`.

use crate::{
    webhook::{
        EventEntity, EventEnvelope, NormalizationError, PayloadStorer, SignatureValidator,
        StorageError, StorageReference, ValidationStatus, WebhookError, WebhookHeaders,
        WebhookProcessor, WebhookProcessorImpl, WebhookRequest,
    },
    ValidationError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Webhook provider for GitHub events.
pub struct GithubWebhookProvider {
    inner: WebhookProcessorImpl,
}

impl GithubWebhookProvider {
    /// The canonical provider ID used when registering this provider.
    pub const PROVIDER_ID: &'static str = "github";

    /// Create a new `GithubWebhookProvider` with optional dependencies.
    ///
    /// Both may be `None`; omitting them is useful for testing or when a
    /// particular feature (e.g. payload archival) is not required.
    pub fn new(
        signature_validator: Option<Arc<dyn SignatureValidator>>,
        payload_storer: Option<Arc<dyn PayloadStorer>>,
    ) -> Self {
        Self {
            inner: WebhookProcessorImpl::new(
                signature_validator,
                payload_storer,
                Self::PROVIDER_ID,
                EventEntity::from_github_payload,
            ),
        }
    }

    /// Parse raw HTTP headers into the canonical [`WebhookHeaders`] shape.
    pub fn parse_headers(
        headers: &HashMap<String, String>,
    ) -> Result<WebhookHeaders, ValidationError> {
        WebhookHeaders::from_named_headers(
            headers,
            "X-GitHub-Event",
            "X-GitHub-Delivery",
            "X-Hub-Signature-256",
            true,
        )
    }
}

#[async_trait]
impl WebhookProcessor for GithubWebhookProvider {
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

#[cfg(test)]
#[path = "github_provider_tests.rs"]
mod tests;
