//! # Webhook Intake Module
//!
//! Provider-agnostic webhook parsing, signature validation, and normalization
//! into a standard [`EventEnvelope`]. Provider-specific header names and
//! payload shapes are handled by the `github_provider`/`linear_provider`
//! submodules; this module defines the shared pipeline they delegate to.

use crate::{
    CorrelationId, DeliveryId, EventId, Repository, RepositoryId, SessionId, Timestamp, User,
    UserId, UserType, ValidationError,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

// ============================================================================
// Core Types
// ============================================================================

/// Raw HTTP request data from an inbound webhook.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self {
            headers,
            body,
            received_at: Timestamp::now(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.headers.event_type
    }

    pub fn delivery_id(&self) -> &str {
        &self.headers.delivery_id
    }

    pub fn signature(&self) -> Option<&str> {
        self.headers.signature.as_deref()
    }
}

/// Provider-normalized HTTP headers required for processing.
///
/// Each provider maps its own header names (`X-GitHub-Event`/`X-GitHub-Delivery`
/// for GitHub, `Linear-Event`/`Linear-Delivery` for Linear) onto this common
/// shape before the shared pipeline runs.
#[derive(Debug, Clone)]
pub struct WebhookHeaders {
    pub event_type: String,
    pub delivery_id: String,
    pub signature: Option<String>,
    pub user_agent: Option<String>,
    pub content_type: String,
}

impl WebhookHeaders {
    /// Parse headers using a named header-name mapping, as a provider would
    /// supply. `require_signature` controls whether a missing signature is a
    /// hard validation failure (GitHub requires one on all but `ping`;
    /// Linear always requires one).
    pub fn from_named_headers(
        headers: &HashMap<String, String>,
        event_type_header: &str,
        delivery_id_header: &str,
        signature_header: &str,
        require_signature: bool,
    ) -> Result<Self, ValidationError> {
        let lookup = |name: &str| -> Option<String> {
            headers
                .get(name)
                .or_else(|| headers.get(&name.to_lowercase()))
                .cloned()
        };

        let event_type = lookup(event_type_header).ok_or_else(|| ValidationError::Required {
            field: event_type_header.to_string(),
        })?;

        let delivery_id = lookup(delivery_id_header).ok_or_else(|| ValidationError::Required {
            field: delivery_id_header.to_string(),
        })?;

        let signature = lookup(signature_header);

        let user_agent = lookup("User-Agent");

        let content_type =
            lookup("Content-Type").unwrap_or_else(|| "application/json".to_string());

        let parsed = Self {
            event_type,
            delivery_id,
            signature,
            user_agent,
            content_type,
        };

        parsed.validate(require_signature)?;
        Ok(parsed)
    }

    /// Validate header values.
    pub fn validate(&self, require_signature: bool) -> Result<(), ValidationError> {
        if self.event_type.is_empty() {
            return Err(ValidationError::Required {
                field: "event_type".to_string(),
            });
        }

        if self.delivery_id.is_empty() {
            return Err(ValidationError::Required {
                field: "delivery_id".to_string(),
            });
        }

        if require_signature && self.signature.is_none() {
            return Err(ValidationError::Required {
                field: "signature".to_string(),
            });
        }

        if !self.content_type.starts_with("application/json") {
            return Err(ValidationError::InvalidFormat {
                field: "content_type".to_string(),
                message: "must be application/json".to_string(),
            });
        }

        Ok(())
    }

    /// Delivery ID as a validated dedup key.
    pub fn delivery_id(&self) -> Result<DeliveryId, ValidationError> {
        DeliveryId::new(self.delivery_id.clone())
    }
}

/// Normalized event structure after webhook processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    /// Provider-assigned delivery identifier (e.g. the `X-GitHub-Delivery`
    /// header). This, not `event_id`, is the hard dedup key and the value
    /// callers see echoed back as the event identifier.
    pub delivery_id: DeliveryId,
    pub provider: String,
    pub event_type: String,
    pub action: Option<String>,
    pub repository: Repository,
    pub entity: EventEntity,
    pub session_id: SessionId,
    pub correlation_id: CorrelationId,
    pub occurred_at: Timestamp,
    pub processed_at: Timestamp,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(
        delivery_id: DeliveryId,
        provider: String,
        event_type: String,
        action: Option<String>,
        repository: Repository,
        entity: EventEntity,
        payload: serde_json::Value,
    ) -> Self {
        let event_id = EventId::new();
        let session_id = Self::generate_session_id(&repository, &entity);
        let correlation_id = CorrelationId::new();
        let now = Timestamp::now();

        Self {
            event_id,
            delivery_id,
            provider,
            event_type,
            action,
            repository,
            entity,
            session_id,
            correlation_id,
            occurred_at: now,
            processed_at: now,
            payload,
        }
    }

    fn generate_session_id(repository: &Repository, entity: &EventEntity) -> SessionId {
        let entity_type = entity.entity_type();
        let entity_id = entity.entity_id();

        SessionId::from_parts(
            repository.owner_name(),
            repository.repo_name(),
            entity_type,
            &entity_id,
        )
    }
}

/// The primary object affected by the event, used for session grouping and
/// as a seed for correlation-engine identifier extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventEntity {
    PullRequest { number: u32 },
    Issue { number: u32 },
    Branch { name: String },
    Release { tag: String },
    Repository,
    Unknown,
}

impl EventEntity {
    /// Extract entity from a GitHub payload based on event type.
    pub fn from_github_payload(event_type: &str, payload: &serde_json::Value) -> Self {
        match event_type {
            "pull_request" | "pull_request_review" | "pull_request_review_comment" => {
                if let Some(pr) = payload.get("pull_request") {
                    if let Some(number) = pr.get("number").and_then(|n| n.as_u64()) {
                        return Self::PullRequest {
                            number: number as u32,
                        };
                    }
                }
            }
            "issues" | "issue_comment" => {
                if let Some(issue) = payload.get("issue") {
                    if let Some(number) = issue.get("number").and_then(|n| n.as_u64()) {
                        return Self::Issue {
                            number: number as u32,
                        };
                    }
                }
            }
            "push" | "create" | "delete" => {
                if let Some(ref_str) = payload.get("ref").and_then(|r| r.as_str()) {
                    if let Some(branch_name) = ref_str.strip_prefix("refs/heads/") {
                        return Self::Branch {
                            name: branch_name.to_string(),
                        };
                    }
                }
            }
            "release" => {
                if let Some(release) = payload.get("release") {
                    if let Some(tag) = release.get("tag_name").and_then(|t| t.as_str()) {
                        return Self::Release {
                            tag: tag.to_string(),
                        };
                    }
                }
            }
            "repository" => {
                return Self::Repository;
            }
            _ => {}
        }

        Self::Unknown
    }

    /// Extract entity from a Linear payload (issues only have a number-like
    /// identifier in the form of their short key, e.g. `ENG-123`).
    pub fn from_linear_payload(payload: &serde_json::Value) -> Self {
        if let Some(issue) = payload.get("data") {
            if let Some(number) = issue.get("number").and_then(|n| n.as_u64()) {
                return Self::Issue {
                    number: number as u32,
                };
            }
        }
        Self::Unknown
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::PullRequest { .. } => "pull_request",
            Self::Issue { .. } => "issue",
            Self::Branch { .. } => "branch",
            Self::Release { .. } => "release",
            Self::Repository => "repository",
            Self::Unknown => "unknown",
        }
    }

    pub fn entity_id(&self) -> String {
        match self {
            Self::PullRequest { number } => number.to_string(),
            Self::Issue { number } => number.to_string(),
            Self::Branch { name } => name.clone(),
            Self::Release { tag } => tag.clone(),
            Self::Repository => "repository".to_string(),
            Self::Unknown => "unknown".to_string(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for webhook processing failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Signature validation failed: {0}")]
    InvalidSignature(String),

    #[error("Payload storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Event normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Unknown event type: {event_type}")]
    UnknownEventType { event_type: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
}

impl WebhookError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(storage_error) => storage_error.is_transient(),
            Self::InvalidSignature(_) => false,
            Self::UnknownEventType { .. } => false,
            Self::MalformedPayload { .. } => false,
            Self::Validation(_) => false,
            Self::Normalization(_) => false,
            Self::JsonParsing(_) => false,
            Self::RateLimited { .. } => true,
        }
    }

    pub fn error_category(&self) -> crate::ErrorCategory {
        match self {
            Self::InvalidSignature(_) => crate::ErrorCategory::Security,
            Self::UnknownEventType { .. } => crate::ErrorCategory::Permanent,
            Self::MalformedPayload { .. } => crate::ErrorCategory::Permanent,
            Self::Storage(storage_error) => {
                if storage_error.is_transient() {
                    crate::ErrorCategory::Transient
                } else {
                    crate::ErrorCategory::Permanent
                }
            }
            Self::Validation(_) => crate::ErrorCategory::Permanent,
            Self::Normalization(_) => crate::ErrorCategory::Permanent,
            Self::JsonParsing(_) => crate::ErrorCategory::Permanent,
            Self::RateLimited { .. } => crate::ErrorCategory::Transient,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }
}

/// Errors during event normalization.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("Missing required field: {field}")]
    MissingRequiredField { field: String },

    #[error("Invalid field format: {field} - {message}")]
    InvalidFieldFormat { field: String, message: String },

    #[error("Repository extraction failed: {0}")]
    RepositoryExtraction(#[from] ExtractionError),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
}

/// Errors during repository/entity extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid field type: {field}")]
    InvalidFieldType { field: String },
}

/// Errors during payload storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Storage not available: {message}")]
    Unavailable { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Payload too large: {size} bytes")]
    PayloadTooLarge { size: usize },
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OperationFailed { .. } => true,
            Self::Unavailable { .. } => true,
            Self::PermissionDenied { .. } => false,
            Self::PayloadTooLarge { .. } => false,
        }
    }
}

/// Storage reference for stored payloads.
#[derive(Debug, Clone)]
pub struct StorageReference {
    pub blob_path: String,
    pub stored_at: Timestamp,
    pub size_bytes: u64,
}

/// Validation status for stored payloads.
#[derive(Debug, Clone)]
pub enum ValidationStatus {
    Valid,
    InvalidSignature,
    MalformedPayload,
    UnknownEvent,
}

// ============================================================================
// Core Operations (Traits)
// ============================================================================

/// Main interface for a provider's webhook processing pipeline.
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    async fn process_webhook(&self, request: WebhookRequest)
        -> Result<EventEnvelope, WebhookError>;

    async fn validate_signature(
        &self,
        payload: &[u8],
        signature: &str,
        event_type: &str,
    ) -> Result<(), ValidationError>;

    async fn store_raw_payload(
        &self,
        request: &WebhookRequest,
        validation_status: ValidationStatus,
    ) -> Result<StorageReference, StorageError>;

    async fn normalize_event(
        &self,
        request: &WebhookRequest,
    ) -> Result<EventEnvelope, NormalizationError>;
}

/// Interface for HMAC-based webhook signature validation.
#[async_trait]
pub trait SignatureValidator: Send + Sync {
    async fn validate_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret_key: &str,
    ) -> Result<(), ValidationError>;

    async fn get_webhook_secret(&self, event_type: &str) -> Result<String, SecretError>;

    fn supports_constant_time_comparison(&self) -> bool;
}

/// Interface for persisting raw webhook payloads.
#[async_trait]
pub trait PayloadStorer: Send + Sync {
    async fn store_payload(
        &self,
        request: &WebhookRequest,
        validation_status: ValidationStatus,
    ) -> Result<StorageReference, StorageError>;

    async fn retrieve_payload(
        &self,
        storage_ref: &StorageReference,
    ) -> Result<WebhookRequest, StorageError>;

    async fn list_payloads(
        &self,
        filters: PayloadFilters,
    ) -> Result<Vec<StorageReference>, StorageError>;
}

// ============================================================================
// Supporting Types
// ============================================================================

/// Filters for listing stored payloads.
#[derive(Debug, Clone)]
pub struct PayloadFilters {
    pub event_type: Option<String>,
    pub repository_id: Option<RepositoryId>,
    pub validation_status: Option<ValidationStatus>,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl Default for PayloadFilters {
    fn default() -> Self {
        Self {
            event_type: None,
            repository_id: None,
            validation_status: None,
            start_date: None,
            end_date: None,
            limit: Some(100),
        }
    }
}

/// Error type for secret operations.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {key}")]
    NotFound { key: String },

    #[error("Access denied to secret: {key}")]
    AccessDenied { key: String },

    #[error("Secret provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid secret format: {key}")]
    InvalidFormat { key: String },
}

// ============================================================================
// Default Implementation
// ============================================================================

/// Shared webhook processor body, parameterized by the header names and
/// entity/repository extraction a provider supplies. GitHub and Linear
/// providers each wrap an instance of this with their own `EventNormalizer`.
pub struct WebhookProcessorImpl {
    signature_validator: Option<std::sync::Arc<dyn SignatureValidator>>,
    payload_storer: Option<std::sync::Arc<dyn PayloadStorer>>,
    provider: &'static str,
    entity_extractor: fn(event_type: &str, payload: &serde_json::Value) -> EventEntity,
    repository_extractor: fn(payload: &serde_json::Value) -> Result<Repository, NormalizationError>,
}

impl WebhookProcessorImpl {
    pub fn new(
        signature_validator: Option<std::sync::Arc<dyn SignatureValidator>>,
        payload_storer: Option<std::sync::Arc<dyn PayloadStorer>>,
        provider: &'static str,
        entity_extractor: fn(event_type: &str, payload: &serde_json::Value) -> EventEntity,
    ) -> Self {
        Self {
            signature_validator,
            payload_storer,
            provider,
            entity_extractor,
            repository_extractor: Self::extract_github_repository,
        }
    }

    /// Override the default (GitHub-shaped) repository extractor, for
    /// providers whose payloads don't carry a `repository` object.
    pub fn with_repository_extractor(
        mut self,
        repository_extractor: fn(payload: &serde_json::Value) -> Result<Repository, NormalizationError>,
    ) -> Self {
        self.repository_extractor = repository_extractor;
        self
    }

    fn extract_github_repository(
        payload: &serde_json::Value,
    ) -> Result<Repository, NormalizationError> {
        let repo_data =
            payload
                .get("repository")
                .ok_or_else(|| NormalizationError::MissingRequiredField {
                    field: "repository".to_string(),
                })?;

        let id = repo_data
            .get("id")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| NormalizationError::MissingRequiredField {
                field: "repository.id".to_string(),
            })?;

        let name = repo_data
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| NormalizationError::MissingRequiredField {
                field: "repository.name".to_string(),
            })?
            .to_string();

        let full_name = repo_data
            .get("full_name")
            .and_then(|n| n.as_str())
            .unwrap_or(&name)
            .to_string();

        let private = repo_data
            .get("private")
            .and_then(|p| p.as_bool())
            .unwrap_or(false);

        let owner_data =
            repo_data
                .get("owner")
                .ok_or_else(|| NormalizationError::MissingRequiredField {
                    field: "repository.owner".to_string(),
                })?;

        let owner_id = owner_data
            .get("id")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| NormalizationError::MissingRequiredField {
                field: "repository.owner.id".to_string(),
            })?;

        let owner_login = owner_data
            .get("login")
            .and_then(|l| l.as_str())
            .ok_or_else(|| NormalizationError::MissingRequiredField {
                field: "repository.owner.login".to_string(),
            })?
            .to_string();

        let owner_type = match owner_data.get("type").and_then(|t| t.as_str()) {
            Some("User") => UserType::User,
            Some("Bot") => UserType::Bot,
            Some("Organization") => UserType::Organization,
            _ => UserType::User,
        };

        let owner = User {
            id: UserId::new(owner_id),
            login: owner_login,
            user_type: owner_type,
        };

        Ok(Repository::new(
            RepositoryId::new(id),
            name,
            full_name,
            owner,
            private,
        ))
    }
}

#[async_trait]
impl WebhookProcessor for WebhookProcessorImpl {
    async fn process_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<EventEnvelope, WebhookError> {
        info!(
            provider = self.provider,
            event_type = %request.event_type(),
            delivery_id = %request.delivery_id(),
            "Processing webhook request"
        );

        request.headers.validate(self.provider != "github" || request.event_type() != "ping")?;

        if let Some(signature) = request.signature() {
            self.validate_signature(&request.body, signature, request.event_type())
                .await?;
        }

        let validation_status = ValidationStatus::Valid;
        let _storage_ref = self.store_raw_payload(&request, validation_status).await?;

        let event_envelope = self.normalize_event(&request).await?;

        info!(
            event_id = %event_envelope.event_id,
            session_id = %event_envelope.session_id,
            entity = ?event_envelope.entity,
            "Successfully processed webhook"
        );

        Ok(event_envelope)
    }

    async fn validate_signature(
        &self,
        payload: &[u8],
        signature: &str,
        event_type: &str,
    ) -> Result<(), ValidationError> {
        if let Some(validator) = &self.signature_validator {
            let secret = validator
                .get_webhook_secret(event_type)
                .await
                .map_err(|e| ValidationError::InvalidFormat {
                    field: "signature".to_string(),
                    message: format!("Failed to retrieve webhook secret: {}", e),
                })?;

            validator
                .validate_signature(payload, signature, &secret)
                .await?;

            info!(event_type = %event_type, "Webhook signature validated successfully");
        } else {
            info!(event_type = %event_type, "Signature validation skipped - no validator configured");
        }

        Ok(())
    }

    async fn store_raw_payload(
        &self,
        request: &WebhookRequest,
        validation_status: ValidationStatus,
    ) -> Result<StorageReference, StorageError> {
        if let Some(storer) = &self.payload_storer {
            let storage_ref = storer.store_payload(request, validation_status).await?;

            info!(
                blob_path = %storage_ref.blob_path,
                size_bytes = storage_ref.size_bytes,
                "Webhook payload stored successfully"
            );

            Ok(storage_ref)
        } else {
            info!("Payload storage skipped - no storer configured");

            Ok(StorageReference {
                blob_path: format!("not-stored/{}", request.delivery_id()),
                stored_at: Timestamp::now(),
                size_bytes: request.body.len() as u64,
            })
        }
    }

    async fn normalize_event(
        &self,
        request: &WebhookRequest,
    ) -> Result<EventEnvelope, NormalizationError> {
        let payload: serde_json::Value = serde_json::from_slice(&request.body)?;

        let repository = (self.repository_extractor)(&payload)?;
        let entity = (self.entity_extractor)(request.event_type(), &payload);

        let action = payload
            .get("action")
            .and_then(|a| a.as_str())
            .map(String::from);

        let delivery_id =
            DeliveryId::new(request.delivery_id().to_string()).map_err(|e| {
                NormalizationError::InvalidFieldFormat {
                    field: "delivery_id".to_string(),
                    message: e.to_string(),
                }
            })?;

        let event = EventEnvelope::new(
            delivery_id,
            self.provider.to_string(),
            request.event_type().to_string(),
            action,
            repository,
            entity,
            payload,
        );

        info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            entity_type = %event.entity.entity_type(),
            "Event normalized successfully"
        );

        Ok(event)
    }
}

mod storage_adapter;
pub use storage_adapter::BlobStorageAdapter;

pub mod processing_output;
pub use processing_output::{ProcessingOutput, WrappedEvent};

pub mod github_provider;
pub mod linear_provider;

pub use github_provider::GithubWebhookProvider;
pub use linear_provider::LinearWebhookProvider;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
