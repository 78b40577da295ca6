//! HTTP implementation of [`hookrelay_core::dispatch::AgentApiClient`], circuit-broken
//! the same way a circuit-breaker-wrapped client wraps downstream calls — a thin `reqwest`-based
//! inner client, and a wrapper that routes every call through
//! [`DefaultCircuitBreaker`].

use async_trait::async_trait;
use hookrelay_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, DefaultCircuitBreaker};
use hookrelay_core::dispatch::{AgentApiClient, AgentApiError, AgentApiRequest, AgentApiResponse, DispatchTarget};
use std::time::Duration;

/// Direct HTTP client for the downstream AgentAPI. Bearer-token auth and a
/// fixed request timeout; no retry logic here — the worker pool owns that.
pub struct HttpAgentApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpAgentApiClient {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            http,
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    fn classify(status: reqwest::StatusCode) -> Option<AgentApiError> {
        match status.as_u16() {
            200..=299 => None,
            401 | 403 => Some(AgentApiError::Auth { status: status.as_u16() }),
            404 => Some(AgentApiError::NotFound),
            400 | 422 => Some(AgentApiError::Validation { status: status.as_u16() }),
            429 => Some(AgentApiError::RateLimited { retry_after_s: 60 }),
            500..=599 => Some(AgentApiError::Server5xx { status: status.as_u16() }),
            _ => Some(AgentApiError::Unknown {
                message: format!("unexpected status {status}"),
            }),
        }
    }
}

#[async_trait]
impl AgentApiClient for HttpAgentApiClient {
    async fn call(
        &self,
        target: DispatchTarget,
        request: AgentApiRequest,
    ) -> Result<AgentApiResponse, AgentApiError> {
        let url = format!("{}{}", self.base_url, target.path());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .header("x-event-id", request.event_id.to_string())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentApiError::Timeout
                } else {
                    AgentApiError::Connection { message: e.to_string() }
                }
            })?;

        let status = response.status();
        if let Some(retry_after) = status
            .eq(&reqwest::StatusCode::TOO_MANY_REQUESTS)
            .then(|| {
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
            })
            .flatten()
        {
            return Err(AgentApiError::RateLimited { retry_after_s: retry_after });
        }
        if let Some(err) = Self::classify(status) {
            return Err(err);
        }

        let body: serde_json::Map<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| AgentApiError::MalformedPayload { message: e.to_string() })?;

        Ok(AgentApiResponse { fields: body })
    }
}

/// Circuit-breaker-protected [`AgentApiClient`]. Every call is routed through
/// a [`DefaultCircuitBreaker`]; a tripped breaker is surfaced to the caller
/// as [`AgentApiError::Connection`] (retryable), since `AgentApiError` has no
/// dedicated circuit-open variant — the worker pool's retry/backoff applies
/// uniformly whether the AgentAPI itself is failing or the breaker is
/// shielding it.
pub struct CircuitBreakerAgentApiClient {
    inner: HttpAgentApiClient,
    breaker: DefaultCircuitBreaker<AgentApiResponse, AgentApiError>,
}

impl CircuitBreakerAgentApiClient {
    pub fn new(inner: HttpAgentApiClient, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: DefaultCircuitBreaker::new(config),
        }
    }
}

#[async_trait]
impl AgentApiClient for CircuitBreakerAgentApiClient {
    async fn call(
        &self,
        target: DispatchTarget,
        request: AgentApiRequest,
    ) -> Result<AgentApiResponse, AgentApiError> {
        self.breaker
            .call(|| self.inner.call(target, request))
            .await
            .map_err(|e| match e {
                hookrelay_core::circuit_breaker::CircuitBreakerError::OperationFailed(inner) => inner,
                hookrelay_core::circuit_breaker::CircuitBreakerError::Timeout { .. } => {
                    AgentApiError::Timeout
                }
                other => AgentApiError::Connection {
                    message: other.to_string(),
                },
            })
    }
}

#[cfg(test)]
#[path = "agent_api_client_tests.rs"]
mod tests;
