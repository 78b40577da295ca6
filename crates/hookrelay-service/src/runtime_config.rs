//! Runtime configuration for the HookRelay service binary.
//!
//! Layered with the `config` crate: built-in defaults, optionally overlaid by
//! a `config.toml` in the working directory, then overlaid again by
//! environment variables. Every key mirrors the specification's
//! configuration table (`N_WORKERS`, `MAX_QUEUE`, `JOB_TIMEOUT_MS`, ...).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Fully resolved service configuration, deserialized from the layered
/// `config` sources.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Concurrent workers draining the priority queue.
    pub n_workers: usize,

    /// Bound on the priority queue's size before `enqueue` returns `QueueFull`.
    pub max_queue: usize,

    /// Per-job dispatch timeout in milliseconds.
    pub job_timeout_ms: u64,

    /// Initial retry backoff in milliseconds.
    pub retry_base_ms: u64,

    /// Retry backoff ceiling in milliseconds.
    pub retry_max_ms: u64,

    /// Maximum retry attempts before an entry is dead-lettered.
    pub max_retries: u32,

    /// Exponential backoff multiplier applied between retries.
    pub retry_multiplier: f64,

    /// Soft-duplicate (semantic key + content hash) window in seconds.
    pub dup_window_s: u64,

    /// TTL after which a completed workflow is pruned from the correlation
    /// index, in seconds.
    pub workflow_ttl_s: u64,

    /// TTL after which an event record is pruned from the event store, in
    /// seconds.
    pub event_ttl_s: u64,

    /// Allowed requests per rate-limit window.
    pub rate_limit_r: u32,

    /// Rate-limit window width in seconds.
    pub rate_limit_w_s: u64,

    /// GitHub webhook HMAC secret. `None` disables signature enforcement for
    /// the `github` provider.
    pub webhook_secret_github: Option<String>,

    /// Linear webhook HMAC secret. `None` disables signature enforcement for
    /// the `linear` provider.
    pub webhook_secret_linear: Option<String>,

    /// Ingress HTTP bind address, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,

    /// Base URL of the downstream AgentAPI.
    pub agentapi_base_url: String,

    /// Bearer token presented to the downstream AgentAPI.
    pub agentapi_token: String,

    /// Downstream AgentAPI request timeout in milliseconds.
    pub agentapi_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            n_workers: 5,
            max_queue: 10_000,
            job_timeout_ms: 600_000, // 10 minutes
            retry_base_ms: 5_000,
            retry_max_ms: 30_000,
            max_retries: 5,
            retry_multiplier: 2.0,
            dup_window_s: 3_600, // 1 hour
            workflow_ttl_s: 7 * 24 * 3_600, // 7 days
            event_ttl_s: 7 * 24 * 3_600,
            rate_limit_r: 100,
            rate_limit_w_s: 60,
            webhook_secret_github: None,
            webhook_secret_linear: None,
            listen_addr: "0.0.0.0:8080".to_string(),
            agentapi_base_url: "http://localhost:9000".to_string(),
            agentapi_token: String::new(),
            agentapi_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration layered as: built-in defaults, `./config.toml` (if
    /// present), then environment variables — each layer overriding the one
    /// before it.
    ///
    /// # Errors
    ///
    /// Returns [`config::ConfigError`] when `config.toml` is malformed or an
    /// environment variable cannot be parsed into its target type.
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();

        let builder = Config::builder()
            .set_default("n_workers", defaults.n_workers as i64)?
            .set_default("max_queue", defaults.max_queue as i64)?
            .set_default("job_timeout_ms", defaults.job_timeout_ms as i64)?
            .set_default("retry_base_ms", defaults.retry_base_ms as i64)?
            .set_default("retry_max_ms", defaults.retry_max_ms as i64)?
            .set_default("max_retries", defaults.max_retries as i64)?
            .set_default("retry_multiplier", defaults.retry_multiplier)?
            .set_default("dup_window_s", defaults.dup_window_s as i64)?
            .set_default("workflow_ttl_s", defaults.workflow_ttl_s as i64)?
            .set_default("event_ttl_s", defaults.event_ttl_s as i64)?
            .set_default("rate_limit_r", defaults.rate_limit_r as i64)?
            .set_default("rate_limit_w_s", defaults.rate_limit_w_s as i64)?
            .set_default(
                "webhook_secret_github",
                None::<String>,
            )?
            .set_default(
                "webhook_secret_linear",
                None::<String>,
            )?
            .set_default("listen_addr", defaults.listen_addr.clone())?
            .set_default("agentapi_base_url", defaults.agentapi_base_url.clone())?
            .set_default("agentapi_token", defaults.agentapi_token.clone())?
            .set_default("agentapi_timeout_ms", defaults.agentapi_timeout_ms as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::default().try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn dup_window(&self) -> Duration {
        Duration::from_secs(self.dup_window_s)
    }

    pub fn workflow_ttl(&self) -> Duration {
        Duration::from_secs(self.workflow_ttl_s)
    }

    pub fn event_ttl(&self) -> Duration {
        Duration::from_secs(self.event_ttl_s)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_w_s)
    }

    pub fn agentapi_timeout(&self) -> Duration {
        Duration::from_millis(self.agentapi_timeout_ms)
    }
}

#[cfg(test)]
#[path = "runtime_config_tests.rs"]
mod tests;
