//! # HookRelay Service
//!
//! Binary entry point for the HookRelay HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes observability (logging, metrics, tracing)
//! - Builds the durable event store, priority queue, correlation engine, and
//!   AgentAPI dispatcher
//! - Recovers the queue from a prior crash and starts the worker pool
//! - Starts the HTTP server from hookrelay-api
//!

mod circuit_breaker;

use hookrelay_api::{
    start_server, DefaultEventStore, DefaultHealthChecker, ProviderId, ProviderRegistry,
    ServiceConfig, ServiceError, SlidingWindowRateLimiter,
};
use hookrelay_core::circuit_breaker::{CircuitBreakerConfig, DefaultCircuitBreaker};
use hookrelay_core::correlation::{CorrelationEngine, InMemoryCorrelationIndex};
use hookrelay_core::dispatch::AgentApiDispatcher;
use hookrelay_core::store::FilesystemEventStore;
use hookrelay_core::webhook::{
    github_provider::GithubWebhookProvider, linear_provider::LinearWebhookProvider,
    storage_adapter::BlobStorageAdapter, PayloadStorer, SignatureValidator, WebhookProcessor,
};
use hookrelay_core::adapters::filesystem_storage::FilesystemBlobStorage;
use hookrelay_queue::priority_queue::FilesystemQueueEntryStore;
use hookrelay_queue::PriorityQueue;
use hookrelay_service::agent_api_client::{CircuitBreakerAgentApiClient, HttpAgentApiClient};
use hookrelay_service::runtime_config::RuntimeConfig;
use hookrelay_service::worker_pool::{default_dispatch_retry_policy, WorkerPool, WorkerPoolConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_STORE_ROOT: &str = "./data/events";
const QUEUE_ENTRY_STORE_ROOT: &str = "./data/queue";
const PAYLOAD_STORE_ROOT: &str = "./data/payloads";

/// Build the [`SignatureValidator`] a provider should use from its configured
/// secret source. Literal secrets are wired directly; Key Vault-backed
/// secrets require the Azure client plumbing set up separately (see
/// `hookrelay_core::key_vault`), so a provider configured that way runs
/// without signature enforcement until that wiring is added.
fn signature_validator_for(
    provider_config: &hookrelay_api::config::ProviderConfig,
) -> Option<Arc<dyn SignatureValidator>> {
    match &provider_config.secret {
        Some(hookrelay_api::config::ProviderSecretConfig::Literal { value }) => Some(Arc::new(
            hookrelay_service::LiteralSignatureValidator::new(value.clone()),
        ) as Arc<dyn SignatureValidator>),
        Some(hookrelay_api::config::ProviderSecretConfig::KeyVault { secret_name }) => {
            error!(
                provider = %provider_config.id,
                secret_name = %secret_name,
                "Key Vault-backed signature validation is not wired into this binary; \
                 requests for this provider will not be signature-checked"
            );
            None
        }
        None => None,
    }
}

fn build_processor(
    provider_id: &str,
    sig_validator: Option<Arc<dyn SignatureValidator>>,
    payload_storer: Option<Arc<dyn PayloadStorer>>,
) -> Arc<dyn WebhookProcessor> {
    match provider_id {
        "linear" => Arc::new(LinearWebhookProvider::new(sig_validator, payload_storer)),
        _ => Arc::new(GithubWebhookProvider::new(sig_validator, payload_storer)),
    }
}

/// Build the `github`/`linear` [`hookrelay_api::config::ProviderConfig`]
/// entries from `WEBHOOK_SECRET_GITHUB`/`WEBHOOK_SECRET_LINEAR`. A provider
/// with no configured secret is registered without signature enforcement.
fn provider_configs_from_runtime(
    runtime: &RuntimeConfig,
) -> Vec<hookrelay_api::config::ProviderConfig> {
    let mut providers = Vec::new();
    if let Some(secret) = &runtime.webhook_secret_github {
        providers.push(hookrelay_api::config::ProviderConfig {
            id: "github".to_string(),
            require_signature: true,
            secret: Some(hookrelay_api::config::ProviderSecretConfig::Literal {
                value: secret.clone(),
            }),
            allowed_event_types: vec![],
        });
    }
    if let Some(secret) = &runtime.webhook_secret_linear {
        providers.push(hookrelay_api::config::ProviderConfig {
            id: "linear".to_string(),
            require_signature: true,
            secret: Some(hookrelay_api::config::ProviderSecretConfig::Literal {
                value: secret.clone(),
            }),
            allowed_event_types: vec![],
        });
    }
    providers
}

/// Split a `host:port` listen address. Returns `None` when `addr` has no
/// parseable port segment.
fn split_listen_addr(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

/// How often the TTL sweep runs, independent of the TTLs themselves.
const PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Spawn the background task that prunes the correlation index, the durable
/// event store, and the queue's terminal entries once per [`PRUNE_INTERVAL`].
/// Detached: the task runs for the life of the process and is not joined on
/// shutdown, since a sweep in progress has no in-flight work to drain.
fn spawn_pruning_task(
    correlation_index: Arc<dyn hookrelay_core::correlation::CorrelationIndex>,
    event_store: Arc<dyn hookrelay_core::store::EventStore>,
    queue: Arc<PriorityQueue>,
    workflow_ttl: std::time::Duration,
    event_ttl: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            interval.tick().await;

            let workflow_cutoff = hookrelay_core::Timestamp::now().subtract_duration(workflow_ttl);
            match correlation_index.prune(workflow_cutoff).await {
                Ok(removed) => {
                    if removed > 0 {
                        info!(removed, "Pruned stale workflows from the correlation index");
                    }
                }
                Err(e) => warn!(error = %e, "Workflow pruning pass failed"),
            }

            let event_cutoff = hookrelay_core::Timestamp::now().subtract_duration(event_ttl);
            match event_store.prune(event_cutoff).await {
                Ok(removed) => {
                    if removed > 0 {
                        info!(removed, "Pruned stale records from the event store");
                    }
                }
                Err(e) => warn!(error = %e, "Event store pruning pass failed"),
            }

            let queue_cutoff = hookrelay_queue::Timestamp::from_datetime(
                chrono::Utc::now() - chrono::Duration::from_std(event_ttl).unwrap_or_default(),
            );
            match queue.prune(queue_cutoff).await {
                Ok(removed) => {
                    if removed > 0 {
                        info!(removed, "Pruned stale entries from the queue");
                    }
                }
                Err(e) => warn!(error = %e, "Queue pruning pass failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hookrelay_service=info,hookrelay_api=info,hookrelay_core=info,hookrelay_queue=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HookRelay Service");

    // Load configuration: built-in defaults, optionally overlaid by
    // `config.toml`, overlaid again by environment variables (§6).
    let runtime = RuntimeConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    let mut config = ServiceConfig::default();
    config.providers = provider_configs_from_runtime(&runtime);
    if let Some((host, port)) = split_listen_addr(&runtime.listen_addr) {
        config.server.host = host;
        config.server.port = port;
    } else {
        error!(
            listen_addr = %runtime.listen_addr,
            "LISTEN_ADDR is not a valid host:port address; falling back to the default"
        );
    }

    // Payload storage, shared across every registered provider.
    let payload_storer: Option<Arc<dyn PayloadStorer>> = if config.webhooks.store_payloads {
        let blob_storage =
            FilesystemBlobStorage::new(std::path::PathBuf::from(PAYLOAD_STORE_ROOT)).await?;
        Some(Arc::new(BlobStorageAdapter::new(Arc::new(blob_storage))))
    } else {
        None
    };

    // Build the provider registry from configuration; each entry gets its own
    // signature validator and webhook processor.
    let mut provider_registry = ProviderRegistry::new();
    for provider_config in &config.providers {
        match ProviderId::new(&provider_config.id) {
            Ok(provider_id) => {
                let sig_validator = signature_validator_for(provider_config);
                let processor =
                    build_processor(&provider_config.id, sig_validator, payload_storer.clone());
                provider_registry.register(provider_id, processor);
                info!(provider = %provider_config.id, "Registered webhook provider from config");
            }
            Err(e) => {
                error!(
                    provider = %provider_config.id,
                    error = %e,
                    "Skipping provider with invalid ID in configuration"
                );
            }
        }
    }

    // Ensure the default GitHub provider is always available for backward
    // compatibility when no explicit provider configuration has been supplied.
    if !provider_registry.contains("github") {
        let github_processor = build_processor("github", None, payload_storer.clone());
        provider_registry.register(
            ProviderId::new("github").expect("'github' is a valid provider ID"),
            github_processor,
        );
        info!("Registered default GitHub webhook provider (no explicit config entry found)");
    }

    // Durable event store: normalized events land here after ingestion and
    // are read back by the worker pool before dispatch.
    let durable_store = Arc::new(FilesystemEventStore::load(EVENT_STORE_ROOT).await?);

    // Priority queue: recovers any entries left `processing` by a prior crash
    // back to `pending` before the worker pool starts claiming work.
    let queue_entry_store = Arc::new(FilesystemQueueEntryStore::new(QUEUE_ENTRY_STORE_ROOT)?);
    let queue = Arc::new(PriorityQueue::new(queue_entry_store, runtime.max_queue));
    let recovered = queue.recover().await?;
    if recovered > 0 {
        info!(recovered, "Recovered in-flight queue entries from prior run");
    }

    // Correlation engine: groups events into workflows for the dispatcher.
    let correlation_index: Arc<dyn hookrelay_core::correlation::CorrelationIndex> =
        Arc::new(InMemoryCorrelationIndex::new());
    let correlation_engine = Arc::new(
        CorrelationEngine::new(correlation_index.clone())
            .with_cancel_on_complete(false),
    );

    // AgentAPI dispatcher: HTTP client wrapped in a circuit breaker.
    let http_client = HttpAgentApiClient::new(
        runtime.agentapi_base_url.clone(),
        runtime.agentapi_token.clone(),
        runtime.agentapi_timeout(),
    );
    let circuit_breaker_config = CircuitBreakerConfig {
        service_name: "agent-api".to_string(),
        ..Default::default()
    };
    let agent_api_client = Arc::new(CircuitBreakerAgentApiClient::new(http_client, circuit_breaker_config));
    let dispatcher = Arc::new(AgentApiDispatcher::new(agent_api_client));

    // Worker pool: drains the queue, correlates, and dispatches.
    let worker_pool_config = WorkerPoolConfig {
        worker_count: runtime.n_workers,
        job_timeout: runtime.job_timeout(),
        ..WorkerPoolConfig::default()
    };
    let worker_pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        durable_store.clone() as Arc<dyn hookrelay_core::store::EventStore>,
        correlation_engine,
        dispatcher,
        default_dispatch_retry_policy(
            runtime.max_retries,
            runtime.retry_base(),
            runtime.retry_max(),
            runtime.retry_multiplier,
        ),
        worker_pool_config,
    ));
    let worker_handles = worker_pool.spawn();
    info!(workers = worker_handles.len(), "Worker pool started");

    // Background TTL sweep (§6 `WORKFLOW_TTL_S`/`EVENT_TTL_S`): without this,
    // the correlation index and durable stores retain every workflow/event/
    // queue entry forever. Runs hourly; each pass is independent of the
    // others so a slow filesystem sweep on one store never blocks another.
    spawn_pruning_task(
        Arc::clone(&correlation_index),
        durable_store.clone() as Arc<dyn hookrelay_core::store::EventStore>,
        Arc::clone(&queue),
        runtime.workflow_ttl(),
        runtime.event_ttl(),
    );

    // Per-IP rate limiter guarding the ingress endpoint.
    let rate_limiter = Arc::new(SlidingWindowRateLimiter::new(
        runtime.rate_limit_r,
        runtime.rate_limit_window(),
    ));

    let health_checker = Arc::new(DefaultHealthChecker);
    let event_store = Arc::new(DefaultEventStore);

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting HTTP server"
    );

    let dedup_window = runtime.dup_window();
    let result = start_server(
        config,
        provider_registry,
        health_checker,
        event_store,
        rate_limiter,
        durable_store as Arc<dyn hookrelay_core::store::EventStore>,
        queue,
        dedup_window,
    )
    .await;

    worker_pool.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }

    if let Err(e) = result {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
            ServiceError::HealthCheckFailed { .. } => 4,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}
