//! # HookRelay CLI
//!
//! Operator tooling for the HookRelay webhook pipeline. This is ambient
//! tooling around a running `hookrelay-service` instance, not a core
//! component: `replay` resets an event's status and re-enqueues it via the
//! same admin path `hookrelay-api` exposes at
//! `POST /admin/events/:id/replay`, and `health` polls `GET /health`.

use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// CLI Structure
// ============================================================================

/// Operator CLI for the HookRelay webhook pipeline
#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the HookRelay webhook pipeline")]
pub struct Cli {
    /// Base URL of the running HookRelay service
    #[arg(short, long, env = "HOOKRELAY_URL")]
    pub url: Option<String>,

    /// CLI defaults file (defaults to the platform config directory)
    #[arg(short, long, env = "HOOKRELAY_CLI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Reset an event's status and re-enqueue it for processing
    Replay {
        /// Delivery ID of the event to replay
        event_id: String,
    },

    /// Poll the service's health endpoint
    Health {
        /// Print the full health check body instead of just the summary
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Configuration
// ============================================================================

/// Persisted CLI defaults. Overridden, field by field, by `--url`/
/// `--log-level` flags or the `HOOKRELAY_URL`/`HOOKRELAY_CLI_CONFIG` env
/// vars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    pub url: String,
    pub log_level: String,
    pub request_timeout_seconds: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            log_level: "info".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli);

    let config = load_configuration(cli.config.as_deref())?;
    let base_url = cli.url.clone().unwrap_or_else(|| config.url.clone());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
        .map_err(|source| CliError::Request {
            url: base_url.clone(),
            source,
        })?;

    match cli.command {
        Commands::Replay { event_id } => {
            execute_replay_command(&client, &base_url, &event_id).await
        }
        Commands::Health { verbose } => execute_health_command(&client, &base_url, verbose).await,
        Commands::Completions { shell } => execute_completions_command(shell),
    }
}

/// Initialize the tracing subscriber from `RUST_LOG`, falling back to
/// `cli.log_level` scoped to this crate.
fn initialize_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hookrelay_cli={}", cli.log_level).into());

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Load CLI defaults from `path` (or `<config dir>/hookrelay/cli.toml` when
/// unset), falling back to [`CliConfig::default`] when no file is present.
fn load_configuration(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let resolved = match path {
        Some(p) => Some(p.to_path_buf()),
        None => dirs::config_dir().map(|dir| dir.join("hookrelay").join("cli.toml")),
    };

    let Some(resolved) = resolved else {
        return Ok(CliConfig::default());
    };

    match std::fs::read_to_string(&resolved) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CliConfig::default()),
        Err(source) => Err(ConfigError::Read {
            path: resolved,
            source,
        }),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// `POST {base_url}/admin/events/:event_id/replay`
async fn execute_replay_command(
    client: &reqwest::Client,
    base_url: &str,
    event_id: &str,
) -> Result<(), CliError> {
    let url = format!(
        "{}/admin/events/{}/replay",
        base_url.trim_end_matches('/'),
        event_id
    );
    info!(event_id = %event_id, url = %url, "replaying event");

    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|source| CliError::Request {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
        );
        Ok(())
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(CliError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// `GET {base_url}/health`
async fn execute_health_command(
    client: &reqwest::Client,
    base_url: &str,
    verbose: bool,
) -> Result<(), CliError> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| CliError::Request {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();

    if verbose {
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
        );
    } else {
        println!(
            "{}",
            body.get("status").and_then(|s| s.as_str()).unwrap_or("unknown")
        );
    }

    if status.is_success() {
        Ok(())
    } else {
        Err(CliError::Api {
            status: status.as_u16(),
            message: body.to_string(),
        })
    }
}

/// Generate shell completions to stdout.
fn execute_completions_command(shell: clap_complete::Shell) -> Result<(), CliError> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
