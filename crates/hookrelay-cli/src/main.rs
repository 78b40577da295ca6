use hookrelay_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);

        // Exit with appropriate code based on error type
        let exit_code = match e {
            hookrelay_cli::CliError::Configuration(_) => 1,
            hookrelay_cli::CliError::Request { .. } => 2,
            hookrelay_cli::CliError::Api { .. } => 3,
            hookrelay_cli::CliError::CommandFailed { .. } => 4,
        };

        std::process::exit(exit_code);
    }
}
