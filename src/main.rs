//! Main entry point for the validation-report-aggregator CLI

use clap::Parser;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use validation_report_aggregator::cli::{Cli, Commands};
use validation_report_aggregator::config::AggregatorConfig;

/// Initialize tracing subscriber with optional JSON formatting
///
/// `RUST_LOG` wins; otherwise `VERBOSE_OUTPUT=TRUE` selects debug output.
fn init_tracing(verbose: bool) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("validation_report_aggregator={default_level}"))
    });

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load configuration from the environment and start logging
fn load_config() -> anyhow::Result<Arc<AggregatorConfig>> {
    match AggregatorConfig::from_env() {
        Ok(config) => {
            init_tracing(config.verbose);
            Ok(Arc::new(config))
        }
        Err(e) => {
            init_tracing(false);
            Err(anyhow::anyhow!(e).context("failed to load configuration"))
        }
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    let result = match cli.command {
        Commands::Run(ref args) => match load_config() {
            Ok(config) => args
                .execute(config)
                .await
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!(e)),
            Err(e) => Err(e),
        },
        Commands::Serve(ref args) => match load_config() {
            Ok(config) => args
                .execute(config)
                .await
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!(e)),
            Err(e) => Err(e),
        },
        Commands::Validate(ref validate_cmd) => {
            init_tracing(false);
            validate_cmd.execute().await.map_err(|e| anyhow::anyhow!(e))
        }
    };

    // Handle result
    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
