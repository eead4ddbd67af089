//! Serve command implementation

use super::run::connect_job;
use super::CliError;
use crate::config::AggregatorConfig;
use crate::resume::LambdaReinvoker;
use crate::runtime::{serve, RuntimeApiClient, RuntimeError};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serve command arguments
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Stop after this many invocations (default: until the host stops the process)
    #[arg(long)]
    pub max_invocations: Option<u64>,

    /// Expose Prometheus metrics on this address while serving
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl ServeArgs {
    /// Serve host invocations, returning how many were handled
    pub async fn execute(&self, config: Arc<AggregatorConfig>) -> Result<u64, CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::MetricsError(e.to_string()))?;
        }

        let runtime = RuntimeApiClient::from_env()?;
        let function_name = std::env::var("AWS_LAMBDA_FUNCTION_NAME")
            .map_err(|_| RuntimeError::MissingVariable("AWS_LAMBDA_FUNCTION_NAME"))?;
        info!(function_name = %function_name, "Serving invocations from the runtime API");

        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let reinvoker = Arc::new(LambdaReinvoker::new(&aws, function_name));
        let job = connect_job(&config, &aws, reinvoker).await?;

        Ok(serve(&job, &runtime, self.max_invocations).await?)
    }
}
