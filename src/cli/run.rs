//! Run command implementation

use crate::aggregator::{AggregationJob, JobOutcome, LoopSettings};
use crate::config::AggregatorConfig;
use crate::context::{ExecutionContext, HostContext, StaticContext};
use crate::queue::SqsResultQueue;
use crate::report::{ReportEmitter, SesMailer, SlackWebhook};
use crate::resume::{HandoffFileReinvoker, LambdaReinvoker, Reinvoker};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::CliError;

/// Longest time budget a single invocation can be given (15 minutes)
const MAX_TIME_BUDGET_SECS: u64 = 900;

/// Parse a report date in YYYY-MM-DD format
fn parse_report_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("'{s}' is not a YYYY-MM-DD date: {e}"))
}

/// Validation Report Aggregator CLI
#[derive(Parser, Debug)]
#[command(name = "validation-report-aggregator")]
#[command(about = "Aggregate queued validation results into a daily report", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one aggregation invocation
    Run(RunArgs),

    /// Serve invocations from the function host's runtime API
    Serve(super::ServeArgs),

    /// Validate configuration or a continuation payload
    Validate(super::ValidateCommand),
}

/// Run command arguments
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Invocation event file, `-` for stdin (default: fresh report)
    #[arg(long)]
    pub event: Option<PathBuf>,

    /// Run outside the function host: continuations go to the hand-off directory
    #[arg(long, default_value_t = false)]
    pub local: bool,

    /// Hand-off directory used by local runs
    #[arg(long, default_value = ".handoff")]
    pub handoff_dir: PathBuf,

    /// Report date for a fresh report (default: yesterday, UTC)
    #[arg(long, value_parser = parse_report_date)]
    pub report_date: Option<NaiveDate>,

    /// Execution time budget in seconds (max: 900)
    #[arg(long, default_value = "900", value_parser = clap::value_parser!(u64).range(1..=MAX_TIME_BUDGET_SECS))]
    pub time_budget_secs: u64,

    /// Expose Prometheus metrics on this address while running
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl RunArgs {
    /// Execute one invocation against the configured collaborators
    pub async fn execute(&self, config: Arc<AggregatorConfig>) -> Result<JobOutcome, CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::MetricsError(e.to_string()))?;
        }

        let budget = Duration::from_secs(self.time_budget_secs);
        let context: Box<dyn ExecutionContext> = if self.local {
            info!("(Local Test) Running as local test");
            Box::new(StaticContext::deadline(budget))
        } else {
            Box::new(HostContext::from_env(budget))
        };

        let handoff = HandoffFileReinvoker::new(&self.handoff_dir);
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let reinvoker: Arc<dyn Reinvoker> = if self.local {
            Arc::new(handoff.clone())
        } else {
            Arc::new(LambdaReinvoker::new(&aws, context.function_name()))
        };
        let job = connect_job(&config, &aws, reinvoker).await?;

        let outcome = match &self.event {
            None if self.local => {
                run_from_handoff(&job, &handoff, self.report_date, context.as_ref()).await?
            }
            event => {
                let event = read_event(event.as_deref()).await?;
                job.run_event(&event, self.report_date, context.as_ref())
                    .await?
            }
        };

        print_outcome(&outcome, self.local.then(|| handoff.path()));
        Ok(outcome)
    }
}

/// Wire a job to the configured queue, webhook and mailer
pub(crate) async fn connect_job(
    config: &Arc<AggregatorConfig>,
    aws: &aws_config::SdkConfig,
    reinvoker: Arc<dyn Reinvoker>,
) -> Result<AggregationJob, CliError> {
    let queue = SqsResultQueue::connect(aws, &config.queue_name).await?;
    let emitter = ReportEmitter::new(
        config.clone(),
        Arc::new(SlackWebhook::new(config.slack_webhook.clone())),
        Arc::new(SesMailer::new(aws)),
    );
    Ok(AggregationJob::new(
        config.clone(),
        Arc::new(queue),
        reinvoker,
        emitter,
        LoopSettings::from_config(config),
    ))
}

/// Run one local invocation from the hand-off directory
///
/// The claimed continuation is released only after the job succeeds; a failed
/// run leaves it for the next attempt.
pub async fn run_from_handoff(
    job: &AggregationJob,
    handoff: &HandoffFileReinvoker,
    report_date: Option<NaiveDate>,
    context: &dyn ExecutionContext,
) -> Result<JobOutcome, CliError> {
    let event = handoff.claim()?.unwrap_or_default();
    match job.run_event(&event, report_date, context).await {
        Ok(outcome) => {
            handoff.complete()?;
            Ok(outcome)
        }
        Err(e) => {
            warn!(
                path = %handoff.claimed_path().display(),
                error = %e,
                "Run failed, claimed continuation kept"
            );
            Err(e.into())
        }
    }
}

/// Event bytes from a file, `-` for stdin, or nothing for a fresh report
async fn read_event(path: Option<&Path>) -> Result<Vec<u8>, CliError> {
    match path {
        Some(path) if path.as_os_str() == "-" => {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| CliError::IoError(format!("Failed to read event from stdin: {e}")))?;
            Ok(bytes)
        }
        Some(path) => tokio::fs::read(path).await.map_err(|e| {
            CliError::IoError(format!("Failed to read event {}: {e}", path.display()))
        }),
        None => Ok(Vec::new()),
    }
}

fn print_outcome(outcome: &JobOutcome, handoff_path: Option<PathBuf>) {
    match outcome {
        JobOutcome::Reported {
            report_date,
            reason,
            payload,
            emission,
        } => {
            println!("Report for {report_date}: {} ({reason:?})", payload.status);
            println!("  Files analyzed: {}", payload.files_analyzed());
            println!(
                "  Validations failed: {}/{}",
                payload.total_validations_failed, payload.total_validation_count
            );
            println!("  Emails sent: {}", emission.emailed_providers.len());
            for failure in &emission.failures {
                println!("  Delivery failed: {failure}");
            }
        }
        JobOutcome::Continued {
            report_date,
            payload_bytes,
        } => {
            println!("Report for {report_date} continues in a new invocation ({payload_bytes} bytes)");
            if let Some(path) = handoff_path {
                println!("  Continuation parked at {}; run again with --local", path.display());
            }
        }
        JobOutcome::ReportedPartial {
            report_date,
            reinvoke_error,
            payload,
            emission,
        } => {
            println!("Partial report for {report_date}: {}", payload.status);
            println!("  Continuation failed: {reinvoke_error}");
            for failure in &emission.failures {
                println!("  Delivery failed: {failure}");
            }
        }
    }
}
