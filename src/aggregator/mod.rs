//! Aggregation orchestration
//!
//! One [`AggregationJob::run`] call is one invocation of the job:
//!
//! 1. **Start**: decode the invocation event and restore or create the
//!    accumulator ([`crate::resume::InvocationEvent`])
//! 2. **Poll**: fold queue messages until `Done` or `Suspended`
//!    ([`executor::AggregationExecutor`])
//! 3. **Finish**: emit the report when done, otherwise hand the state to the
//!    next invocation ([`crate::resume::Reinvoker`])
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use validation_report_aggregator::aggregator::{AggregationJob, LoopSettings};
//! use validation_report_aggregator::config::AggregatorConfig;
//! use validation_report_aggregator::context::StaticContext;
//! use validation_report_aggregator::queue::InMemoryQueue;
//! use validation_report_aggregator::report::{ReportEmitter, SesMailer, SlackWebhook};
//! use validation_report_aggregator::resume::{HandoffFileReinvoker, InvocationEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(AggregatorConfig::from_env()?);
//! let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let emitter = ReportEmitter::new(
//!     config.clone(),
//!     Arc::new(SlackWebhook::new(config.slack_webhook.clone())),
//!     Arc::new(SesMailer::new(&aws)),
//! );
//!
//! let job = AggregationJob::new(
//!     config.clone(),
//!     Arc::new(InMemoryQueue::new()),
//!     Arc::new(HandoffFileReinvoker::new("./handoff")),
//!     emitter,
//!     LoopSettings::from_config(&config),
//! );
//! let outcome = job
//!     .run(InvocationEvent::Fresh, None, &StaticContext::fixed(60_000))
//!     .await?;
//! println!("{}", outcome.label());
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`executor`] - poll-and-decide loop
//! - [`job`] - loop and invocation outcomes
//! - [`config`] - loop settings and idle backoff calculation

pub mod config;
pub mod executor;
pub mod job;

pub use config::LoopSettings;
pub use executor::AggregationExecutor;
pub use job::{DoneReason, JobOutcome, LoopOutcome, LoopSummary};

use crate::accumulator::ReportAccumulator;
use crate::config::AggregatorConfig;
use crate::context::ExecutionContext;
use crate::metrics::InvocationMetrics;
use crate::queue::ResultQueue;
use crate::report::{ReportEmitter, ReportFooter, ReportPayload};
use crate::resume::{ContinuationPayload, InvocationEvent, Reinvoker, ResumeError};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Fatal invocation errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The invocation event could not be decoded
    #[error("invalid invocation event: {0}")]
    InvalidEvent(#[source] ResumeError),

    /// The accumulator broke an invariant
    #[error("accumulator invariant violated: {0}")]
    InvariantViolation(String),
}

/// One invocation of the aggregation job
pub struct AggregationJob {
    config: Arc<AggregatorConfig>,
    queue: Arc<dyn ResultQueue>,
    reinvoker: Arc<dyn Reinvoker>,
    emitter: ReportEmitter,
    executor: AggregationExecutor,
}

impl AggregationJob {
    /// Wire the job to its collaborators
    pub fn new(
        config: Arc<AggregatorConfig>,
        queue: Arc<dyn ResultQueue>,
        reinvoker: Arc<dyn Reinvoker>,
        emitter: ReportEmitter,
        settings: LoopSettings,
    ) -> Self {
        let executor = AggregationExecutor::new(queue.clone(), settings);
        Self {
            config,
            queue,
            reinvoker,
            emitter,
            executor,
        }
    }

    /// Decode raw event bytes and run
    pub async fn run_event(
        &self,
        event: &[u8],
        report_date: Option<NaiveDate>,
        context: &dyn ExecutionContext,
    ) -> Result<JobOutcome, JobError> {
        let event = InvocationEvent::decode(event).map_err(|e| {
            error!(error = %e, "Failed to decode invocation event");
            JobError::InvalidEvent(e)
        })?;
        self.run(event, report_date, context).await
    }

    /// Run one invocation
    ///
    /// `report_date` overrides the date of a fresh report; it is ignored for
    /// continuations.
    pub async fn run(
        &self,
        event: InvocationEvent,
        report_date: Option<NaiveDate>,
        context: &dyn ExecutionContext,
    ) -> Result<JobOutcome, JobError> {
        let accumulator = event.into_accumulator(report_date, Utc::now().date_naive());
        let span = info_span!(
            "aggregation",
            report_date = %accumulator.report_date(),
            request_id = %context.request_id()
        );
        self.run_accumulator(accumulator, context)
            .instrument(span)
            .await
    }

    async fn run_accumulator(
        &self,
        mut accumulator: ReportAccumulator,
        context: &dyn ExecutionContext,
    ) -> Result<JobOutcome, JobError> {
        let state = accumulator.state();
        let metrics =
            InvocationMetrics::start(state.report_date().to_string(), state.is_resuming());

        let summary = self.executor.run(&mut accumulator, context).await;
        let messages_received = accumulator.state().messages_received();

        let result = match summary.outcome {
            LoopOutcome::Done(reason) => {
                info!(reason = ?reason, "Aggregation complete, emitting report");
                let (payload, emission) = self.emit_report(&accumulator, context, None).await;
                Ok(JobOutcome::Reported {
                    report_date: accumulator.report_date(),
                    reason,
                    payload,
                    emission,
                })
            }
            LoopOutcome::Suspended => self.continue_chain(&accumulator, context).await,
        };

        match &result {
            Ok(outcome) => metrics.record_finished(outcome.label(), messages_received),
            Err(e) => metrics.record_failure(&e.to_string()),
        }
        result
    }

    /// Hand the state to the next invocation, or report what we have if that fails
    async fn continue_chain(
        &self,
        accumulator: &ReportAccumulator,
        context: &dyn ExecutionContext,
    ) -> Result<JobOutcome, JobError> {
        accumulator
            .state()
            .check_invariants()
            .map_err(JobError::InvariantViolation)?;

        let handoff = async {
            let bytes = ContinuationPayload::new(accumulator.snapshot()).encode()?;
            let size = bytes.len();
            self.reinvoker.invoke_async(bytes).await?;
            Ok::<usize, ResumeError>(size)
        };

        match handoff.await {
            Ok(payload_bytes) => {
                crate::metrics::record_reinvocation();
                info!(
                    payload_bytes = payload_bytes,
                    messages_received = accumulator.state().messages_received(),
                    "Handed accumulated state to the next invocation"
                );
                Ok(JobOutcome::Continued {
                    report_date: accumulator.report_date(),
                    payload_bytes,
                })
            }
            Err(e) => {
                error!(error = %e, "Reinvocation failed, emitting partial report");
                let note = format!(
                    "the aggregation chain could not continue ({e}); results still queued are not included"
                );
                let (payload, emission) =
                    self.emit_report(accumulator, context, Some(note)).await;
                Ok(JobOutcome::ReportedPartial {
                    report_date: accumulator.report_date(),
                    reinvoke_error: e.to_string(),
                    payload,
                    emission,
                })
            }
        }
    }

    async fn emit_report(
        &self,
        accumulator: &ReportAccumulator,
        context: &dyn ExecutionContext,
        incomplete_note: Option<String>,
    ) -> (ReportPayload, crate::report::EmissionSummary) {
        let depth = match self.queue.depth().await {
            Ok(depth) => Some(depth),
            Err(e) => {
                warn!(error = %e, "Could not read queue depth for the report footer");
                None
            }
        };

        let mut footer = ReportFooter::from_context(context, &self.config.region, depth);
        if let Some(note) = incomplete_note {
            footer = footer.with_incomplete_note(note);
        }

        let payload = ReportPayload::from_accumulator(
            accumulator,
            self.executor.settings().max_error_block_len,
        );
        let emission = self.emitter.emit(&payload, &footer).await;
        info!(
            status = %payload.status,
            notified = emission.notified,
            emails = emission.emailed_providers.len(),
            failures = emission.failures.len(),
            "Report emitted"
        );
        (payload, emission)
    }
}
