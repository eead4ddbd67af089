//! Function host runtime loop
//!
//! Inside the function host the binary is its own runtime: it asks the runtime
//! API for the next invocation, runs the job against that event until the
//! invocation's deadline, and posts the outcome back. Continuations sent by
//! [`crate::resume::LambdaReinvoker`] arrive here as ordinary event payloads,
//! so a chain restores its state the same way a local hand-off does.

pub mod api;

pub use api::RuntimeApiClient;

use crate::aggregator::{AggregationJob, JobError, JobOutcome};
use crate::context::{ExecutionContext, HostContext};
use async_trait::async_trait;
use tracing::{error, info, info_span, Instrument};

/// Errors talking to the runtime API
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A variable the host always sets is missing
    #[error("{0} is not set; serve only runs inside the function host")]
    MissingVariable(&'static str),

    /// The request never got a response
    #[error("runtime API request failed: {0}")]
    Transport(String),

    /// The runtime API answered with an error status
    #[error("runtime API returned {status}: {body}")]
    Status {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// An invocation header is missing or unreadable
    #[error("invalid {header} header: {value}")]
    InvalidHeader {
        /// Header name
        header: &'static str,
        /// Offending value, empty when absent
        value: String,
    },
}

/// One event handed out by the runtime API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Host request id, used to answer the invocation
    pub request_id: String,
    /// Epoch milliseconds at which the host stops the invocation
    pub deadline_ms: i64,
    /// X-Ray trace header, when tracing is on
    pub trace_id: Option<String>,
    /// Raw event bytes
    pub payload: Vec<u8>,
}

/// Where invocations come from and where their results go
#[async_trait]
pub trait InvocationSource: Send + Sync {
    /// Block until the host hands out the next invocation
    async fn next_invocation(&self) -> Result<Invocation, RuntimeError>;

    /// Complete an invocation with `body`
    async fn respond(&self, request_id: &str, body: &serde_json::Value) -> Result<(), RuntimeError>;

    /// Fail an invocation
    async fn report_error(
        &self,
        request_id: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), RuntimeError>;
}

/// Response body for a finished invocation
pub fn outcome_response(outcome: &JobOutcome) -> serde_json::Value {
    serde_json::json!({
        "outcome": outcome.label(),
        "report_date": outcome.report_date().to_string(),
    })
}

fn error_type(e: &JobError) -> &'static str {
    match e {
        JobError::InvalidEvent(_) => "InvalidEvent",
        JobError::InvariantViolation(_) => "InvariantViolation",
    }
}

/// Serve invocations from `source`, returning how many were handled
///
/// Stops after `max_invocations` when given, otherwise only when the runtime
/// API fails. A failed job is reported against its invocation and the loop
/// carries on.
pub async fn serve(
    job: &AggregationJob,
    source: &dyn InvocationSource,
    max_invocations: Option<u64>,
) -> Result<u64, RuntimeError> {
    let mut served = 0u64;
    while max_invocations.map_or(true, |max| served < max) {
        let invocation = source.next_invocation().await?;
        let span = info_span!("invocation", request_id = %invocation.request_id);
        handle_invocation(job, source, &invocation)
            .instrument(span)
            .await?;
        served += 1;
    }
    info!(served = served, "Runtime loop finished");
    Ok(served)
}

async fn handle_invocation(
    job: &AggregationJob,
    source: &dyn InvocationSource,
    invocation: &Invocation,
) -> Result<(), RuntimeError> {
    let context = HostContext::for_invocation(&invocation.request_id, invocation.deadline_ms, |name| {
        std::env::var(name).ok()
    });
    info!(
        remaining_ms = context.remaining_millis(),
        payload_bytes = invocation.payload.len(),
        "Invocation received"
    );

    match job.run_event(&invocation.payload, None, &context).await {
        Ok(outcome) => {
            source
                .respond(&invocation.request_id, &outcome_response(&outcome))
                .await
        }
        Err(e) => {
            error!(error = %e, "Invocation failed");
            source
                .report_error(&invocation.request_id, error_type(&e), &e.to_string())
                .await
        }
    }
}
