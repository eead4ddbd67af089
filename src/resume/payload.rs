//! Continuation payload and invocation event decoding

use super::ResumeError;
use crate::accumulator::{AccumulatorState, ReportAccumulator};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Discriminant marking an event as a continuation
pub const CONTINUATION_KIND: &str = "continuation";

/// Current continuation payload schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Largest payload an asynchronous invocation accepts (256 KiB)
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// State handed from one invocation to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationPayload {
    kind: String,
    schema_version: String,
    state: AccumulatorState,
}

impl ContinuationPayload {
    /// Wrap an accumulator snapshot; the state is marked as resuming
    pub fn new(mut state: AccumulatorState) -> Self {
        state.mark_resuming();
        Self {
            kind: CONTINUATION_KIND.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            state,
        }
    }

    /// Carried accumulator state
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Take the carried accumulator state
    pub fn into_state(self) -> AccumulatorState {
        self.state
    }

    /// Schema version the payload was written with
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Serialize to JSON, refusing payloads the host would reject
    pub fn encode(&self) -> Result<Vec<u8>, ResumeError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(ResumeError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        debug!(
            bytes = bytes.len(),
            groups = self.state.groups().len(),
            message_ids = self.state.received_message_ids().len(),
            "Encoded continuation payload"
        );
        Ok(bytes)
    }

    /// Parse and validate an encoded payload
    pub fn decode(bytes: &[u8]) -> Result<Self, ResumeError> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), ResumeError> {
        if self.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %self.schema_version,
                expected_version = SCHEMA_VERSION,
                "Continuation payload schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }
        self.state
            .check_invariants()
            .map_err(ResumeError::InvalidState)
    }
}

/// What started this invocation
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationEvent {
    /// Scheduled or manual trigger: start a new report
    Fresh,
    /// Continuation of an unfinished report
    Continuation(ContinuationPayload),
}

impl InvocationEvent {
    /// Classify raw event bytes
    ///
    /// Only a JSON object whose `kind` is `"continuation"` is treated as a
    /// continuation; anything else (scheduler events, `{}`, empty input) starts
    /// a fresh report. A continuation that cannot be decoded is an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, ResumeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Fresh);
        }

        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Invocation event is not JSON, starting a fresh report");
                return Ok(Self::Fresh);
            }
        };

        let is_continuation = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|kind| kind == CONTINUATION_KIND);
        if !is_continuation {
            return Ok(Self::Fresh);
        }

        let payload: ContinuationPayload = serde_json::from_value(value)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))?;
        payload.validate()?;
        Ok(Self::Continuation(payload))
    }

    /// Whether this event continues an earlier invocation
    pub fn is_continuation(&self) -> bool {
        matches!(self, Self::Continuation(_))
    }

    /// Build the accumulator this invocation works on
    ///
    /// A fresh report covers `report_date`, or the day before `today` when no
    /// date is given. A continuation keeps the date it was started with.
    pub fn into_accumulator(
        self,
        report_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ReportAccumulator {
        match self {
            Self::Fresh => {
                let date = report_date.unwrap_or_else(|| default_report_date(today));
                info!(report_date = %date, "Starting a fresh report");
                ReportAccumulator::new(date)
            }
            Self::Continuation(payload) => {
                if let Some(date) = report_date {
                    if date != payload.state().report_date() {
                        warn!(
                            requested = %date,
                            carried = %payload.state().report_date(),
                            "Ignoring report date override for a continuation"
                        );
                    }
                }
                ReportAccumulator::restore(payload.into_state())
            }
        }
    }
}

/// Report date of a fresh run started on `today`
pub fn default_report_date(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}
