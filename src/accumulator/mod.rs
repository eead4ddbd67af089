//! Running aggregation state
//!
//! The accumulator owns per-group counters, error collections, the dedup set
//! and the report date. It performs no I/O; the poll loop feeds it messages and
//! the resume protocol serializes its [`AccumulatorState`].

pub mod message;
pub mod state;

pub use message::{ResultBody, ResultSummary, ValidationResults};
pub use state::{
    AccumulatorState, ErrorOccurrences, FoldOutcome, GroupErrors, ReportAccumulator,
    MAX_OCCURRENCES_PER_SIGNATURE,
};

/// A queue message whose body cannot be aggregated
///
/// Poison messages are still deleted from the queue so they cannot block the
/// pipeline, but they never contribute to the report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessageError {
    /// Body is not valid JSON
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// A required top-level field is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// `data_group` is not `provider:messageType`
    #[error("invalid data group: {0}")]
    InvalidDataGroup(String),

    /// `results` matches neither the per-record nor the summary shape
    #[error("invalid results payload: {0}")]
    InvalidResults(String),
}
