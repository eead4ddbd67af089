//! # Validation Report Aggregator
//!
//! Drains a queue of per-file data-validation results, accumulates counts and
//! error details per data provider and message type, and emits a daily summary
//! report to a chat webhook and per-provider email recipients.
//!
//! ## Features
//!
//! - **Resumable**: when the execution time budget runs low the job hands its
//!   accumulated state to a fresh invocation of itself
//! - **Idempotent folding**: redelivered queue messages are detected by id and
//!   never counted twice
//! - **Two wire shapes**: legacy per-record validation lists and pre-aggregated
//!   summaries are both understood
//! - **Poison tolerant**: unparsable messages are removed from the queue
//!   without blocking the pipeline
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use validation_report_aggregator::aggregator::{AggregationJob, LoopSettings};
//! use validation_report_aggregator::config::AggregatorConfig;
//! use validation_report_aggregator::context::{ExecutionContext, HostContext};
//! use validation_report_aggregator::queue::sqs::SqsResultQueue;
//! use validation_report_aggregator::report::{ReportEmitter, SesMailer, SlackWebhook};
//! use validation_report_aggregator::resume::{InvocationEvent, LambdaReinvoker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(AggregatorConfig::from_env()?);
//! let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let context = HostContext::from_env(std::time::Duration::from_secs(900));
//!
//! let queue = SqsResultQueue::connect(&aws, &config.queue_name).await?;
//! let emitter = ReportEmitter::new(
//!     config.clone(),
//!     Arc::new(SlackWebhook::new(config.slack_webhook.clone())),
//!     Arc::new(SesMailer::new(&aws)),
//! );
//! let reinvoker = LambdaReinvoker::new(&aws, context.function_name());
//!
//! let job = AggregationJob::new(
//!     config.clone(),
//!     Arc::new(queue),
//!     Arc::new(reinvoker),
//!     emitter,
//!     LoopSettings::from_config(&config),
//! );
//! job.run(InvocationEvent::Fresh, None, &context).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`accumulator`] - running aggregation state and the fold operation
//! - [`aggregator`] - poll-and-decide loop and the per-invocation job
//! - [`resume`] - continuation payload and reinvocation collaborators
//! - [`report`] - report derivation and notification/email delivery
//! - [`queue`] - result queue abstraction (SQS and in-memory)
//! - [`runtime`] - runtime API loop serving host invocations
//! - [`context`] - execution time budget and logging identity
//! - [`config`] - environment configuration
//! - [`metrics`] - counters emitted while aggregating

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Running aggregation state and the fold operation
pub mod accumulator;

/// Poll-and-decide loop and invocation orchestration
pub mod aggregator;

/// CLI command implementations
pub mod cli;

/// Environment configuration
pub mod config;

/// Execution context (time budget, logging identity)
pub mod context;

/// Aggregation counters
pub mod metrics;

/// Result queue abstraction
pub mod queue;

/// Report derivation and delivery
pub mod report;

/// Continuation payload and reinvocation
pub mod resume;

/// Function host runtime loop
pub mod runtime;

pub use accumulator::{AccumulatorState, ReportAccumulator};

/// A `(provider, message_type)` pair identifying one category of validated data.
///
/// On the wire a group is written as `"<provider>:<messageType>"`, and that is
/// also how it serializes, so it can key JSON maps in the continuation payload.
///
/// ```
/// use validation_report_aggregator::GroupKey;
///
/// let key: GroupKey = "acme:orders".parse().unwrap();
/// assert_eq!(key.provider(), "acme");
/// assert_eq!(key.message_type(), "orders");
/// assert_eq!(key.to_string(), "acme:orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey {
    provider: String,
    message_type: String,
}

impl GroupKey {
    /// Create a group key from its two components
    pub fn new(provider: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message_type: message_type.into(),
        }
    }

    /// Parse a `provider:messageType` string
    ///
    /// # Errors
    ///
    /// Returns an error unless the input has exactly one `:` with a non-empty
    /// component on each side.
    pub fn parse(s: &str) -> Result<Self, GroupKeyError> {
        let mut parts = s.split(':');
        let (provider, message_type) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(m), None) => (p.trim(), m.trim()),
            _ => return Err(GroupKeyError::InvalidFormat(s.to_string())),
        };

        if provider.is_empty() {
            return Err(GroupKeyError::EmptyComponent("provider"));
        }
        if message_type.is_empty() {
            return Err(GroupKeyError::EmptyComponent("message type"));
        }

        Ok(Self::new(provider, message_type))
    }

    /// Data provider name
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Message type name
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.message_type)
    }
}

impl FromStr for GroupKey {
    type Err = GroupKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GroupKey {
    type Error = GroupKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.to_string()
    }
}

/// Group key parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupKeyError {
    /// Input is not `provider:messageType`
    #[error("invalid data group '{0}': expected PROVIDER:MESSAGE_TYPE")]
    InvalidFormat(String),

    /// One side of the `:` is blank
    #[error("data group {0} cannot be empty")]
    EmptyComponent(&'static str),
}

/// Per-group counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Number of result files folded into this group
    pub files_analyzed: u64,
    /// Number of records those files covered
    pub records_analyzed: u64,
    /// Number of validations performed
    pub validation_count: u64,
    /// Number of validations that failed
    pub validations_failed: u64,
}

impl GroupStats {
    /// Percentage of failed validations, `None` when nothing was validated
    pub fn failure_rate(&self) -> Option<f64> {
        if self.validation_count == 0 {
            return None;
        }
        Some(self.validations_failed as f64 * 100.0 / self.validation_count as f64)
    }

    /// Whether validation ran on every analyzed record
    pub fn coverage(&self) -> ValidationCoverage {
        if self.validation_count < self.records_analyzed {
            ValidationCoverage::Partial
        } else {
            ValidationCoverage::Full
        }
    }

    /// Check the per-group bound `validations_failed <= validation_count`
    pub fn validate(&self) -> Result<(), String> {
        if self.validations_failed > self.validation_count {
            return Err(format!(
                "validations failed ({}) exceeds validation count ({})",
                self.validations_failed, self.validation_count
            ));
        }
        Ok(())
    }
}

/// Whether every analyzed record was validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCoverage {
    /// At least as many validations as records
    Full,
    /// Fewer validations than records; validation is not done for this group
    Partial,
}
