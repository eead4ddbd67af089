//! Report derivation and delivery
//!
//! A finalized [`ReportAccumulator`] is turned into a read-only
//! [`ReportPayload`], which the [`ReportEmitter`] renders into one chat
//! message and one email per provider with configured recipients.
//!
//! # Components
//!
//! - [`slack`] - Block Kit message and webhook notifier
//! - [`email`] - per-provider email and SES mailer
//! - [`emitter`] - delivery orchestration

use crate::accumulator::{GroupErrors, ReportAccumulator};
use crate::context::ExecutionContext;
use crate::queue::QueueDepth;
use crate::{GroupStats, ValidationCoverage};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

pub mod email;
pub mod emitter;
pub mod slack;

pub use email::{EmailMessage, Mailer, SesMailer};
pub use emitter::{DeliveryError, EmissionSummary, ReportEmitter};
pub use slack::{Notifier, SlackMessage, SlackWebhook};

/// Longest error block kept in a report section.
/// Chat sections are capped at 3000 characters; this leaves room for the
/// section title and the truncation marker.
pub const MAX_ERROR_BLOCK_LEN: usize = 2947;

/// Appended to an error block that was cut at [`MAX_ERROR_BLOCK_LEN`]
pub const TRUNCATION_MARKER: &str = " ... [TRUNCATED LIST]```";

/// Overall outcome of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Validations ran and none failed
    Passed,
    /// Nothing was validated
    NoRecords,
    /// At least one validation failed
    Failed,
}

impl ValidationStatus {
    /// Derive the status from grand totals
    pub fn from_totals(validation_count: u64, validations_failed: u64) -> Self {
        match (validations_failed, validation_count) {
            (0, 0) => Self::NoRecords,
            (0, _) => Self::Passed,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::NoRecords => write!(f, "NO RECORDS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Report section for one message type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Message type name
    pub message_type: String,
    /// Counters for the group
    pub stats: GroupStats,
    /// Whether every record was validated
    pub coverage: ValidationCoverage,
    /// Fenced, possibly truncated error listing when validations failed
    pub error_listing: Option<String>,
}

/// Report sections for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    /// Provider name as it appeared on the wire
    pub provider: String,
    /// One entry per message type, ordered by name
    pub groups: Vec<GroupSummary>,
}

impl ProviderSummary {
    /// Section title
    pub fn title(&self) -> String {
        format!("*Data Provider - {}*", self.provider.to_uppercase())
    }

    /// Plain-text body covering every group, as used in emails
    pub fn render_text(&self) -> String {
        let mut text = format!("{}\n", self.title());
        for group in &self.groups {
            text.push_str(&group_text(&self.provider, group));
            if let Some(listing) = &group.error_listing {
                text.push_str(&error_details_text(listing));
            }
        }
        text
    }
}

/// Counter text for one group section
pub(crate) fn group_text(provider: &str, group: &GroupSummary) -> String {
    let stats = &group.stats;
    let message_type = group.message_type.to_uppercase();
    let mut text = format!(
        "*{message_type} messages*\n- {} records from {} files analyzed\n",
        stats.records_analyzed, stats.files_analyzed
    );

    match (group.coverage, stats.failure_rate()) {
        (ValidationCoverage::Partial, _) => {
            text.push_str(&format!(
                "- Schema validation is not currently done for {message_type} from {}\n",
                provider.to_uppercase()
            ));
        }
        (ValidationCoverage::Full, Some(rate)) => {
            text.push_str(&format!(
                "- {}/{} validations failed ({rate:.2}%)\n",
                stats.validations_failed, stats.validation_count
            ));
        }
        (ValidationCoverage::Full, None) => {
            text.push_str("- No validations performed\n");
        }
    }
    text
}

/// Error details text for one group section
pub(crate) fn error_details_text(listing: &str) -> String {
    format!("*Error Details*\n{listing}\n")
}

/// Read-only view of a finalized accumulator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    /// Calendar day the report covers
    pub report_date: NaiveDate,
    /// Overall outcome
    pub status: ValidationStatus,
    /// Validations performed across all groups
    pub total_validation_count: u64,
    /// Failed validations across all groups
    pub total_validations_failed: u64,
    /// Queue messages observed, duplicates included
    pub messages_received: u64,
    /// Whether the state went through at least one continuation
    pub was_resumed: bool,
    /// Sections per provider, ordered by name
    pub providers: Vec<ProviderSummary>,
}

impl ReportPayload {
    /// Derive the report from `accumulator`, cutting error blocks at `max_block_len`
    pub fn from_accumulator(accumulator: &ReportAccumulator, max_block_len: usize) -> Self {
        let state = accumulator.state();
        let mut providers: Vec<ProviderSummary> = Vec::new();

        // groups are ordered by provider first, so consecutive keys share a provider
        for (key, stats) in state.groups() {
            let error_listing = if stats.validations_failed > 0 {
                state
                    .errors()
                    .get(key)
                    .filter(|errors| !errors.is_empty())
                    .map(|errors| fence_error_listing(&render_error_listing(errors), max_block_len))
            } else {
                None
            };

            let summary = GroupSummary {
                message_type: key.message_type().to_string(),
                stats: *stats,
                coverage: stats.coverage(),
                error_listing,
            };

            match providers.last_mut() {
                Some(last) if last.provider == key.provider() => last.groups.push(summary),
                _ => providers.push(ProviderSummary {
                    provider: key.provider().to_string(),
                    groups: vec![summary],
                }),
            }
        }

        Self {
            report_date: state.report_date(),
            status: ValidationStatus::from_totals(
                state.total_validation_count(),
                state.total_validations_failed(),
            ),
            total_validation_count: state.total_validation_count(),
            total_validations_failed: state.total_validations_failed(),
            messages_received: state.messages_received(),
            was_resumed: state.is_resuming(),
            providers,
        }
    }

    /// True iff validations ran and none failed
    pub fn success(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    /// Files folded across all groups
    pub fn files_analyzed(&self) -> u64 {
        self.providers
            .iter()
            .flat_map(|p| &p.groups)
            .map(|g| g.stats.files_analyzed)
            .sum()
    }
}

/// Render a group's errors as a YAML-style listing
///
/// ```text
/// <signature>:
/// - <occurrence>
/// - ... and N more
/// ```
pub fn render_error_listing(errors: &GroupErrors) -> String {
    let mut out = String::new();
    for (signature, occurrences) in errors {
        out.push_str(&format!("{signature}:\n"));
        for sample in occurrences.samples() {
            out.push_str(&format!("- {sample}\n"));
        }
        if occurrences.omitted() > 0 {
            out.push_str(&format!("- ... and {} more\n", occurrences.omitted()));
        }
    }
    out
}

/// Wrap a listing in a code fence, truncating to `max_len` characters
pub fn fence_error_listing(listing: &str, max_len: usize) -> String {
    let fenced = format!("```{listing}```");
    if fenced.chars().count() <= max_len {
        return fenced;
    }

    let mut truncated: String = fenced.chars().take(max_len).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Invocation details appended to the chat message
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFooter {
    /// Function that produced the report
    pub function_name: String,
    /// Invocation that produced the report
    pub request_id: String,
    /// Console link to the invocation's logs
    pub log_url: String,
    /// Queue depth at emission time, `None` if it could not be read
    pub queue_depth: Option<QueueDepth>,
    /// Execution time left when the report was emitted
    pub seconds_remaining: f64,
    /// Set when the report does not cover everything that was queued
    pub incomplete_note: Option<String>,
}

impl ReportFooter {
    /// Footer for the current invocation
    pub fn from_context(
        context: &dyn ExecutionContext,
        region: &str,
        queue_depth: Option<QueueDepth>,
    ) -> Self {
        Self {
            function_name: context.function_name().to_string(),
            request_id: context.request_id().to_string(),
            log_url: cloudwatch_log_url(
                region,
                context.log_group_name(),
                context.log_stream_name(),
            ),
            queue_depth,
            seconds_remaining: context.remaining_millis() as f64 / 1000.0,
            incomplete_note: None,
        }
    }

    /// Mark the report as incomplete
    pub fn with_incomplete_note(mut self, note: impl Into<String>) -> Self {
        self.incomplete_note = Some(note.into());
        self
    }

    /// "Additional Information" text
    pub fn additional_information(&self) -> String {
        let (waiting, in_flight) = match self.queue_depth {
            Some(depth) => (depth.visible.to_string(), depth.in_flight.to_string()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        let mut text = format!(
            "\nAnalysis reports waiting to be aggregated: *{waiting}*\n\
             Analysis reports currently being aggregated: *{in_flight}*\n\
             Seconds Remaining in Execution: *{:.3}*",
            self.seconds_remaining
        );
        if let Some(note) = &self.incomplete_note {
            text.push_str(&format!("\n*Partial report:* {note}"));
        }
        text
    }
}

/// Console link to a log stream
pub fn cloudwatch_log_url(region: &str, log_group: &str, log_stream: &str) -> String {
    format!(
        "https://console.aws.amazon.com/cloudwatch/home?region={region}#logEventViewer:group={log_group};stream={log_stream}"
    )
}
