//! Loop and invocation outcomes

use crate::report::{EmissionSummary, ReportPayload};
use chrono::NaiveDate;
use serde::Serialize;

/// Why a report was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// Nothing visible or in flight is left
    QueueDrained,
    /// The next message belongs to a later report date
    DayRolledOver,
}

/// Terminal state of one poll loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The report is complete and can be emitted
    Done(DoneReason),
    /// The time budget ran low; the chain must continue
    #[default]
    Suspended,
}

/// Counters for one poll loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// How the loop ended
    pub outcome: LoopOutcome,
    /// Messages merged into the report
    pub folded: u64,
    /// Redeliveries skipped
    pub duplicates: u64,
    /// Malformed messages discarded
    pub poison: u64,
    /// Iterations without progress
    pub idle_ticks: u64,
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The report was emitted
    Reported {
        /// Report date covered
        report_date: NaiveDate,
        /// What ended aggregation
        reason: DoneReason,
        /// Emitted report
        payload: ReportPayload,
        /// Delivery results
        emission: EmissionSummary,
    },
    /// The state was handed to the next invocation
    Continued {
        /// Report date being aggregated
        report_date: NaiveDate,
        /// Size of the continuation payload
        payload_bytes: usize,
    },
    /// Reinvocation failed, so the partial report was emitted instead
    ReportedPartial {
        /// Report date covered
        report_date: NaiveDate,
        /// Why the chain could not continue
        reinvoke_error: String,
        /// Emitted partial report
        payload: ReportPayload,
        /// Delivery results
        emission: EmissionSummary,
    },
}

impl JobOutcome {
    /// Report date the invocation worked on
    pub fn report_date(&self) -> NaiveDate {
        match self {
            Self::Reported { report_date, .. }
            | Self::Continued { report_date, .. }
            | Self::ReportedPartial { report_date, .. } => *report_date,
        }
    }

    /// Short outcome label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reported { .. } => "reported",
            Self::Continued { .. } => "suspended",
            Self::ReportedPartial { .. } => "reported_partial",
        }
    }
}
