//! Accumulator state and the fold operation
//!
//! [`AccumulatorState`] is the complete, serializable aggregation state for one
//! report date. It is the only mutable state carried between invocations, so
//! restoring it and continuing to fold must give the same result as one
//! unbroken run.

use super::message::{BodyTally, ResultBody};
use super::MalformedMessageError;
use crate::queue::QueueMessage;
use crate::{GroupKey, GroupStats};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Occurrence descriptions retained per error signature
///
/// Bounds the continuation payload. The rendered report truncates long
/// listings anyway; `total` keeps the exact count.
pub const MAX_OCCURRENCES_PER_SIGNATURE: usize = 50;

/// Occurrences of one error signature within a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOccurrences {
    samples: Vec<String>,
    total: u64,
}

impl ErrorOccurrences {
    /// Record one occurrence
    pub fn push(&mut self, description: String) {
        self.total += 1;
        if self.samples.len() < MAX_OCCURRENCES_PER_SIGNATURE {
            self.samples.push(description);
        }
    }

    /// Retained occurrence descriptions, in fold order
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Total occurrences recorded, including those not retained
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Occurrences counted but not retained
    pub fn omitted(&self) -> u64 {
        self.total.saturating_sub(self.samples.len() as u64)
    }
}

/// Error occurrences for one group, keyed by error signature
pub type GroupErrors = BTreeMap<String, ErrorOccurrences>;

/// Complete aggregation state for one report date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorState {
    report_date: NaiveDate,
    #[serde(default)]
    is_resuming: bool,
    #[serde(default)]
    groups: BTreeMap<GroupKey, GroupStats>,
    #[serde(default)]
    errors: BTreeMap<GroupKey, GroupErrors>,
    #[serde(default)]
    received_message_ids: BTreeSet<String>,
    #[serde(default)]
    messages_received: u64,
    #[serde(default)]
    total_validation_count: u64,
    #[serde(default)]
    total_validations_failed: u64,
}

impl AccumulatorState {
    fn new(report_date: NaiveDate) -> Self {
        Self {
            report_date,
            is_resuming: false,
            groups: BTreeMap::new(),
            errors: BTreeMap::new(),
            received_message_ids: BTreeSet::new(),
            messages_received: 0,
            total_validation_count: 0,
            total_validations_failed: 0,
        }
    }

    /// Calendar day this report covers
    pub fn report_date(&self) -> NaiveDate {
        self.report_date
    }

    /// Whether this state was restored from a prior partial run
    pub fn is_resuming(&self) -> bool {
        self.is_resuming
    }

    /// Mark this state as a continuation of a prior run
    pub fn mark_resuming(&mut self) {
        self.is_resuming = true;
    }

    /// Per-group counters
    pub fn groups(&self) -> &BTreeMap<GroupKey, GroupStats> {
        &self.groups
    }

    /// Per-group error occurrences
    pub fn errors(&self) -> &BTreeMap<GroupKey, GroupErrors> {
        &self.errors
    }

    /// Ids of every message already folded
    pub fn received_message_ids(&self) -> &BTreeSet<String> {
        &self.received_message_ids
    }

    /// Queue messages observed, duplicates included
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Validations performed across all groups
    pub fn total_validation_count(&self) -> u64 {
        self.total_validation_count
    }

    /// Failed validations across all groups
    pub fn total_validations_failed(&self) -> u64 {
        self.total_validations_failed
    }

    /// Verify grand totals and per-group bounds
    ///
    /// A state decoded from a continuation payload is checked before use.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut count = 0u64;
        let mut failed = 0u64;
        for (group, stats) in &self.groups {
            stats.validate().map_err(|e| format!("group {group}: {e}"))?;
            count = count
                .checked_add(stats.validation_count)
                .ok_or_else(|| "group validation counts overflow".to_string())?;
            failed = failed
                .checked_add(stats.validations_failed)
                .ok_or_else(|| "group failure counts overflow".to_string())?;
        }

        if count != self.total_validation_count {
            return Err(format!(
                "total validation count ({}) does not match group sum ({count})",
                self.total_validation_count
            ));
        }
        if failed != self.total_validations_failed {
            return Err(format!(
                "total validations failed ({}) does not match group sum ({failed})",
                self.total_validations_failed
            ));
        }
        Ok(())
    }
}

/// Result of folding one queue message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The message was merged into the running statistics
    Folded {
        /// Group the message belonged to
        group: GroupKey,
        /// Validations it contributed
        validations: u64,
        /// Failed validations it contributed
        failed: u64,
    },
    /// The message id was already folded; nothing changed but the diagnostic count
    Duplicate,
}

/// Running aggregation for one report date
///
/// Owned by exactly one poll loop at a time. All mutation goes through
/// [`ReportAccumulator::fold`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportAccumulator {
    state: AccumulatorState,
}

impl ReportAccumulator {
    /// Start a fresh accumulator for `report_date`
    pub fn new(report_date: NaiveDate) -> Self {
        Self {
            state: AccumulatorState::new(report_date),
        }
    }

    /// Rebuild an accumulator from a snapshot taken by a prior invocation
    pub fn restore(mut state: AccumulatorState) -> Self {
        state.mark_resuming();
        info!(
            report_date = %state.report_date,
            messages_received = state.messages_received,
            groups = state.groups.len(),
            "Restored accumulator from continuation"
        );
        Self { state }
    }

    /// Deep copy of the current state
    pub fn snapshot(&self) -> AccumulatorState {
        self.state.clone()
    }

    /// Borrow the current state
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Calendar day this report covers
    pub fn report_date(&self) -> NaiveDate {
        self.state.report_date
    }

    /// Fold one queue message into the running statistics
    ///
    /// Duplicates (by message id) only bump the diagnostic message count. A
    /// malformed body changes no counters, but its id is remembered so a
    /// redelivery is skipped as a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessageError`] when the body cannot be parsed.
    pub fn fold(&mut self, message: &QueueMessage) -> Result<FoldOutcome, MalformedMessageError> {
        let state = &mut self.state;
        state.messages_received = state.messages_received.saturating_add(1);
        crate::metrics::record_message_received();

        if state.received_message_ids.contains(&message.message_id) {
            debug!(
                message_id = %message.message_id,
                "Detected previously processed message, skipping to prevent duplicates"
            );
            crate::metrics::record_duplicate();
            return Ok(FoldOutcome::Duplicate);
        }
        state.received_message_ids.insert(message.message_id.clone());

        let body = ResultBody::parse(&message.body)?;
        let tally = body.tally();
        info!(key = %body.key, group = %body.group, "Analyzing file");

        let current = state.groups.get(&body.group).copied().unwrap_or_default();
        let counters = with_file(current, &tally).and_then(|stats| {
            Some((
                stats,
                state.total_validation_count.checked_add(tally.validations)?,
                state.total_validations_failed.checked_add(tally.failed)?,
            ))
        });
        let Some((stats, total_count, total_failed)) = counters else {
            return Err(MalformedMessageError::InvalidResults(format!(
                "counts from {} overflow the totals for {}",
                body.key, body.group
            )));
        };
        state.groups.insert(body.group.clone(), stats);
        state.total_validation_count = total_count;
        state.total_validations_failed = total_failed;

        if !tally.occurrences.is_empty() {
            let group_errors = state.errors.entry(body.group.clone()).or_default();
            for (signature, description) in tally.occurrences {
                debug!(group = %body.group, signature = %signature, "Found failed validation");
                group_errors.entry(signature).or_default().push(description);
            }
        }

        crate::metrics::record_fold(&body.group, tally.validations, tally.failed);

        Ok(FoldOutcome::Folded {
            group: body.group,
            validations: tally.validations,
            failed: tally.failed,
        })
    }
}

/// `stats` with one more file carrying `tally`, `None` on overflow
fn with_file(stats: GroupStats, tally: &BodyTally) -> Option<GroupStats> {
    Some(GroupStats {
        files_analyzed: stats.files_analyzed.checked_add(1)?,
        records_analyzed: stats.records_analyzed.checked_add(tally.records)?,
        validation_count: stats.validation_count.checked_add(tally.validations)?,
        validations_failed: stats.validations_failed.checked_add(tally.failed)?,
    })
}
