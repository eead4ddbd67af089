//! Poll-and-decide loop
//!
//! Each iteration checks the time budget first, then takes at most one
//! message. A message from after the report date ends the report; a tick
//! without progress ends it only when the queue is really empty.

use super::config::LoopSettings;
use super::job::{DoneReason, LoopOutcome, LoopSummary};
use crate::accumulator::{FoldOutcome, ReportAccumulator};
use crate::context::ExecutionContext;
use crate::queue::{QueueMessage, ResultQueue};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, debug_span, info, warn};

/// Drives one accumulator against the result queue until it is done or out of time
pub struct AggregationExecutor {
    queue: Arc<dyn ResultQueue>,
    settings: LoopSettings,
}

impl AggregationExecutor {
    /// Create an executor over `queue`
    pub fn new(queue: Arc<dyn ResultQueue>, settings: LoopSettings) -> Self {
        Self { queue, settings }
    }

    /// Loop settings in use
    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Poll until the loop reaches `Done` or `Suspended`
    pub async fn run(
        &self,
        accumulator: &mut ReportAccumulator,
        context: &dyn ExecutionContext,
    ) -> LoopSummary {
        let margin_ms = self.settings.safety_margin.as_millis() as u64;
        let mut summary = LoopSummary::default();
        let mut idle_ticks: u32 = 0;

        let outcome = loop {
            let remaining = context.remaining_millis();
            if remaining < margin_ms {
                info!(
                    remaining_ms = remaining,
                    margin_ms = margin_ms,
                    "Time budget nearly exhausted, suspending"
                );
                break LoopOutcome::Suspended;
            }

            let message = match self.queue.receive_one().await {
                Ok(Some(message)) => Some(message),
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "Queue receive failed");
                    crate::metrics::record_queue_error("receive");
                    None
                }
            };

            let Some(message) = message else {
                if let Some(reason) = self.check_drained().await {
                    break LoopOutcome::Done(reason);
                }
                crate::metrics::record_idle_tick();
                summary.idle_ticks += 1;
                let delay = self
                    .settings
                    .idle_backoff(idle_ticks, context.remaining_millis());
                idle_ticks = idle_ticks.saturating_add(1);
                debug!(delay_ms = delay.as_millis() as u64, "No message received, backing off");
                tokio::time::sleep(delay).await;
                continue;
            };
            idle_ticks = 0;

            if is_after_report_date(&message, accumulator.report_date()) {
                info!(
                    message_id = %message.message_id,
                    report_date = %accumulator.report_date(),
                    "Reached a message from after the report date"
                );
                if let Err(e) = self.queue.release(&message.receipt_handle).await {
                    warn!(error = %e, "Failed to release message for the next report");
                    crate::metrics::record_queue_error("release");
                }
                break LoopOutcome::Done(DoneReason::DayRolledOver);
            }

            let folded = debug_span!("fold", message_id = %message.message_id)
                .in_scope(|| accumulator.fold(&message));
            match folded {
                Ok(FoldOutcome::Folded { .. }) => summary.folded += 1,
                Ok(FoldOutcome::Duplicate) => summary.duplicates += 1,
                Err(e) => {
                    debug!(
                        message_id = %message.message_id,
                        error = %e,
                        "Discarding malformed message"
                    );
                    crate::metrics::record_poison();
                    summary.poison += 1;
                }
            }

            if let Err(e) = self.queue.delete(&message.receipt_handle).await {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete processed message, redelivery will be skipped"
                );
                crate::metrics::record_queue_error("delete");
            }
        };

        summary.outcome = outcome;
        info!(
            outcome = ?summary.outcome,
            folded = summary.folded,
            duplicates = summary.duplicates,
            poison = summary.poison,
            idle_ticks = summary.idle_ticks,
            "Message polling loop finished"
        );
        summary
    }

    /// `Some(QueueDrained)` when nothing is visible or in flight
    async fn check_drained(&self) -> Option<DoneReason> {
        match self.queue.depth().await {
            Ok(depth) if depth.is_drained() => {
                debug!("Queue drained");
                Some(DoneReason::QueueDrained)
            }
            Ok(depth) => {
                debug!(
                    visible = depth.visible,
                    in_flight = depth.in_flight,
                    "Queue not drained yet"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Queue depth query failed");
                crate::metrics::record_queue_error("depth");
                None
            }
        }
    }
}

/// Whether `message` was sent on a UTC day after `report_date`
fn is_after_report_date(message: &QueueMessage, report_date: NaiveDate) -> bool {
    message
        .sent_timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .is_some_and(|sent| sent.date_naive() > report_date)
}
