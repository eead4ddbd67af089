//! Aggregation metrics
//!
//! Counters are emitted through the `metrics` facade and cost nothing unless a
//! recorder is installed. For local runs [`init_metrics`] installs the
//! Prometheus exporter so a scrape endpoint shows progress while the queue
//! drains.

use crate::GroupKey;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "127.0.0.1:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "aggregator_messages_received_total",
        Unit::Count,
        "Queue messages observed, duplicates included"
    );
    describe_counter!(
        "aggregator_messages_folded_total",
        Unit::Count,
        "Queue messages merged into the report"
    );
    describe_counter!(
        "aggregator_duplicates_total",
        Unit::Count,
        "Redelivered messages skipped by id"
    );
    describe_counter!(
        "aggregator_poison_messages_total",
        Unit::Count,
        "Messages deleted without aggregation because their body was malformed"
    );
    describe_counter!(
        "aggregator_validations_total",
        Unit::Count,
        "Validations aggregated"
    );
    describe_counter!(
        "aggregator_validations_failed_total",
        Unit::Count,
        "Failed validations aggregated"
    );
    describe_counter!(
        "aggregator_idle_ticks_total",
        Unit::Count,
        "Poll iterations that made no progress"
    );
    describe_counter!(
        "aggregator_queue_errors_total",
        Unit::Count,
        "Failed queue operations"
    );
    describe_counter!(
        "aggregator_reinvocations_total",
        Unit::Count,
        "Continuation invocations triggered"
    );
    describe_counter!(
        "aggregator_deliveries_total",
        Unit::Count,
        "Report deliveries by channel and outcome"
    );
    describe_histogram!(
        "aggregator_invocation_duration_seconds",
        Unit::Seconds,
        "Wall time of one invocation"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Record one observed queue message
pub fn record_message_received() {
    counter!("aggregator_messages_received_total").increment(1);
}

/// Record a message skipped as a duplicate
pub fn record_duplicate() {
    counter!("aggregator_duplicates_total").increment(1);
}

/// Record a poison message
pub fn record_poison() {
    counter!("aggregator_poison_messages_total").increment(1);
}

/// Record a successful fold
pub fn record_fold(group: &GroupKey, validations: u64, failed: u64) {
    counter!("aggregator_messages_folded_total", "group" => group.to_string()).increment(1);
    counter!("aggregator_validations_total").increment(validations);
    counter!("aggregator_validations_failed_total").increment(failed);
}

/// Record a poll iteration without progress
pub fn record_idle_tick() {
    counter!("aggregator_idle_ticks_total").increment(1);
}

/// Record a failed queue operation
pub fn record_queue_error(op: &'static str) {
    counter!("aggregator_queue_errors_total", "op" => op).increment(1);
}

/// Record a continuation invocation
pub fn record_reinvocation() {
    counter!("aggregator_reinvocations_total").increment(1);
}

/// Record a report delivery attempt
pub fn record_delivery(channel: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("aggregator_deliveries_total", "channel" => channel, "outcome" => outcome)
        .increment(1);
}

/// Per-invocation timing and outcome
pub struct InvocationMetrics {
    report_date: String,
    start_time: Instant,
}

impl InvocationMetrics {
    /// Start tracking an invocation
    pub fn start(report_date: impl Into<String>, is_resuming: bool) -> Self {
        let report_date = report_date.into();

        info!(
            report_date = %report_date,
            is_resuming = is_resuming,
            "Aggregation invocation started"
        );

        Self {
            report_date,
            start_time: Instant::now(),
        }
    }

    /// Record an invocation that ended with `outcome`
    pub fn record_finished(&self, outcome: &'static str, messages_received: u64) {
        let duration = self.start_time.elapsed();

        histogram!("aggregator_invocation_duration_seconds", "outcome" => outcome)
            .record(duration.as_secs_f64());

        info!(
            report_date = %self.report_date,
            outcome = outcome,
            messages_received = messages_received,
            duration_secs = duration.as_secs(),
            "Aggregation invocation finished"
        );
    }

    /// Record an invocation that failed
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        histogram!("aggregator_invocation_duration_seconds", "outcome" => "failed")
            .record(duration.as_secs_f64());

        error!(
            report_date = %self.report_date,
            error = %error,
            duration_secs = duration.as_secs(),
            "Aggregation invocation failed"
        );
    }
}
