//! Execution context
//!
//! The poll loop never reads a clock directly; it asks an [`ExecutionContext`]
//! how many milliseconds the invocation has left. The report footer uses the
//! same context for the function name, request id and log location.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Function name reported by local runs
pub const LOCAL_FUNCTION_NAME: &str = "local_validation_results_function";

/// Execution time budget and logging identity of one invocation
pub trait ExecutionContext: Send + Sync {
    /// Milliseconds until the host terminates the invocation
    fn remaining_millis(&self) -> u64;

    /// Name of the running function, also the reinvocation target
    fn function_name(&self) -> &str;

    /// Identifier of this invocation
    fn request_id(&self) -> &str;

    /// Log group receiving this invocation's output
    fn log_group_name(&self) -> &str;

    /// Log stream receiving this invocation's output
    fn log_stream_name(&self) -> &str;
}

/// Context of a process running inside the function host
///
/// Names come from the host environment; the time budget is a deadline fixed
/// when the context is built.
#[derive(Debug, Clone)]
pub struct HostContext {
    function_name: String,
    request_id: String,
    log_group_name: String,
    log_stream_name: String,
    deadline: Instant,
}

impl HostContext {
    /// Build from the process environment with `budget` left from now
    pub fn from_env(budget: Duration) -> Self {
        Self::from_lookup(budget, |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(budget: Duration, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let function_name =
            lookup("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_else(|| LOCAL_FUNCTION_NAME.to_string());
        let request_id = lookup("_X_AMZN_TRACE_ID")
            .and_then(|trace| trace_root(&trace))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let log_group_name = lookup("AWS_LAMBDA_LOG_GROUP_NAME")
            .unwrap_or_else(|| format!("/aws/lambda/{function_name}"));
        let log_stream_name = lookup("AWS_LAMBDA_LOG_STREAM_NAME").unwrap_or_default();

        debug!(
            function_name = %function_name,
            request_id = %request_id,
            budget_ms = budget.as_millis() as u64,
            "Execution context created"
        );

        Self {
            function_name,
            request_id,
            log_group_name,
            log_stream_name,
            deadline: Instant::now() + budget,
        }
    }

    /// Build for one invocation handed out by the runtime API
    ///
    /// `deadline_ms` is the host's deadline in epoch milliseconds; the request
    /// id replaces the one derived from the environment.
    pub fn for_invocation<F>(request_id: &str, deadline_ms: i64, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let remaining = deadline_ms
            .saturating_sub(Utc::now().timestamp_millis())
            .max(0) as u64;
        let mut context = Self::from_lookup(Duration::from_millis(remaining), lookup);
        context.request_id = request_id.to_string();
        context
    }
}

/// Extract the `Root=` segment of an X-Ray trace header
fn trace_root(header: &str) -> Option<String> {
    header
        .split(';')
        .find_map(|part| part.trim().strip_prefix("Root="))
        .filter(|root| !root.is_empty())
        .map(str::to_string)
}

impl ExecutionContext for HostContext {
    fn remaining_millis(&self) -> u64 {
        self.deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64
    }

    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn log_group_name(&self) -> &str {
        &self.log_group_name
    }

    fn log_stream_name(&self) -> &str {
        &self.log_stream_name
    }
}

#[derive(Debug)]
enum Budget {
    Fixed(u64),
    Deadline(Instant),
    Countdown { next: AtomicU64, step: u64 },
}

/// Context with fixed names, for local runs and tests
#[derive(Debug)]
pub struct StaticContext {
    request_id: String,
    budget: Budget,
}

impl StaticContext {
    /// Context that always reports `remaining_millis`
    pub fn fixed(remaining_millis: u64) -> Self {
        Self::with_budget(Budget::Fixed(remaining_millis))
    }

    /// Context whose budget runs out `budget` from now
    pub fn deadline(budget: Duration) -> Self {
        Self::with_budget(Budget::Deadline(Instant::now() + budget))
    }

    /// Context whose budget starts at `start` and drops by `step` every time it is read
    pub fn countdown(start: u64, step: u64) -> Self {
        Self::with_budget(Budget::Countdown {
            next: AtomicU64::new(start),
            step,
        })
    }

    fn with_budget(budget: Budget) -> Self {
        Self {
            request_id: "local".to_string(),
            budget,
        }
    }
}

impl ExecutionContext for StaticContext {
    fn remaining_millis(&self) -> u64 {
        match &self.budget {
            Budget::Fixed(ms) => *ms,
            Budget::Deadline(deadline) => {
                deadline.saturating_duration_since(Instant::now()).as_millis() as u64
            }
            Budget::Countdown { next, step } => next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |ms| {
                    Some(ms.saturating_sub(*step))
                })
                .unwrap_or(0),
        }
    }

    fn function_name(&self) -> &str {
        LOCAL_FUNCTION_NAME
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn log_group_name(&self) -> &str {
        "/aws/lambda/local_validation_results_function"
    }

    fn log_stream_name(&self) -> &str {
        "local"
    }
}
