//! CLI error types and conversions

use crate::aggregator::JobError;
use crate::config::ConfigError;
use crate::queue::QueueError;
use crate::resume::ResumeError;
use crate::runtime::RuntimeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Invocation failed
    #[error("job error: {0}")]
    JobError(#[from] JobError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Runtime API error
    #[error("runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),

    /// Queue error
    #[error("queue error: {0}")]
    QueueError(#[from] QueueError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}
