//! Environment configuration
//!
//! Everything the job reads from its environment is loaded once, validated,
//! and passed around as an [`AggregatorConfig`]. Missing or invalid settings
//! are reported before any queue message is touched.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Default report title
pub const DEFAULT_REPORT_NAME: &str = "Daily Ingestion Report";

/// Default AWS region for console links
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default safety margin before the time budget runs out, in milliseconds.
/// 10 seconds leaves room to snapshot the state and issue the reinvocation.
pub const DEFAULT_TIME_BUDGET_MARGIN_MS: u64 = 10_000;

/// Connect timeout for outgoing HTTP calls
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whole-request timeout for outgoing HTTP calls
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// Variable set but unusable
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Job configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Name of the result queue (`SQS_RESULT_QUEUE`)
    pub queue_name: String,
    /// Chat webhook URL (`SLACK_WEBHOOK`)
    pub slack_webhook: String,
    /// Email recipients per provider (`RECIPIENTS_DICT`)
    pub recipients: BTreeMap<String, Vec<String>>,
    /// Sender address for emails (`SENDER`)
    pub sender: Option<String>,
    /// Addresses copied on every email (`CC`)
    pub cc: Vec<String>,
    /// Debug logging (`VERBOSE_OUTPUT=TRUE`)
    pub verbose: bool,
    /// Report title (`REPORT_NAME`)
    pub report_name: String,
    /// Mention appended to the header when the run did not pass (`ALERT_MENTION`)
    pub alert_mention: Option<String>,
    /// Region used for console links (`AWS_REGION`)
    pub region: String,
    /// Stop polling when less than this is left (`TIME_BUDGET_MARGIN_MS`)
    pub time_budget_margin: Duration,
}

impl AggregatorConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let queue_name = get("SQS_RESULT_QUEUE").ok_or(ConfigError::Missing("SQS_RESULT_QUEUE"))?;
        let slack_webhook = get("SLACK_WEBHOOK").ok_or(ConfigError::Missing("SLACK_WEBHOOK"))?;
        if !(slack_webhook.starts_with("https://") || slack_webhook.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: "SLACK_WEBHOOK",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let recipients = match get("RECIPIENTS_DICT") {
            Some(raw) => parse_recipients(&raw)?,
            None => BTreeMap::new(),
        };

        let sender = get("SENDER").map(|s| s.trim().to_string());
        if sender.is_none() && recipients.values().any(|list| !list.is_empty()) {
            return Err(ConfigError::Missing("SENDER"));
        }

        let cc = get("CC")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let time_budget_margin = match get("TIME_BUDGET_MARGIN_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "TIME_BUDGET_MARGIN_MS",
                    reason: e.to_string(),
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_TIME_BUDGET_MARGIN_MS),
        };

        let config = Self {
            queue_name,
            slack_webhook,
            recipients,
            sender,
            cc,
            verbose: lookup("VERBOSE_OUTPUT").as_deref() == Some("TRUE"),
            report_name: get("REPORT_NAME").unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string()),
            alert_mention: get("ALERT_MENTION"),
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            time_budget_margin,
        };

        debug!(
            queue = %config.queue_name,
            providers_with_recipients = config.recipients.len(),
            verbose = config.verbose,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Email recipients for `provider`, matched case-insensitively
    pub fn recipients_for(&self, provider: &str) -> Option<&[String]> {
        self.recipients
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, list)| list.as_slice())
            .filter(|list| !list.is_empty())
    }
}

fn parse_recipients(raw: &str) -> Result<BTreeMap<String, Vec<String>>, ConfigError> {
    let parsed: BTreeMap<String, Vec<String>> =
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            name: "RECIPIENTS_DICT",
            reason: e.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .map(|(provider, list)| {
            let list = list
                .into_iter()
                .map(|addr| addr.trim().to_string())
                .filter(|addr| !addr.is_empty())
                .collect();
            (provider, list)
        })
        .collect())
}
