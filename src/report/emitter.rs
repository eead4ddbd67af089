//! Report delivery orchestration

use super::email::{EmailMessage, Mailer};
use super::slack::{Notifier, SlackMessage};
use super::{ReportFooter, ReportPayload, ValidationStatus};
use crate::config::AggregatorConfig;
use std::sync::Arc;
use tracing::{error, info};

/// Delivery failures
///
/// Delivery is best effort: failures are logged and reported back, never
/// retried, and never undo the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Chat webhook failed
    #[error("notification failed: {0}")]
    Notification(String),

    /// Email send failed
    #[error("email failed: {0}")]
    Email(String),

    /// A provider has recipients but no sender is configured
    #[error("no sender configured for {provider} email")]
    MissingSender {
        /// Provider whose email was skipped
        provider: String,
    },
}

/// What happened during one emission
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionSummary {
    /// Status the report carried
    pub status: ValidationStatus,
    /// Whether the chat message was accepted
    pub notified: bool,
    /// Providers whose email was accepted
    pub emailed_providers: Vec<String>,
    /// Every delivery that failed
    pub failures: Vec<DeliveryError>,
}

impl EmissionSummary {
    /// True when every delivery succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sends a finalized report to every channel
pub struct ReportEmitter {
    config: Arc<AggregatorConfig>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn Mailer>,
}

impl ReportEmitter {
    /// Create an emitter over the given channels
    pub fn new(
        config: Arc<AggregatorConfig>,
        notifier: Arc<dyn Notifier>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            notifier,
            mailer,
        }
    }

    /// Post the chat message, then one email per provider with recipients
    pub async fn emit(&self, payload: &ReportPayload, footer: &ReportFooter) -> EmissionSummary {
        let mut summary = EmissionSummary {
            status: payload.status,
            notified: false,
            emailed_providers: Vec::new(),
            failures: Vec::new(),
        };

        let message = SlackMessage::build(
            payload,
            footer,
            &self.config.report_name,
            self.config.alert_mention.as_deref(),
        );
        match self.notifier.post(&message).await {
            Ok(status) => {
                crate::metrics::record_delivery("slack", true);
                info!(status = status, report_status = %payload.status, "Chat report delivered");
                summary.notified = true;
            }
            Err(e) => {
                crate::metrics::record_delivery("slack", false);
                error!(error = %e, "Chat report delivery failed");
                summary.failures.push(e);
            }
        }

        for provider in &payload.providers {
            let Some(recipients) = self.config.recipients_for(&provider.provider) else {
                continue;
            };
            let Some(sender) = self.config.sender.as_deref() else {
                summary.failures.push(DeliveryError::MissingSender {
                    provider: provider.provider.clone(),
                });
                continue;
            };

            info!(
                provider = %provider.provider,
                recipients = %recipients.join(","),
                "Emailing provider report"
            );
            let email = EmailMessage::for_provider(
                provider,
                &self.config.report_name,
                sender,
                recipients.to_vec(),
                self.config.cc.clone(),
            );
            match self.mailer.send(&email).await {
                Ok(_) => {
                    crate::metrics::record_delivery("email", true);
                    summary.emailed_providers.push(provider.provider.clone());
                }
                Err(e) => {
                    crate::metrics::record_delivery("email", false);
                    error!(provider = %provider.provider, error = %e, "Email delivery failed");
                    summary.failures.push(e);
                }
            }
        }

        summary
    }
}
