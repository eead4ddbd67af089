//! Chat notification (Slack Block Kit webhook)

use super::emitter::DeliveryError;
use super::{error_details_text, group_text, ReportFooter, ReportPayload, ValidationStatus};
use crate::config::{HTTP_CONNECT_TIMEOUT, HTTP_REQUEST_TIMEOUT};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTTP client shared by every webhook post
static WEBHOOK_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {}. Check system TLS configuration.", e);
            }),
    )
});

/// Text object inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

/// One Block Kit layout block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Horizontal rule
    Divider,
    /// Markdown section
    Section {
        /// Section body
        text: TextObject,
    },
}

impl Block {
    /// Markdown section block
    pub fn section(text: impl Into<String>) -> Self {
        Self::Section {
            text: TextObject {
                kind: "mrkdwn",
                text: text.into(),
            },
        }
    }

    /// Markdown text of a section, `None` for dividers
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Divider => None,
            Self::Section { text } => Some(&text.text),
        }
    }
}

/// Chat message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackMessage {
    blocks: Vec<Block>,
}

impl SlackMessage {
    /// Lay out the report
    ///
    /// Header with the overall status (plus `alert_mention` when the run did not
    /// pass), one section per provider and per group, error listings, then the
    /// invocation footer.
    pub fn build(
        payload: &ReportPayload,
        footer: &ReportFooter,
        report_name: &str,
        alert_mention: Option<&str>,
    ) -> Self {
        let mut header = format!(
            "*=== {report_name} ({}) ===*\n {}",
            payload.report_date, payload.status
        );
        if payload.status != ValidationStatus::Passed {
            if let Some(mention) = alert_mention {
                header.push_str(&format!("\n {mention}"));
            }
        }

        let mut blocks = vec![Block::Divider, Block::section(header), Block::Divider];

        for provider in &payload.providers {
            blocks.push(Block::section(provider.title()));
            for group in &provider.groups {
                blocks.push(Block::section(group_text(&provider.provider, group)));
                if let Some(listing) = &group.error_listing {
                    blocks.push(Block::section(error_details_text(listing)));
                }
            }
            blocks.push(Block::Divider);
        }

        blocks.push(Block::section(format!(
            "*Function Name:* {}",
            footer.function_name
        )));
        blocks.push(Block::section(format!("*Request ID:* {}", footer.request_id)));
        blocks.push(Block::section(format!(
            "*CloudWatch Logs:* {}",
            footer.log_url
        )));
        blocks.push(Block::section(format!(
            "*Additional Information:* {}",
            footer.additional_information()
        )));
        blocks.push(Block::Divider);

        Self { blocks }
    }

    /// Layout blocks in order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Serialized request body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Chat delivery channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `message`, returning the HTTP status on success
    async fn post(&self, message: &SlackMessage) -> Result<u16, DeliveryError>;
}

/// Incoming-webhook notifier
pub struct SlackWebhook {
    url: String,
    client: Arc<Client>,
}

impl SlackWebhook {
    /// Post to `url` with the shared HTTP client
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: WEBHOOK_HTTP_CLIENT.clone(),
        }
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn post(&self, message: &SlackMessage) -> Result<u16, DeliveryError> {
        debug!(blocks = message.blocks().len(), body = %message.to_json(), "Posting chat message");

        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::Notification(e.to_string()))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("unknown");
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown response".to_string());

        if !status.is_success() {
            warn!(status = status.as_u16(), reason = reason, body = %body, "Chat webhook rejected the message");
            return Err(DeliveryError::Notification(format!(
                "webhook returned {status}: {body}"
            )));
        }

        info!(status = status.as_u16(), reason = reason, body = %body, "Chat webhook response");
        Ok(status.as_u16())
    }
}
