//! Per-provider email report (Amazon SES)

use super::emitter::DeliveryError;
use super::ProviderSummary;
use async_trait::async_trait;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client;
use tracing::{debug, info};

const CHARSET: &str = "UTF-8";

/// One email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Sender address
    pub sender: String,
    /// Primary recipients
    pub to: Vec<String>,
    /// Copied recipients
    pub cc: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text_body: String,
    /// HTML body
    pub html_body: String,
}

impl EmailMessage {
    /// Email carrying one provider's section of the report
    pub fn for_provider(
        provider: &ProviderSummary,
        report_name: &str,
        sender: impl Into<String>,
        to: Vec<String>,
        cc: Vec<String>,
    ) -> Self {
        let text_body = provider.render_text();
        Self {
            sender: sender.into(),
            to,
            cc,
            subject: format!("{report_name} for {}", provider.provider.to_uppercase()),
            html_body: html_body(&text_body),
            text_body,
        }
    }
}

fn html_body(text: &str) -> String {
    format!(
        "<html>\n<head></head>\n<body>\n<p>{}</p>\n</body>\n</html>\n",
        text.replace('\n', "<br/>")
    )
}

/// Email delivery channel
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `message`, returning the provider's message id
    async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError>;
}

/// SES v2 mailer
pub struct SesMailer {
    client: Client,
}

impl SesMailer {
    /// Build from the shared AWS configuration
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

fn utf8(data: &str) -> Result<Content, DeliveryError> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| DeliveryError::Email(e.to_string()))
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError> {
        debug!(subject = %message.subject, to = ?message.to, cc = ?message.cc, "Sending email");

        let destination = Destination::builder()
            .set_to_addresses(Some(message.to.clone()))
            .set_cc_addresses(Some(message.cc.clone()))
            .build();
        let body = Body::builder()
            .text(utf8(&message.text_body)?)
            .html(utf8(&message.html_body)?)
            .build();
        let simple = Message::builder()
            .subject(utf8(&message.subject)?)
            .body(body)
            .build();

        let output = self
            .client
            .send_email()
            .from_email_address(&message.sender)
            .destination(destination)
            .content(EmailContent::builder().simple(simple).build())
            .send()
            .await
            .map_err(|e| DeliveryError::Email(DisplayErrorContext(&e).to_string()))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        info!(message_id = %message_id, subject = %message.subject, "Email sent");
        Ok(message_id)
    }
}
