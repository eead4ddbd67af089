//! Amazon SQS result queue

use super::{QueueDepth, QueueError, QueueMessage, QueueResult, ResultQueue};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use tracing::{debug, warn};

/// Long-poll wait per receive call, in seconds
///
/// Short enough that the time budget is re-checked often, long enough to avoid
/// hammering an empty queue.
const RECEIVE_WAIT_SECS: i32 = 1;

/// SQS-backed result queue
pub struct SqsResultQueue {
    client: Client,
    queue_url: String,
}

impl SqsResultQueue {
    /// Wrap an SQS client for an already-resolved queue URL
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Resolve `queue_name` to its URL and build the queue
    pub async fn connect(
        sdk_config: &aws_config::SdkConfig,
        queue_name: &str,
    ) -> QueueResult<Self> {
        let client = Client::new(sdk_config);
        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| QueueError::NotFound(format!("{queue_name}: {}", DisplayErrorContext(&e))))?;
        let queue_url = output
            .queue_url()
            .ok_or_else(|| QueueError::NotFound(format!("{queue_name}: no queue URL returned")))?
            .to_string();

        debug!(queue_url = %queue_url, "Resolved result queue");
        Ok(Self::new(client, queue_url))
    }

    /// Resolved queue URL
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl ResultQueue for SqsResultQueue {
    async fn receive_one(&self) -> QueueResult<Option<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECS)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let Some(message) = output.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };

        let (Some(message_id), Some(receipt_handle)) =
            (message.message_id.clone(), message.receipt_handle.clone())
        else {
            warn!("Received message without id or receipt handle, ignoring");
            return Ok(None);
        };

        let sent_timestamp = message
            .attributes()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
            .and_then(|raw| raw.parse::<i64>().ok());

        Ok(Some(QueueMessage {
            message_id,
            receipt_handle,
            sent_timestamp,
            body: message.body.unwrap_or_default(),
        }))
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn release(&self, receipt_handle: &str) -> QueueResult<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| QueueError::Release(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| QueueError::Depth(DisplayErrorContext(&e).to_string()))?;

        let attrs = output
            .attributes()
            .ok_or_else(|| QueueError::Depth("no attributes returned".to_string()))?;
        let read = |name: &QueueAttributeName| -> QueueResult<u64> {
            attrs
                .get(name)
                .ok_or_else(|| QueueError::Depth(format!("missing attribute {}", name.as_str())))?
                .parse::<u64>()
                .map_err(|e| QueueError::Depth(format!("invalid {}: {e}", name.as_str())))
        };

        Ok(QueueDepth {
            visible: read(&QueueAttributeName::ApproximateNumberOfMessages)?,
            in_flight: read(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible)?,
        })
    }
}
