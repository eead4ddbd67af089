//! Result queue abstraction
//!
//! The poll loop only needs four primitives from the transport: take at most
//! one message, delete a processed message, hand an unprocessed message back,
//! and report the queue depth. [`sqs::SqsResultQueue`] talks to Amazon SQS;
//! [`memory::InMemoryQueue`] keeps everything in process for tests and dry runs.

use async_trait::async_trait;

pub mod memory;
pub mod sqs;

pub use memory::InMemoryQueue;
pub use sqs::SqsResultQueue;

/// Queue errors
///
/// Every queue failure is treated as transient by the poll loop: it counts as
/// "no progress this tick" and the stop conditions are re-evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Receive call failed
    #[error("receive failed: {0}")]
    Receive(String),

    /// Delete call failed
    #[error("delete failed: {0}")]
    Delete(String),

    /// Visibility change failed
    #[error("release failed: {0}")]
    Release(String),

    /// Queue attribute lookup failed
    #[error("depth query failed: {0}")]
    Depth(String),

    /// Queue could not be resolved
    #[error("queue not found: {0}")]
    NotFound(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// One message taken from the result queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Transport-assigned id, stable across redeliveries
    pub message_id: String,
    /// Handle used to delete or release this delivery
    pub receipt_handle: String,
    /// When the message was sent (Unix timestamp in milliseconds)
    pub sent_timestamp: Option<i64>,
    /// Raw message body
    pub body: String,
}

/// Approximate queue depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    /// Messages available for receipt
    pub visible: u64,
    /// Messages received by someone and not yet deleted
    pub in_flight: u64,
}

impl QueueDepth {
    /// Visible plus in-flight messages
    pub fn total(&self) -> u64 {
        self.visible + self.in_flight
    }

    /// Whether the queue has no work left at all
    pub fn is_drained(&self) -> bool {
        self.total() == 0
    }
}

/// Result queue primitives consumed by the poll loop
#[async_trait]
pub trait ResultQueue: Send + Sync {
    /// Take at most one message, `None` when nothing is receivable right now
    ///
    /// An empty receive is not proof that the queue is drained; messages may be
    /// temporarily invisible. Use [`ResultQueue::depth`] for that.
    async fn receive_one(&self) -> QueueResult<Option<QueueMessage>>;

    /// Permanently remove a processed message
    async fn delete(&self, receipt_handle: &str) -> QueueResult<()>;

    /// Make a received but unprocessed message visible again immediately
    async fn release(&self, receipt_handle: &str) -> QueueResult<()>;

    /// Current visible and in-flight message counts
    async fn depth(&self) -> QueueResult<QueueDepth>;
}
