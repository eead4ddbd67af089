//! In-process result queue
//!
//! Mirrors the visibility model of a managed queue closely enough for the poll
//! loop: a received message moves to in-flight under a fresh receipt handle
//! until it is deleted or released.

use super::{QueueDepth, QueueError, QueueMessage, QueueResult, ResultQueue};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    visible: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deliveries: u64,
    fail_receives: u32,
}

/// Result queue held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
}

impl InMemoryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message body under the given id
    pub fn push(&self, message_id: impl Into<String>, sent_timestamp: Option<i64>, body: impl Into<String>) {
        let mut inner = self.lock();
        inner.visible.push_back(QueueMessage {
            message_id: message_id.into(),
            receipt_handle: String::new(),
            sent_timestamp,
            body: body.into(),
        });
    }

    /// Make the next `count` receive calls fail
    pub fn fail_next_receives(&self, count: u32) {
        self.lock().fail_receives = count;
    }

    /// Snapshot of the current depth
    pub fn current_depth(&self) -> QueueDepth {
        let inner = self.lock();
        QueueDepth {
            visible: inner.visible.len() as u64,
            in_flight: inner.in_flight.len() as u64,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked mid-operation
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ResultQueue for InMemoryQueue {
    async fn receive_one(&self) -> QueueResult<Option<QueueMessage>> {
        let mut inner = self.lock();
        if inner.fail_receives > 0 {
            inner.fail_receives -= 1;
            return Err(QueueError::Receive("injected receive failure".to_string()));
        }

        let Some(mut message) = inner.visible.pop_front() else {
            return Ok(None);
        };
        inner.deliveries += 1;
        message.receipt_handle = format!("{}#{}", message.message_id, inner.deliveries);
        inner
            .in_flight
            .insert(message.receipt_handle.clone(), message.clone());
        Ok(Some(message))
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        self.lock()
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::Delete(format!("unknown receipt handle {receipt_handle}")))
    }

    async fn release(&self, receipt_handle: &str) -> QueueResult<()> {
        let mut inner = self.lock();
        let message = inner
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::Release(format!("unknown receipt handle {receipt_handle}")))?;
        inner.visible.push_front(message);
        Ok(())
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        Ok(self.current_depth())
    }
}
