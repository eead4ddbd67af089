//! Continuation across invocation boundaries
//!
//! When an invocation runs out of time it serializes its accumulator into a
//! [`ContinuationPayload`] and asks a [`Reinvoker`] to start the next link of
//! the chain with it. The next invocation decodes its event into an
//! [`InvocationEvent`] and either starts fresh or picks up where the last one
//! stopped.

use async_trait::async_trait;

pub mod handoff;
pub mod lambda;
pub mod payload;

pub use handoff::HandoffFileReinvoker;
pub use lambda::LambdaReinvoker;
pub use payload::{ContinuationPayload, InvocationEvent, MAX_PAYLOAD_BYTES};

/// Starts the next invocation of the chain
#[async_trait]
pub trait Reinvoker: Send + Sync {
    /// Hand `payload` to a new, asynchronously started invocation
    async fn invoke_async(&self, payload: Vec<u8>) -> Result<(), ResumeError>;
}

/// Errors crossing the invocation boundary
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Payload written by an incompatible version
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Encoded payload exceeds what the host accepts
    #[error("continuation payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        /// Encoded size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Restored state violates an accumulator invariant
    #[error("invalid continuation state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// The reinvocation call was rejected or failed
    #[error("reinvocation failed: {0}")]
    InvokeError(String),
}
