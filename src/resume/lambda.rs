//! Asynchronous Lambda self-invocation

use super::{Reinvoker, ResumeError};
use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;
use tracing::info;

/// Status code Lambda returns for an accepted asynchronous invocation
const ACCEPTED: i32 = 202;

/// Reinvoker that starts the running function again with an `Event` invocation
pub struct LambdaReinvoker {
    client: Client,
    function_name: String,
}

impl LambdaReinvoker {
    /// Target `function_name` using the shared AWS configuration
    pub fn new(sdk_config: &aws_config::SdkConfig, function_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl Reinvoker for LambdaReinvoker {
    async fn invoke_async(&self, payload: Vec<u8>) -> Result<(), ResumeError> {
        let bytes = payload.len();
        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| ResumeError::InvokeError(DisplayErrorContext(&e).to_string()))?;

        if output.status_code() != ACCEPTED {
            return Err(ResumeError::InvokeError(format!(
                "unexpected status {} from {}",
                output.status_code(),
                self.function_name
            )));
        }

        info!(
            function_name = %self.function_name,
            payload_bytes = bytes,
            "Continuation invocation accepted"
        );
        Ok(())
    }
}
