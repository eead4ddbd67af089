//! Runtime API client

use super::{Invocation, InvocationSource, RuntimeError};
use crate::config::HTTP_CONNECT_TIMEOUT;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::sync::Arc;
use tracing::debug;

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
const TRACE_ID_HEADER: &str = "Lambda-Runtime-Trace-Id";
const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";

/// `next` blocks until an event arrives, so only connecting is bounded
static RUNTIME_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {}. Check system TLS configuration.", e);
            }),
    )
});

/// Client for the host's runtime API
pub struct RuntimeApiClient {
    base_url: String,
    client: Arc<Client>,
}

impl RuntimeApiClient {
    /// Client for the runtime API listening on `endpoint` (`host:port`)
    pub fn new(endpoint: &str) -> Self {
        Self {
            base_url: format!("http://{endpoint}/{API_VERSION}/runtime/invocation"),
            client: RUNTIME_HTTP_CLIENT.clone(),
        }
    }

    /// Client for the endpoint in `AWS_LAMBDA_RUNTIME_API`
    pub fn from_env() -> Result<Self, RuntimeError> {
        std::env::var("AWS_LAMBDA_RUNTIME_API")
            .map(|endpoint| Self::new(&endpoint))
            .map_err(|_| RuntimeError::MissingVariable("AWS_LAMBDA_RUNTIME_API"))
    }

    async fn post(
        &self,
        url: String,
        body: &serde_json::Value,
        error_type: Option<&str>,
    ) -> Result<(), RuntimeError> {
        let mut request = self.client.post(&url).json(body);
        if let Some(error_type) = error_type {
            request = request.header(ERROR_TYPE_HEADER, error_type);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, RuntimeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown response".to_string());
    Err(RuntimeError::Status {
        status: status.as_u16(),
        body,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, RuntimeError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(RuntimeError::InvalidHeader {
            header: name,
            value: String::new(),
        })
}

#[async_trait]
impl InvocationSource for RuntimeApiClient {
    async fn next_invocation(&self) -> Result<Invocation, RuntimeError> {
        let response = self
            .client
            .get(format!("{}/next", self.base_url))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        let headers = response.headers();
        let request_id = header(headers, REQUEST_ID_HEADER)?.to_string();
        let deadline = header(headers, DEADLINE_HEADER)?;
        let deadline_ms = deadline
            .parse::<i64>()
            .map_err(|_| RuntimeError::InvalidHeader {
                header: DEADLINE_HEADER,
                value: deadline.to_string(),
            })?;
        let trace_id = header(headers, TRACE_ID_HEADER).ok().map(str::to_string);

        let payload = response
            .bytes()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?
            .to_vec();

        debug!(request_id = %request_id, deadline_ms = deadline_ms, "Fetched next invocation");
        Ok(Invocation {
            request_id,
            deadline_ms,
            trace_id,
            payload,
        })
    }

    async fn respond(&self, request_id: &str, body: &serde_json::Value) -> Result<(), RuntimeError> {
        self.post(format!("{}/{request_id}/response", self.base_url), body, None)
            .await
    }

    async fn report_error(
        &self,
        request_id: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), RuntimeError> {
        let body = serde_json::json!({
            "errorMessage": message,
            "errorType": error_type,
        });
        self.post(
            format!("{}/{request_id}/error", self.base_url),
            &body,
            Some(error_type),
        )
        .await
    }
}
