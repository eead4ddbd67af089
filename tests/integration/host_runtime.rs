//! Integration tests for serving invocations from the function host

use crate::support::{fast_settings, report_date, sent_on_report_date, summary_body, Harness};
use async_trait::async_trait;
use chrono::Utc;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use validation_report_aggregator::queue::QueueMessage;
use validation_report_aggregator::resume::ContinuationPayload;
use validation_report_aggregator::runtime::{
    serve, Invocation, InvocationSource, RuntimeApiClient, RuntimeError,
};
use validation_report_aggregator::ReportAccumulator;

/// Runtime that hands out queued invocations and records the answers
#[derive(Default)]
struct ScriptedRuntime {
    invocations: Mutex<VecDeque<Invocation>>,
    responses: Mutex<Vec<(String, serde_json::Value)>>,
    errors: Mutex<Vec<(String, String)>>,
}

impl ScriptedRuntime {
    fn push(&self, request_id: &str, deadline_in_ms: i64, payload: Vec<u8>) {
        self.invocations.lock().unwrap().push_back(Invocation {
            request_id: request_id.to_string(),
            deadline_ms: Utc::now().timestamp_millis() + deadline_in_ms,
            trace_id: None,
            payload,
        });
    }

    fn responses(&self) -> Vec<(String, serde_json::Value)> {
        self.responses.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvocationSource for ScriptedRuntime {
    async fn next_invocation(&self) -> Result<Invocation, RuntimeError> {
        self.invocations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RuntimeError::Transport("no invocation queued".to_string()))
    }

    async fn respond(&self, request_id: &str, body: &serde_json::Value) -> Result<(), RuntimeError> {
        self.responses
            .lock()
            .unwrap()
            .push((request_id.to_string(), body.clone()));
        Ok(())
    }

    async fn report_error(
        &self,
        request_id: &str,
        error_type: &str,
        _message: &str,
    ) -> Result<(), RuntimeError> {
        self.errors
            .lock()
            .unwrap()
            .push((request_id.to_string(), error_type.to_string()));
        Ok(())
    }
}

/// Continuation carrying `files` folded files of 2 records each
fn continuation(files: usize) -> Vec<u8> {
    let mut acc = ReportAccumulator::new(report_date());
    for i in 0..files {
        acc.fold(&QueueMessage {
            message_id: format!("m{i}"),
            receipt_handle: format!("rh{i}"),
            sent_timestamp: None,
            body: summary_body(&format!("f{i}"), "acme:orders", 2, 2, &[]),
        })
        .unwrap();
    }
    ContinuationPayload::new(acc.snapshot()).encode().unwrap()
}

#[tokio::test]
async fn test_continuation_event_restores_state() {
    let harness = Harness::new();
    harness
        .queue
        .push("m9", Some(sent_on_report_date(1)), summary_body("f9", "acme:orders", 1, 1, &[]));
    let runtime = ScriptedRuntime::default();
    runtime.push("req-1", 60_000, continuation(2));

    let served = serve(&harness.job(fast_settings()), &runtime, Some(1))
        .await
        .unwrap();

    assert_eq!(served, 1);
    assert_eq!(
        runtime.responses(),
        vec![(
            "req-1".to_string(),
            json!({ "outcome": "reported", "report_date": "2024-03-01" })
        )]
    );
    let text = harness.notifier.last_text();
    assert!(text.contains("(2024-03-01)"));
    assert!(text.contains("- 5 records from 3 files analyzed"));
}

#[tokio::test]
async fn test_invocation_deadline_drives_suspension() {
    let harness = Harness::new();
    harness
        .queue
        .push("m9", Some(sent_on_report_date(1)), summary_body("f9", "acme:orders", 1, 1, &[]));
    let runtime = ScriptedRuntime::default();
    // inside the safety margin from the start
    runtime.push("req-1", 2_000, continuation(2));

    let job = harness.job(fast_settings());
    serve(&job, &runtime, Some(1)).await.unwrap();

    assert_eq!(runtime.responses()[0].1["outcome"], "suspended");
    assert_eq!(harness.notifier.count(), 0);
    assert_eq!(harness.queue.current_depth().visible, 1);

    // the next link of the chain receives the handed-on state
    let payloads = harness.reinvoker.payloads();
    assert_eq!(payloads.len(), 1);
    runtime.push("req-2", 60_000, payloads[0].clone());
    serve(&job, &runtime, Some(1)).await.unwrap();

    assert_eq!(
        runtime.responses()[1],
        (
            "req-2".to_string(),
            json!({ "outcome": "reported", "report_date": "2024-03-01" })
        )
    );
    assert_eq!(harness.notifier.count(), 1);
    assert!(harness
        .notifier
        .last_text()
        .contains("- 5 records from 3 files analyzed"));
}

#[tokio::test]
async fn test_failed_invocation_reported_and_loop_continues() {
    let harness = Harness::new();
    let runtime = ScriptedRuntime::default();
    let mut bad: serde_json::Value = serde_json::from_slice(&continuation(1)).unwrap();
    bad["schema_version"] = json!("0.1.0");
    runtime.push("req-bad", 60_000, serde_json::to_vec(&bad).unwrap());
    runtime.push("req-fresh", 60_000, Vec::new());

    let served = serve(&harness.job(fast_settings()), &runtime, Some(2))
        .await
        .unwrap();

    assert_eq!(served, 2);
    assert_eq!(
        runtime.errors(),
        vec![("req-bad".to_string(), "InvalidEvent".to_string())]
    );
    let responses = runtime.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "req-fresh");
    assert_eq!(responses[0].1["outcome"], "reported");
}

#[tokio::test]
async fn test_runtime_api_failure_stops_serving() {
    let harness = Harness::new();
    let runtime = ScriptedRuntime::default();

    let result = serve(&harness.job(fast_settings()), &runtime, None).await;
    assert!(matches!(result, Err(RuntimeError::Transport(_))));
}

#[tokio::test]
async fn test_runtime_client_round_trip() {
    let server = MockServer::start_async().await;
    let deadline_ms = Utc::now().timestamp_millis() + 60_000;
    let next = server
        .mock_async(|when, then| {
            when.method(GET).path("/2018-06-01/runtime/invocation/next");
            then.status(200)
                .header("Lambda-Runtime-Aws-Request-Id", "req-1")
                .header("Lambda-Runtime-Deadline-Ms", deadline_ms.to_string())
                .header("Lambda-Runtime-Trace-Id", "Root=1-5759e988-bd862e3fe1be46a994272793")
                .body(continuation(2));
        })
        .await;
    let response = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2018-06-01/runtime/invocation/req-1/response")
                .json_body(json!({ "outcome": "reported", "report_date": "2024-03-01" }));
            then.status(202);
        })
        .await;

    let harness = Harness::new();
    let client = RuntimeApiClient::new(&server.address().to_string());
    let served = serve(&harness.job(fast_settings()), &client, Some(1))
        .await
        .unwrap();

    assert_eq!(served, 1);
    next.assert_async().await;
    response.assert_async().await;
    assert!(harness
        .notifier
        .last_text()
        .contains("- 4 records from 2 files analyzed"));
}

#[tokio::test]
async fn test_runtime_client_reads_invocation_headers() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/2018-06-01/runtime/invocation/next");
            then.status(200)
                .header("Lambda-Runtime-Aws-Request-Id", "req-7")
                .header("Lambda-Runtime-Deadline-Ms", "1709337600000")
                .body("{}");
        })
        .await;

    let client = RuntimeApiClient::new(&server.address().to_string());
    let invocation = client.next_invocation().await.unwrap();

    assert_eq!(invocation.request_id, "req-7");
    assert_eq!(invocation.deadline_ms, 1_709_337_600_000);
    assert_eq!(invocation.trace_id, None);
    assert_eq!(invocation.payload, b"{}");
}

#[tokio::test]
async fn test_runtime_client_rejects_missing_deadline() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/2018-06-01/runtime/invocation/next");
            then.status(200)
                .header("Lambda-Runtime-Aws-Request-Id", "req-7")
                .body("{}");
        })
        .await;

    let client = RuntimeApiClient::new(&server.address().to_string());
    assert!(matches!(
        client.next_invocation().await,
        Err(RuntimeError::InvalidHeader { header: "Lambda-Runtime-Deadline-Ms", .. })
    ));
}

#[tokio::test]
async fn test_runtime_client_posts_errors() {
    let server = MockServer::start_async().await;
    let error = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2018-06-01/runtime/invocation/req-1/error")
                .header("Lambda-Runtime-Function-Error-Type", "InvalidEvent")
                .json_body(json!({ "errorMessage": "bad payload", "errorType": "InvalidEvent" }));
            then.status(202);
        })
        .await;

    let client = RuntimeApiClient::new(&server.address().to_string());
    client
        .report_error("req-1", "InvalidEvent", "bad payload")
        .await
        .unwrap();
    error.assert_async().await;
}
