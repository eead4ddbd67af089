//! Integration tests for report delivery

use crate::support::{
    config, per_record_body, report_date, summary_body, RecordingMailer, RecordingNotifier,
};
use std::sync::Arc;
use validation_report_aggregator::context::StaticContext;
use validation_report_aggregator::queue::{QueueDepth, QueueMessage};
use validation_report_aggregator::report::{
    DeliveryError, ReportEmitter, ReportFooter, ReportPayload, SlackMessage, ValidationStatus,
    MAX_ERROR_BLOCK_LEN,
};
use validation_report_aggregator::ReportAccumulator;

fn payload(bodies: Vec<String>) -> ReportPayload {
    let mut acc = ReportAccumulator::new(report_date());
    for (i, body) in bodies.into_iter().enumerate() {
        acc.fold(&QueueMessage {
            message_id: format!("m{i}"),
            receipt_handle: format!("rh{i}"),
            sent_timestamp: None,
            body,
        })
        .unwrap();
    }
    ReportPayload::from_accumulator(&acc, MAX_ERROR_BLOCK_LEN)
}

fn footer() -> ReportFooter {
    ReportFooter::from_context(
        &StaticContext::fixed(42_500),
        "eu-west-1",
        Some(QueueDepth {
            visible: 3,
            in_flight: 1,
        }),
    )
}

fn emitter(notifier: &Arc<RecordingNotifier>, mailer: &Arc<RecordingMailer>) -> ReportEmitter {
    ReportEmitter::new(Arc::new(config()), notifier.clone(), mailer.clone())
}

#[tokio::test]
async fn test_failed_report_mentions_on_call() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let report = payload(vec![summary_body("f1", "acme:orders", 5, 5, &[("bad id", 1)])]);

    let summary = emitter(&notifier, &mailer).emit(&report, &footer()).await;

    assert_eq!(summary.status, ValidationStatus::Failed);
    assert!(summary.is_complete());
    let text = notifier.last_text();
    assert!(text.contains("*=== Daily Ingestion Report (2024-03-01) ===*\n FAILED\n <@U0ONCALL>"));
    assert!(text.contains("*Data Provider - ACME*"));
    assert!(text.contains("- 1/5 validations failed (20.00%)"));
    assert!(text.contains("*Error Details*\n```bad id:\n- f1: 1 record\n```"));
}

#[tokio::test]
async fn test_passed_report_has_no_mention() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let report = payload(vec![summary_body("f1", "acme:orders", 5, 5, &[])]);

    emitter(&notifier, &mailer).emit(&report, &footer()).await;

    let text = notifier.last_text();
    assert!(text.contains("\n PASSED"));
    assert!(!text.contains("<@U0ONCALL>"));
    assert!(!text.contains("*Error Details*"));
}

#[tokio::test]
async fn test_footer_carries_invocation_details() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let report = payload(vec![]);

    emitter(&notifier, &mailer).emit(&report, &footer()).await;

    let text = notifier.last_text();
    assert!(text.contains("\n NO RECORDS"));
    assert!(text.contains("*Function Name:* local_validation_results_function"));
    assert!(text.contains("*Request ID:* local"));
    assert!(text.contains("region=eu-west-1#logEventViewer:group=/aws/lambda/local_validation_results_function;stream=local"));
    assert!(text.contains("Analysis reports waiting to be aggregated: *3*"));
    assert!(text.contains("Analysis reports currently being aggregated: *1*"));
    assert!(text.contains("Seconds Remaining in Execution: *42.500*"));
}

#[tokio::test]
async fn test_email_only_for_providers_with_recipients() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let report = payload(vec![
        summary_body("f1", "acme:orders", 5, 5, &[]),
        summary_body("f2", "zeta:trades", 5, 5, &[]),
    ]);

    let summary = emitter(&notifier, &mailer).emit(&report, &footer()).await;

    assert_eq!(summary.emailed_providers, vec!["acme".to_string()]);
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Daily Ingestion Report for ACME");
    assert_eq!(sent[0].sender, "reports@example.test");
    assert_eq!(sent[0].to, vec!["ops@acme.test".to_string()]);
    assert_eq!(sent[0].cc, vec!["audit@example.test".to_string()]);
    assert!(sent[0].text_body.starts_with("*Data Provider - ACME*\n*ORDERS messages*"));
    assert!(!sent[0].text_body.contains("ZETA"));
    assert!(sent[0].html_body.contains("*Data Provider - ACME*<br/>"));
}

#[tokio::test]
async fn test_chat_failure_does_not_block_email() {
    let notifier = Arc::new(RecordingNotifier::failing());
    let mailer = Arc::new(RecordingMailer::default());
    let report = payload(vec![summary_body("f1", "acme:orders", 5, 5, &[])]);

    let summary = emitter(&notifier, &mailer).emit(&report, &footer()).await;

    assert!(!summary.notified);
    assert!(!summary.is_complete());
    assert!(matches!(summary.failures[0], DeliveryError::Notification(_)));
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_email_failure_reported_not_raised() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::failing());
    let report = payload(vec![summary_body("f1", "acme:orders", 5, 5, &[])]);

    let summary = emitter(&notifier, &mailer).emit(&report, &footer()).await;

    assert!(summary.notified);
    assert!(summary.emailed_providers.is_empty());
    assert_eq!(
        summary.failures,
        vec![DeliveryError::Email("message rejected".to_string())]
    );
}

#[tokio::test]
async fn test_long_error_listing_truncated_in_chat() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let validations: Vec<(bool, String)> = (0..400)
        .map(|i| (false, format!("missing_field:column_{i:04}")))
        .collect();
    let validations: Vec<(bool, &str)> = validations
        .iter()
        .map(|(valid, details)| (*valid, details.as_str()))
        .collect();
    let report = payload(vec![per_record_body("f1", "acme:orders", &validations)]);

    emitter(&notifier, &mailer).emit(&report, &footer()).await;

    let messages = notifier.messages.lock().unwrap();
    let message: &SlackMessage = messages.last().unwrap();
    let details = message
        .blocks()
        .iter()
        .filter_map(|b| b.text())
        .find(|t| t.starts_with("*Error Details*"))
        .unwrap();
    assert!(details.contains(" ... [TRUNCATED LIST]```"));
    assert!(details.chars().count() <= 3000);

    for text in message.blocks().iter().filter_map(|b| b.text()) {
        assert!(text.chars().count() <= 3000);
    }
}

#[test]
fn test_webhook_body_shape() {
    let report = payload(vec![summary_body("f1", "acme:orders", 5, 5, &[])]);
    let json = SlackMessage::build(&report, &footer(), "Nightly", None).to_json();

    let blocks = json["blocks"].as_array().unwrap();
    assert_eq!(blocks[0], serde_json::json!({ "type": "divider" }));
    assert_eq!(blocks[1]["type"], "section");
    assert_eq!(blocks[1]["text"]["type"], "mrkdwn");
    assert_eq!(blocks[1]["text"]["text"], "*=== Nightly (2024-03-01) ===*\n PASSED");
    assert_eq!(blocks.last().unwrap(), &serde_json::json!({ "type": "divider" }));
}
