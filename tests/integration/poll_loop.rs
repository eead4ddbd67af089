//! Integration tests for the poll-and-decide loop

use crate::support::{
    fast_settings, per_record_body, report_date, sent_next_day, sent_on_report_date,
    summary_body, Harness, RecordingMailer, RecordingNotifier, RecordingReinvoker,
};
use validation_report_aggregator::aggregator::{DoneReason, JobOutcome};
use validation_report_aggregator::context::StaticContext;
use validation_report_aggregator::queue::{QueueDepth, ResultQueue};
use validation_report_aggregator::report::ValidationStatus;
use validation_report_aggregator::resume::{ContinuationPayload, InvocationEvent};

fn clean(key: &str) -> String {
    summary_body(key, "acme:orders", 10, 10, &[])
}

/// Scenario D: the queue drains and the report is emitted exactly once
#[tokio::test]
async fn test_drained_queue_emits_report_once() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));
    harness.queue.push("m2", Some(sent_on_report_date(2)), clean("f2"));

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(60_000))
        .await
        .unwrap();

    match outcome {
        JobOutcome::Reported {
            reason, payload, ..
        } => {
            assert_eq!(reason, DoneReason::QueueDrained);
            assert_eq!(payload.status, ValidationStatus::Passed);
            assert_eq!(payload.files_analyzed(), 2);
        }
        other => panic!("Expected Reported, got {:?}", other),
    }
    assert_eq!(harness.notifier.count(), 1);
    assert!(harness.reinvoker.payloads().is_empty());
    assert!(harness.queue.current_depth().is_drained());
}

/// Scenario E: the budget runs low with work left and the state is handed on
#[tokio::test]
async fn test_low_budget_suspends_with_snapshot() {
    let harness = Harness::new();
    for i in 0..5 {
        harness
            .queue
            .push(format!("m{i}"), Some(sent_on_report_date(3)), clean(&format!("f{i}")));
    }

    // 12s, 11s, 10s are above the 10s margin; 9s suspends
    let context = StaticContext::countdown(12_000, 1_000);
    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &context)
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Continued { .. }));
    assert_eq!(harness.notifier.count(), 0);

    let payloads = harness.reinvoker.payloads();
    assert_eq!(payloads.len(), 1);
    let payload = ContinuationPayload::decode(&payloads[0]).unwrap();
    assert_eq!(payload.state().report_date(), report_date());
    assert!(payload.state().is_resuming());
    assert_eq!(payload.state().messages_received(), 3);
    assert_eq!(
        harness.queue.current_depth(),
        QueueDepth {
            visible: 2,
            in_flight: 0
        }
    );
}

#[tokio::test]
async fn test_day_rollover_releases_message_and_reports() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(23)), clean("f1"));
    harness.queue.push("m2", Some(sent_next_day(0)), clean("f2"));
    harness.queue.push("m3", Some(sent_next_day(1)), clean("f3"));

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(60_000))
        .await
        .unwrap();

    match outcome {
        JobOutcome::Reported {
            reason, payload, ..
        } => {
            assert_eq!(reason, DoneReason::DayRolledOver);
            assert_eq!(payload.files_analyzed(), 1);
        }
        other => panic!("Expected Reported, got {:?}", other),
    }

    // the next day's message is visible again for tomorrow's report
    let depth = harness.queue.current_depth();
    assert_eq!(depth.visible, 2);
    assert_eq!(depth.in_flight, 0);
    let next = harness.queue.receive_one().await.unwrap().unwrap();
    assert_eq!(next.message_id, "m2");
}

#[tokio::test]
async fn test_in_flight_messages_suspend_instead_of_spinning() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));
    // another consumer holds the only message
    let _held = harness.queue.receive_one().await.unwrap().unwrap();

    let context = StaticContext::countdown(10_500, 100);
    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &context)
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Continued { .. }));
    assert_eq!(harness.notifier.count(), 0);
    assert_eq!(harness.reinvoker.payloads().len(), 1);
}

#[tokio::test]
async fn test_poison_messages_deleted_and_not_aggregated() {
    let harness = Harness::new();
    harness.queue.push("bad", Some(sent_on_report_date(1)), "{\"key\": \"f0\"");
    harness.queue.push(
        "no-group",
        Some(sent_on_report_date(1)),
        "{\"key\": \"f1\", \"results\": []}",
    );
    harness.queue.push(
        "good",
        Some(sent_on_report_date(2)),
        per_record_body("f2", "acme:orders", &[(false, "bad id")]),
    );

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(60_000))
        .await
        .unwrap();

    match outcome {
        JobOutcome::Reported { payload, .. } => {
            assert_eq!(payload.status, ValidationStatus::Failed);
            assert_eq!(payload.files_analyzed(), 1);
            assert_eq!(payload.total_validations_failed, 1);
            assert_eq!(payload.messages_received, 3);
        }
        other => panic!("Expected Reported, got {:?}", other),
    }
    assert!(harness.queue.current_depth().is_drained());
}

#[tokio::test]
async fn test_redelivered_message_counted_once() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(60_000))
        .await
        .unwrap();

    match outcome {
        JobOutcome::Reported { payload, .. } => {
            assert_eq!(payload.files_analyzed(), 1);
            assert_eq!(payload.total_validation_count, 10);
            assert_eq!(payload.messages_received, 2);
        }
        other => panic!("Expected Reported, got {:?}", other),
    }
    assert!(harness.queue.current_depth().is_drained());
}

#[tokio::test]
async fn test_receive_errors_are_transient() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));
    harness.queue.fail_next_receives(2);

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(60_000))
        .await
        .unwrap();

    match outcome {
        JobOutcome::Reported { payload, .. } => assert_eq!(payload.files_analyzed(), 1),
        other => panic!("Expected Reported, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_reinvocation_emits_partial_report() {
    let harness = Harness::with(
        RecordingNotifier::default(),
        RecordingMailer::default(),
        RecordingReinvoker::failing(),
    );
    for i in 0..4 {
        harness
            .queue
            .push(format!("m{i}"), Some(sent_on_report_date(1)), clean(&format!("f{i}")));
    }

    let context = StaticContext::countdown(11_000, 1_000);
    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &context)
        .await
        .unwrap();

    match outcome {
        JobOutcome::ReportedPartial {
            reinvoke_error,
            payload,
            ..
        } => {
            assert!(reinvoke_error.contains("throttled"));
            assert_eq!(payload.files_analyzed(), 2);
        }
        other => panic!("Expected ReportedPartial, got {:?}", other),
    }
    assert_eq!(harness.notifier.count(), 1);
    assert!(harness.notifier.last_text().contains("*Partial report:*"));
}

#[tokio::test]
async fn test_exhausted_budget_suspends_before_receiving() {
    let harness = Harness::new();
    harness.queue.push("m1", Some(sent_on_report_date(1)), clean("f1"));

    let outcome = harness
        .job(fast_settings())
        .run(InvocationEvent::Fresh, Some(report_date()), &StaticContext::fixed(0))
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Continued { .. }));
    assert_eq!(harness.queue.current_depth().visible, 1);
}
