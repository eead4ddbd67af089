//! Unit tests for environment configuration

use validation_report_aggregator::config::{AggregatorConfig, ConfigError};

fn load(pairs: &[(&'static str, &'static str)]) -> Result<AggregatorConfig, ConfigError> {
    AggregatorConfig::from_lookup(|name| {
        pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
}

const BASE: [(&str, &str); 2] = [
    ("SQS_RESULT_QUEUE", "validation-results"),
    ("SLACK_WEBHOOK", "https://hooks.example.test/services/T000"),
];

#[test]
fn test_recipients_matched_case_insensitively() {
    let mut pairs = BASE.to_vec();
    pairs.push(("RECIPIENTS_DICT", r#"{"ACME": ["ops@acme.test", " "], "ZETA": []}"#));
    pairs.push(("SENDER", "reports@example.test"));
    let config = load(&pairs).unwrap();

    assert_eq!(
        config.recipients_for("acme"),
        Some(&["ops@acme.test".to_string()][..])
    );
    assert_eq!(config.recipients_for("Acme"), config.recipients_for("ACME"));
    assert_eq!(config.recipients_for("zeta"), None);
    assert_eq!(config.recipients_for("other"), None);
}

#[test]
fn test_blank_values_count_as_unset() {
    let mut pairs = BASE.to_vec();
    pairs.push(("REPORT_NAME", "   "));
    pairs.push(("ALERT_MENTION", ""));
    let config = load(&pairs).unwrap();

    assert_eq!(config.report_name, "Daily Ingestion Report");
    assert_eq!(config.alert_mention, None);
    assert_eq!(config.sender, None);

    let err = load(&[("SQS_RESULT_QUEUE", " "), BASE[1]]).unwrap_err();
    assert_eq!(err, ConfigError::Missing("SQS_RESULT_QUEUE"));
}

#[test]
fn test_webhook_must_be_http() {
    let err = load(&[BASE[0], ("SLACK_WEBHOOK", "hooks.example.test/T000")]).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { name: "SLACK_WEBHOOK", .. }));
}

#[test]
fn test_malformed_recipients_rejected() {
    let mut pairs = BASE.to_vec();
    pairs.push(("RECIPIENTS_DICT", "ACME=ops@acme.test"));
    let err = load(&pairs).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { name: "RECIPIENTS_DICT", .. }));
}

#[test]
fn test_verbose_requires_exact_true() {
    let mut pairs = BASE.to_vec();
    pairs.push(("VERBOSE_OUTPUT", "true"));
    assert!(!load(&pairs).unwrap().verbose);
}
