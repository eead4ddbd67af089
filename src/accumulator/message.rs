//! Result message body parsing
//!
//! Upstream validators publish one message per analyzed file:
//!
//! ```json
//! { "key": "orders/2024-01-01.json", "data_group": "acme:orders", "results": ... }
//! ```
//!
//! `results` comes in two shapes. The legacy shape is a list of per-record
//! objects, each carrying a `Validations` list; the summarized shape is a single
//! object of pre-aggregated counts with an `errors` map from error signature to
//! affected-record count. The shape is detected from the JSON type of `results`.

use super::MalformedMessageError;
use crate::GroupKey;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Signature used for failed validations that carry no details
pub const UNSPECIFIED_SIGNATURE: &str = "unspecified validation failure";

/// A parsed and validated result message body
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBody {
    /// Source file identifier
    pub key: String,
    /// Group the file belongs to
    pub group: GroupKey,
    /// Validation results for the file
    pub results: ValidationResults,
}

/// Validation results in either wire shape
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResults {
    /// Legacy shape: one entry per record
    PerRecord(Vec<RecordResult>),
    /// Pre-aggregated counts for the whole file
    Summary(ResultSummary),
}

/// Validations performed on one record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordResult {
    /// Individual validation outcomes
    #[serde(rename = "Validations")]
    pub validations: Vec<Validation>,
}

/// One validation outcome
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Validation {
    /// Whether the validation passed
    #[serde(rename = "Valid")]
    pub valid: bool,
    /// Human-readable failure description; doubles as the error signature
    #[serde(rename = "Details", default)]
    pub details: String,
}

/// Pre-aggregated validation counts for one file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultSummary {
    /// Records in the file
    pub num_records: u64,
    /// Validations performed
    pub num_validations: u64,
    /// Validations that failed
    pub num_validation_errors: u64,
    /// Error signature to number of affected records
    #[serde(default)]
    pub errors: BTreeMap<String, u64>,
}

/// Counts and error occurrences extracted from one body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyTally {
    /// Records analyzed
    pub records: u64,
    /// Validations performed
    pub validations: u64,
    /// Validations failed
    pub failed: u64,
    /// `(signature, occurrence description)` pairs in wire order
    pub occurrences: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct RawBody {
    key: Option<String>,
    data_group: Option<String>,
    results: Option<Value>,
}

impl ResultBody {
    /// Parse a raw queue message body
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessageError`] when the body is not JSON, lacks `key`,
    /// `data_group` or `results`, or when the results fit neither wire shape.
    pub fn parse(body: &str) -> Result<Self, MalformedMessageError> {
        let raw: RawBody = serde_json::from_str(body)
            .map_err(|e| MalformedMessageError::InvalidJson(e.to_string()))?;

        let key = raw
            .key
            .filter(|k| !k.trim().is_empty())
            .ok_or(MalformedMessageError::MissingField("key"))?;
        let data_group = raw
            .data_group
            .ok_or(MalformedMessageError::MissingField("data_group"))?;
        let group = GroupKey::parse(&data_group)
            .map_err(|e| MalformedMessageError::InvalidDataGroup(e.to_string()))?;
        let results = match raw.results {
            None | Some(Value::Null) => return Err(MalformedMessageError::MissingField("results")),
            Some(value) => ValidationResults::from_value(value)?,
        };

        Ok(Self {
            key,
            group,
            results,
        })
    }

    /// Count validations and collect error occurrences for this file
    pub fn tally(&self) -> BodyTally {
        let mut tally = BodyTally::default();
        match &self.results {
            ValidationResults::PerRecord(records) => {
                tally.records = records.len() as u64;
                for (index, record) in records.iter().enumerate() {
                    for validation in &record.validations {
                        tally.validations += 1;
                        if !validation.valid {
                            tally.failed += 1;
                            let signature = if validation.details.trim().is_empty() {
                                UNSPECIFIED_SIGNATURE.to_string()
                            } else {
                                validation.details.clone()
                            };
                            tally
                                .occurrences
                                .push((signature, format!("{} (record {})", self.key, index + 1)));
                        }
                    }
                }
            }
            ValidationResults::Summary(summary) => {
                tally.records = summary.num_records;
                tally.validations = summary.num_validations;
                tally.failed = summary.num_validation_errors;
                for (signature, count) in &summary.errors {
                    let noun = if *count == 1 { "record" } else { "records" };
                    tally
                        .occurrences
                        .push((signature.clone(), format!("{}: {count} {noun}", self.key)));
                }
            }
        }
        tally
    }
}

impl ValidationResults {
    fn from_value(value: Value) -> Result<Self, MalformedMessageError> {
        match value {
            Value::Array(_) => serde_json::from_value::<Vec<RecordResult>>(value)
                .map(ValidationResults::PerRecord)
                .map_err(|e| MalformedMessageError::InvalidResults(e.to_string())),
            Value::Object(_) => {
                let summary: ResultSummary = serde_json::from_value(value)
                    .map_err(|e| MalformedMessageError::InvalidResults(e.to_string()))?;
                if summary.num_validation_errors > summary.num_validations {
                    return Err(MalformedMessageError::InvalidResults(format!(
                        "num_validation_errors ({}) exceeds num_validations ({})",
                        summary.num_validation_errors, summary.num_validations
                    )));
                }
                Ok(ValidationResults::Summary(summary))
            }
            other => Err(MalformedMessageError::InvalidResults(format!(
                "expected a list or an object, got {other}"
            ))),
        }
    }
}
