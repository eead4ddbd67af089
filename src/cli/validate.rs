//! Validation subcommand

use super::CliError;
use crate::config::AggregatorConfig;
use crate::resume::ContinuationPayload;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Validate command for checking configuration and continuation payloads
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// What to validate
    #[command(subcommand)]
    pub target: ValidateTarget,
}

/// Target type for validation
#[derive(clap::Subcommand, Debug)]
pub enum ValidateTarget {
    /// Validate the environment configuration
    Config,
    /// Validate a continuation payload (e.g. a hand-off file)
    Payload {
        /// Payload file
        path: PathBuf,
    },
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self) -> Result<(), CliError> {
        match &self.target {
            ValidateTarget::Config => self.validate_config(),
            ValidateTarget::Payload { path } => self.validate_payload(path),
        }
    }

    /// Validate the environment configuration
    fn validate_config(&self) -> Result<(), CliError> {
        match AggregatorConfig::from_env() {
            Ok(config) => {
                println!("Valid configuration");
                println!("  Queue: {}", config.queue_name);
                println!("  Report name: {}", config.report_name);
                println!("  Region: {}", config.region);
                println!(
                    "  Time budget margin: {} ms",
                    config.time_budget_margin.as_millis()
                );
                println!("  Sender: {}", config.sender.as_deref().unwrap_or("(none)"));
                for (provider, recipients) in &config.recipients {
                    println!("  Recipients for {}: {}", provider, recipients.join(", "));
                }
                if !config.cc.is_empty() {
                    println!("  CC: {}", config.cc.join(", "));
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("Invalid configuration: {}", e);
                Err(CliError::ConfigError(e))
            }
        }
    }

    /// Validate a continuation payload file
    fn validate_payload(&self, path: &Path) -> Result<(), CliError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CliError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        match ContinuationPayload::decode(&bytes) {
            Ok(payload) => {
                let state = payload.state();
                println!("Valid continuation payload ({} bytes)", bytes.len());
                println!("  Schema version: {}", payload.schema_version());
                println!("  Report date: {}", state.report_date());
                println!("  Messages received: {}", state.messages_received());
                println!("  Groups: {}", state.groups().len());
                println!(
                    "  Validations failed: {}/{}",
                    state.total_validations_failed(),
                    state.total_validation_count()
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("Invalid continuation payload: {}", e);
                Err(CliError::ResumeError(e))
            }
        }
    }
}
