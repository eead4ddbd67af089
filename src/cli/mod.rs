//! CLI command implementations

pub mod error;
pub mod run;
pub mod serve;
pub mod validate;

pub use error::CliError;
pub use run::{run_from_handoff, Cli, Commands, RunArgs};
pub use serve::ServeArgs;
pub use validate::{ValidateCommand, ValidateTarget};
