//! Error types for the csvup CLI
//!
//! Wraps pipeline errors and adds the failures only the command line can
//! produce, each with a message that says what to check.

use csvup_common::{CsvupError, RunResult};
use std::path::Path;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Config file could not be read or parsed
    #[error("Config file '{path}': {message}. Check that it exists and is valid JSON.")]
    ConfigFile { path: String, message: String },

    /// Configuration is missing or invalid after merging file and flags
    #[error("Configuration error: {0}. Check the config file and command-line flags.")]
    Config(String),

    /// Credentials could not be resolved
    #[error("Missing credentials: {0}. Pass --username/--password or name the environment variables holding them.")]
    Credentials(String),

    /// The upload run itself failed
    #[error(transparent)]
    Upload(CsvupError),

    /// Summary output could not be encoded
    #[error("Failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging or other setup failed
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a config file error
    pub fn config_file(path: &Path, message: impl ToString) -> Self {
        Self::ConfigFile {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Partial run result carried by the error, if any
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            Self::Upload(e) => e.run_result(),
            _ => None,
        }
    }
}

impl From<CsvupError> for CliError {
    fn from(error: CsvupError) -> Self {
        match error {
            CsvupError::InvalidConfiguration(msg) => Self::Config(msg),
            CsvupError::MissingCredentials(msg) => Self::Credentials(msg),
            other => Self::Upload(other),
        }
    }
}
