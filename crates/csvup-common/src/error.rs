//! Error types for csvup
//!
//! Pre-flight and parse errors abort a run before (or without) uploading.
//! Per-attempt upload failures are not errors; they are classified as
//! [`UploadOutcome`](crate::types::UploadOutcome) values and only surface here
//! once a run ends with undelivered chunks.

use crate::types::RunResult;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for csvup operations
pub type Result<T> = std::result::Result<T, CsvupError>;

/// Main error type for csvup
#[derive(Error, Debug)]
pub enum CsvupError {
    /// Bad tuning or target values, detected before the source is opened
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Source file '{}' is unavailable: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Token exchange rejected or unreachable
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Run incomplete: {}", describe_failures(.result))]
    RunIncomplete { result: RunResult },

    #[error("Run cancelled after {} chunk(s) ({} delivered)", .result.len(), .result.delivered().count())]
    RunCancelled { result: RunResult },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CsvupError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a missing credentials error
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    /// Create a malformed record error
    pub fn malformed(line: u64, msg: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: msg.into(),
        }
    }

    /// Partial results of a run that started uploading, if any
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            Self::RunIncomplete { result } | Self::RunCancelled { result } => Some(result),
            _ => None,
        }
    }
}

fn describe_failures(result: &RunResult) -> String {
    let failures: Vec<String> = result.failed().map(ToString::to_string).collect();
    format!(
        "{} of {} chunk(s) failed: {}",
        failures.len(),
        result.len(),
        failures.join("; ")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{AttemptRecord, ChunkResult, UploadFailure, UploadOutcome};
    use std::time::Duration;

    #[test]
    fn test_run_incomplete_names_failed_chunk() {
        let mut result = RunResult::new();
        result.push(ChunkResult::Delivered {
            chunk: 1,
            rows: 100,
            attempts: 1,
        });
        result.push(ChunkResult::Failed {
            chunk: 2,
            rows: 100,
            last_attempt: AttemptRecord {
                chunk: 2,
                attempt: 3,
                waited: Duration::from_secs(20),
                outcome: UploadOutcome::Retryable(UploadFailure::new(Some(503), "busy")),
            },
        });

        let message = CsvupError::RunIncomplete { result }.to_string();
        assert!(message.starts_with("Run incomplete: 1 of 2 chunk(s) failed"));
        assert!(message.contains("chunk 2 failed"));
        assert!(message.contains("HTTP 503: busy"));
    }

    #[test]
    fn test_run_result_accessor() {
        assert!(CsvupError::invalid_config("chunk size").run_result().is_none());

        let err = CsvupError::RunCancelled {
            result: RunResult::new(),
        };
        assert_eq!(err.run_result().map(RunResult::len), Some(0));
        assert_eq!(err.to_string(), "Run cancelled after 0 chunk(s) (0 delivered)");
    }
}
