//! Retry with exponential backoff around a single-attempt uploader

use crate::chunker::Chunk;
use crate::config::UploadConfig;
use crate::sink::EventSink;
use crate::uploader::ChunkUploader;
use csvup_common::{millis, AttemptRecord, ChunkResult, CsvupError, Result, UploadOutcome};
use std::time::Duration;
use tracing::info;

/// Attempt budget and backoff schedule for one chunk
///
/// State lives on the stack of [`RetryPolicy::execute`], so one policy can
/// drive any number of chunks concurrently without them affecting each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(CsvupError::invalid_config("maxAttempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            backoff_base,
            backoff_max: None,
        })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Ok(Self::new(config.max_attempts, config.backoff_base())?.with_max_backoff(config.backoff_max()))
    }

    /// Cap a single wait
    pub fn with_max_backoff(mut self, max: Option<Duration>) -> Self {
        self.backoff_max = max;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let wait = self.backoff_base.saturating_mul(factor);
        match self.backoff_max {
            Some(max) => wait.min(max),
            None => wait,
        }
    }

    /// Total backoff a chunk can spend before giving up
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Upload `chunk` until it is delivered, fails fatally, or attempts run out
    pub async fn execute<U>(&self, uploader: &U, chunk: &Chunk, sink: &dyn EventSink) -> ChunkResult
    where
        U: ChunkUploader + ?Sized,
    {
        let mut attempt = 1;
        let mut waited = Duration::ZERO;

        loop {
            let record = AttemptRecord {
                chunk: chunk.index(),
                attempt,
                waited,
                outcome: uploader.upload(chunk).await,
            };
            sink.on_attempt(&record);

            match record.outcome {
                UploadOutcome::Success { .. } => {
                    return ChunkResult::Delivered {
                        chunk: chunk.index(),
                        rows: chunk.len(),
                        attempts: attempt,
                    };
                },
                UploadOutcome::Retryable(_) if attempt < self.max_attempts => {
                    waited = self.backoff_for(attempt);
                    info!(
                        chunk = chunk.index(),
                        attempt,
                        wait_ms = millis(waited),
                        "Retrying chunk after backoff"
                    );
                    tokio::time::sleep(waited).await;
                    attempt += 1;
                },
                UploadOutcome::Retryable(_) | UploadOutcome::Fatal(_) => {
                    return ChunkResult::Failed {
                        chunk: chunk.index(),
                        rows: chunk.len(),
                        last_attempt: record,
                    };
                },
            }
        }
    }
}
