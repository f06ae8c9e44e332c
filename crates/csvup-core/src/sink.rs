//! Observability sinks for attempt and chunk records
//!
//! The pipeline never writes to global state directly; it reports to an
//! injected [`EventSink`]. [`TracingSink`] turns records into structured log
//! events, [`MemorySink`] keeps them for inspection.

use csvup_common::{millis, AttemptRecord, ChunkResult, UploadOutcome};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Receiver of per-attempt and per-chunk records
pub trait EventSink: Send + Sync {
    /// Called once after the pre-flight scan with the number of data rows
    fn on_scan(&self, _total_rows: usize) {}

    /// Called once per upload attempt
    fn on_attempt(&self, record: &AttemptRecord);

    /// Called once per chunk when its result is final
    fn on_chunk_result(&self, result: &ChunkResult);
}

/// Emits one structured tracing event per record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_scan(&self, total_rows: usize) {
        info!(rows = total_rows, "Source validated");
    }

    fn on_attempt(&self, record: &AttemptRecord) {
        let waited_ms = millis(record.waited);
        match &record.outcome {
            UploadOutcome::Success { http_status } => info!(
                chunk = record.chunk,
                attempt = record.attempt,
                waited_ms,
                status = http_status,
                "Upload attempt succeeded"
            ),
            UploadOutcome::Retryable(failure) => warn!(
                chunk = record.chunk,
                attempt = record.attempt,
                waited_ms,
                status = ?failure.status,
                error = %failure.message,
                "Upload attempt failed, retryable"
            ),
            UploadOutcome::Fatal(failure) => error!(
                chunk = record.chunk,
                attempt = record.attempt,
                waited_ms,
                status = ?failure.status,
                error = %failure.message,
                "Upload attempt failed, not retryable"
            ),
        }
    }

    fn on_chunk_result(&self, result: &ChunkResult) {
        match result {
            ChunkResult::Delivered {
                chunk,
                rows,
                attempts,
            } => info!(chunk, rows, attempts, "Chunk delivered"),
            ChunkResult::Failed {
                chunk,
                rows,
                last_attempt,
            } => error!(
                chunk,
                rows,
                attempts = last_attempt.attempt,
                classification = last_attempt.outcome.label(),
                error = ?last_attempt.outcome.failure().map(ToString::to_string),
                "Chunk failed"
            ),
        }
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    attempts: Mutex<Vec<AttemptRecord>>,
    results: Mutex<Vec<ChunkResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn results(&self) -> Vec<ChunkResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn on_attempt(&self, record: &AttemptRecord) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }

    fn on_chunk_result(&self, result: &ChunkResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}

/// Forwards every record to each inner sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn on_scan(&self, total_rows: usize) {
        self.sinks.iter().for_each(|s| s.on_scan(total_rows));
    }

    fn on_attempt(&self, record: &AttemptRecord) {
        self.sinks.iter().for_each(|s| s.on_attempt(record));
    }

    fn on_chunk_result(&self, result: &ChunkResult) {
        self.sinks.iter().for_each(|s| s.on_chunk_result(result));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingSink));

        fanout.on_attempt(&AttemptRecord {
            chunk: 1,
            attempt: 1,
            waited: Duration::ZERO,
            outcome: UploadOutcome::Success { http_status: 200 },
        });
        fanout.on_chunk_result(&ChunkResult::Delivered {
            chunk: 1,
            rows: 10,
            attempts: 1,
        });

        for sink in [&first, &second] {
            assert_eq!(sink.attempts().len(), 1);
            assert_eq!(sink.results().len(), 1);
        }
    }
}
