//! Progress bar over uploaded rows
//!
//! The bar length comes from the pre-flight scan. Without a scan, use
//! [`create_spinner`], which counts rows with no total.

use csvup_common::{AttemptRecord, ChunkResult, UploadOutcome};
use csvup_core::EventSink;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} rows ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {pos} rows {msg}";

/// Create a progress bar for an upload of `total` rows
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for uploads of unknown size
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Drives a progress bar from pipeline events
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// A sink that never draws
    pub fn hidden() -> Self {
        Self::new(ProgressBar::hidden())
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl EventSink for ProgressSink {
    fn on_scan(&self, total_rows: usize) {
        self.bar.set_length(total_rows as u64);
    }

    fn on_attempt(&self, record: &AttemptRecord) {
        if let UploadOutcome::Retryable(failure) = &record.outcome {
            self.bar.set_message(format!(
                "chunk {} attempt {} failed ({}), retrying",
                record.chunk, record.attempt, failure
            ));
        }
    }

    fn on_chunk_result(&self, result: &ChunkResult) {
        self.bar.inc(result.rows() as u64);
        self.bar.set_message(result.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar() {
        let pb = create_progress_bar(100, "Uploading");
        assert_eq!(pb.length(), Some(100));
    }

    #[test]
    fn test_sink_counts_rows_of_every_chunk() {
        let sink = ProgressSink::hidden();
        sink.on_scan(250);
        sink.on_chunk_result(&ChunkResult::Delivered {
            chunk: 1,
            rows: 100,
            attempts: 1,
        });
        sink.on_chunk_result(&ChunkResult::Delivered {
            chunk: 2,
            rows: 100,
            attempts: 2,
        });

        assert_eq!(sink.bar().length(), Some(250));
        assert_eq!(sink.bar().position(), 200);
    }
}
