//! Run summary printed when a run ends

use crate::Result;
use csvup_common::RunResult;

/// One line per chunk, then a totals line
pub fn render_text(result: &RunResult) -> String {
    let mut out = String::new();
    for chunk in &result.chunks {
        out.push_str(&chunk.to_string());
        out.push('\n');
    }
    out.push_str(&format!(
        "{} of {} chunk(s) delivered, {} row(s) uploaded\n",
        result.delivered().count(),
        result.len(),
        result.rows_delivered()
    ));
    out
}

/// The whole result as pretty-printed JSON
pub fn render_json(result: &RunResult, status: &str) -> Result<String> {
    let value = serde_json::json!({
        "status": status,
        "chunks": result.chunks,
        "delivered": result.delivered().count(),
        "failed": result.failed_chunks(),
        "rows_delivered": result.rows_delivered(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use csvup_common::{AttemptRecord, ChunkResult, UploadFailure, UploadOutcome};
    use std::time::Duration;

    fn mixed() -> RunResult {
        let mut result = RunResult::new();
        result.push(ChunkResult::Delivered {
            chunk: 1,
            rows: 100,
            attempts: 1,
        });
        result.push(ChunkResult::Failed {
            chunk: 2,
            rows: 40,
            last_attempt: AttemptRecord {
                chunk: 2,
                attempt: 1,
                waited: Duration::ZERO,
                outcome: UploadOutcome::Fatal(UploadFailure::new(Some(400), "bad header")),
            },
        });
        result
    }

    #[test]
    fn test_text_summary() {
        let text = render_text(&mixed());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "chunk 1 delivered (100 rows, 1 attempt(s))");
        assert!(lines[1].starts_with("chunk 2 failed (40 rows) after 1 attempt(s)"));
        assert_eq!(lines[2], "1 of 2 chunk(s) delivered, 100 row(s) uploaded");
    }

    #[test]
    fn test_json_summary() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&mixed(), "incomplete").unwrap()).unwrap();

        assert_eq!(json["status"], "incomplete");
        assert_eq!(json["failed"], serde_json::json!([2]));
        assert_eq!(json["rows_delivered"], 100);
        assert_eq!(json["chunks"][0]["state"], "delivered");
    }
}
