//! Outcome records produced by an upload run
//!
//! These are the only values that outlive a run: one [`AttemptRecord`] per HTTP
//! attempt, one [`ChunkResult`] per chunk, gathered into a [`RunResult`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Detail of a failed upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    /// HTTP status, absent for transport-level failures
    pub status: Option<u16>,

    /// Human-readable error detail (response body excerpt or transport error)
    pub message: String,
}

impl UploadFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Classification of a single upload attempt
///
/// Produced by the uploader from response or transport data. Retry decisions
/// dispatch exhaustively on this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// The server accepted the chunk (2xx)
    Success { http_status: u16 },

    /// Transient condition: 429, 5xx, timeout, connection or DNS failure
    Retryable(UploadFailure),

    /// The request will never succeed as sent: any other 4xx
    Fatal(UploadFailure),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    /// Short label used in log records and summaries
    pub fn label(&self) -> &'static str {
        match self {
            UploadOutcome::Success { .. } => "success",
            UploadOutcome::Retryable(_) => "retryable-failure",
            UploadOutcome::Fatal(_) => "fatal-failure",
        }
    }

    /// Failure detail, if this attempt failed
    pub fn failure(&self) -> Option<&UploadFailure> {
        match self {
            UploadOutcome::Success { .. } => None,
            UploadOutcome::Retryable(failure) | UploadOutcome::Fatal(failure) => Some(failure),
        }
    }
}

/// Outcome of one upload attempt for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based chunk index in source order
    pub chunk: usize,

    /// 1-based attempt number
    pub attempt: u32,

    /// Backoff wait elapsed before this attempt (zero for the first)
    #[serde(rename = "waited_ms", serialize_with = "serialize_millis")]
    pub waited: Duration,

    pub outcome: UploadOutcome,
}

/// Terminal state of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChunkResult {
    Delivered {
        chunk: usize,
        rows: usize,
        attempts: u32,
    },
    Failed {
        chunk: usize,
        rows: usize,
        /// The attempt that ended retries
        last_attempt: AttemptRecord,
    },
}

impl ChunkResult {
    pub fn chunk(&self) -> usize {
        match self {
            ChunkResult::Delivered { chunk, .. } | ChunkResult::Failed { chunk, .. } => *chunk,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            ChunkResult::Delivered { rows, .. } | ChunkResult::Failed { rows, .. } => *rows,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ChunkResult::Delivered { .. })
    }

    /// Number of attempts spent on this chunk
    pub fn attempts(&self) -> u32 {
        match self {
            ChunkResult::Delivered { attempts, .. } => *attempts,
            ChunkResult::Failed { last_attempt, .. } => last_attempt.attempt,
        }
    }
}

impl fmt::Display for ChunkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkResult::Delivered {
                chunk,
                rows,
                attempts,
            } => write!(
                f,
                "chunk {} delivered ({} rows, {} attempt(s))",
                chunk, rows, attempts
            ),
            ChunkResult::Failed {
                chunk,
                rows,
                last_attempt,
            } => {
                write!(
                    f,
                    "chunk {} failed ({} rows) after {} attempt(s): {}",
                    chunk,
                    rows,
                    last_attempt.attempt,
                    last_attempt.outcome.label()
                )?;
                if let Some(failure) = last_attempt.outcome.failure() {
                    write!(f, " - {}", failure)?;
                }
                Ok(())
            },
        }
    }
}

/// Ordered chunk results for a whole run, one per chunk in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub chunks: Vec<ChunkResult>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ChunkResult) {
        self.chunks.push(result);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// A run succeeds only if every chunk was delivered. Zero chunks is a success.
    pub fn is_success(&self) -> bool {
        self.chunks.iter().all(ChunkResult::is_delivered)
    }

    pub fn delivered(&self) -> impl Iterator<Item = &ChunkResult> {
        self.chunks.iter().filter(|c| c.is_delivered())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChunkResult> {
        self.chunks.iter().filter(|c| !c.is_delivered())
    }

    /// Indices of failed chunks
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.failed().map(ChunkResult::chunk).collect()
    }

    pub fn rows_delivered(&self) -> usize {
        self.delivered().map(ChunkResult::rows).sum()
    }
}

/// Whole milliseconds in `value`, saturating at `u64::MAX`
pub fn millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(millis(*value))
}
