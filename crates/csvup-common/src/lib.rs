//! csvup Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the csvup workspace.
//!
//! # Overview
//!
//! This crate provides functionality used by both the upload pipeline and the CLI:
//!
//! - **Error Handling**: the run-level error taxonomy and result alias
//! - **Logging**: tracing subscriber setup with rotating file output
//! - **Types**: per-attempt and per-chunk outcome records
//!
//! # Example
//!
//! ```no_run
//! use csvup_common::{CsvupError, Result, RunResult};
//!
//! fn finish(result: RunResult) -> Result<RunResult> {
//!     if result.is_success() {
//!         Ok(result)
//!     } else {
//!         Err(CsvupError::RunIncomplete { result })
//!     }
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CsvupError, Result};
pub use types::{millis, AttemptRecord, ChunkResult, RunResult, UploadFailure, UploadOutcome};
