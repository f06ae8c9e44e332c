//! csvup Upload Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams a delimited text file, splits it into bounded chunks and uploads
//! each chunk to a connector file-upload endpoint, retrying transient
//! failures with exponential backoff.
//!
//! # Overview
//!
//! - **reader**: header-aware streaming CSV reader
//! - **chunker**: groups rows into chunks by row count and optional byte size
//! - **auth**: credential resolution and the per-request auth context
//! - **uploader**: one HTTP attempt per call, classified as success, retryable or fatal
//! - **retry**: attempt budget and backoff schedule
//! - **orchestrator**: drives a run and collects per-chunk results
//! - **sink**: observability for attempts and chunk results
//!
//! # Example
//!
//! ```no_run
//! use csvup_core::{upload_csv, UploadConfig};
//!
//! # async fn example() -> csvup_common::Result<()> {
//! let config = UploadConfig {
//!     csv_path: Some("assets.csv".into()),
//!     base_url: Some("https://gateway.example.com".to_string()),
//!     username: Some("svc-upload".to_string()),
//!     password: Some("secret".into()),
//!     connection_uuid: Some("0b6f5a4e-0b4e-4f8e-9a51-8f0a8c3a2e11".to_string()),
//!     profile_uuid: Some("5c1f9d22-7a3b-4e0c-8d7e-2f6b1a9c4d55".to_string()),
//!     ..UploadConfig::default()
//! };
//!
//! let result = upload_csv(&config).await?;
//! println!("{} rows delivered", result.rows_delivered());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod auth;
pub mod chunker;
pub mod config;
pub mod endpoints;
pub mod orchestrator;
pub mod reader;
pub mod retry;
pub mod sink;
pub mod uploader;

pub use archive::ChunkArchive;
pub use auth::{AuthContext, AuthSession, Credentials, Secret};
pub use chunker::{Chunk, Chunker};
pub use config::{AuthMode, UploadConfig, UploadTarget};
pub use orchestrator::{Orchestrator, RunOptions};
pub use reader::{Header, Row, TabularReader};
pub use retry::RetryPolicy;
pub use sink::{EventSink, FanoutSink, MemorySink, TracingSink};
pub use uploader::{ChunkUploader, HttpUploader};

use csvup_common::{CsvupError, Result, RunResult};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upload a whole file as configured, logging through [`TracingSink`]
pub async fn upload_csv(config: &UploadConfig) -> Result<RunResult> {
    upload_csv_with(config, Arc::new(TracingSink), &CancellationToken::new()).await
}

/// Upload `source` with the rest of `config`, ignoring its `csvPath`
pub async fn upload_file(source: &Path, config: &UploadConfig) -> Result<RunResult> {
    let config = UploadConfig {
        csv_path: Some(source.to_path_buf()),
        ..config.clone()
    };
    upload_csv(&config).await
}

/// Upload a whole file, reporting to `sink` and stopping early if `cancel` fires
///
/// Configuration, source availability and credentials are all checked before
/// the first network call.
pub async fn upload_csv_with(
    config: &UploadConfig,
    sink: Arc<dyn EventSink>,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    config.validate()?;
    let source = config.source_path()?;
    let target = config.target()?;

    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| CsvupError::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        })?;
    if !metadata.is_file() {
        return Err(CsvupError::SourceUnavailable {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }

    let credentials = Credentials::resolve(config)?;
    let client = uploader::build_client(config)?;
    let auth = AuthSession::new(credentials, config.auth_mode)
        .context(&client, &target)
        .await?;
    debug!(mode = ?auth.mode(), "Authentication ready");

    let uploader = HttpUploader::new(client, &target, auth, archive::source_stem(source));
    let retry = RetryPolicy::from_config(config)?;
    info!(
        url = %uploader.url(),
        source = %source.display(),
        max_attempts = config.max_attempts,
        max_backoff_ms = csvup_common::millis(retry.worst_case_wait()),
        "Uploading"
    );

    Orchestrator::new(Arc::new(uploader), retry, RunOptions::from_config(config)?)
    .with_sink(sink)
    .run_with_cancel(source, cancel)
    .await
}
