//! Drives a whole run: read, chunk, upload with retry, collect results
//!
//! Chunks are produced lazily and uploaded through a bounded buffer, so at
//! most `concurrency` chunks are held in memory at once. Results are always
//! reported in chunk order, whatever order the uploads complete in.

use crate::archive::{source_stem, ChunkArchive};
use crate::chunker::{Chunk, Chunker};
use crate::config::{UploadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_HEADER_LINE};
use crate::reader::TabularReader;
use crate::retry::RetryPolicy;
use crate::sink::{EventSink, TracingSink};
use crate::uploader::ChunkUploader;
use csvup_common::{ChunkResult, CsvupError, Result, RunResult};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a run reads and schedules chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// 1-based header row position
    pub header_line: usize,
    pub chunk_size: i64,
    pub max_chunk_bytes: Option<u64>,
    /// Chunks uploaded at once
    pub concurrency: usize,
    pub stop_on_first_failure: bool,
    /// Parse the whole source before the first upload
    pub preflight_scan: bool,
    pub archive_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            header_line: DEFAULT_HEADER_LINE as usize,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_bytes: None,
            concurrency: 1,
            stop_on_first_failure: false,
            preflight_scan: true,
            archive_dir: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Ok(Self {
            header_line: config.header_line()?,
            chunk_size: config.chunk_size,
            max_chunk_bytes: config.max_chunk_bytes,
            concurrency: config.concurrency,
            stop_on_first_failure: config.stop_on_first_failure,
            preflight_scan: config.preflight_scan,
            archive_dir: config.archive_dir.clone(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.header_line == 0 {
            return Err(CsvupError::invalid_config("header must be a 1-based line number"));
        }
        if self.chunk_size <= 0 {
            return Err(CsvupError::invalid_config(format!(
                "chunkSize must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.concurrency == 0 {
            return Err(CsvupError::invalid_config("concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Uploads every chunk of a source file and reports what happened to each
pub struct Orchestrator {
    uploader: Arc<dyn ChunkUploader>,
    retry: RetryPolicy,
    sink: Arc<dyn EventSink>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(uploader: Arc<dyn ChunkUploader>, retry: RetryPolicy, options: RunOptions) -> Self {
        Self {
            uploader,
            retry,
            sink: Arc::new(TracingSink),
            options,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run to completion
    pub async fn run(&self, source: &Path) -> Result<RunResult> {
        self.run_with_cancel(source, &CancellationToken::new()).await
    }

    /// Run until every chunk is handled or `cancel` fires
    ///
    /// Cancellation is observed before each chunk is read: chunks already in
    /// flight finish, no new chunk starts, and the partial result is returned
    /// as [`CsvupError::RunCancelled`]. Any failed chunk turns the result into
    /// [`CsvupError::RunIncomplete`].
    pub async fn run_with_cancel(&self, source: &Path, cancel: &CancellationToken) -> Result<RunResult> {
        self.options.validate()?;
        let header_line = self.options.header_line;

        if self.options.preflight_scan {
            let total = TabularReader::scan(source, header_line)?;
            self.sink.on_scan(total);
        }

        let reader = TabularReader::open(source, header_line)?;
        let Some(header) = reader.header().cloned() else {
            info!(source = %source.display(), header_line, "Source has no header row, nothing to upload");
            return Ok(RunResult::new());
        };
        let mut chunks = Chunker::new(reader, header, self.options.chunk_size)?
            .with_max_bytes(self.options.max_chunk_bytes);

        let archive = match &self.options.archive_dir {
            Some(root) => Some(ChunkArchive::create(root, source).await?),
            None => None,
        };
        if let Some(archive) = &archive {
            info!(dir = %archive.dir().display(), "Archiving chunk files");
        }
        let stem = source_stem(source);

        info!(
            source = %source.display(),
            chunk_size = self.options.chunk_size,
            concurrency = self.options.concurrency,
            max_attempts = self.retry.max_attempts(),
            "Starting upload run"
        );

        let stop = AtomicBool::new(false);
        let mut cancelled = false;
        let mut read_error = None;
        let mut result = RunResult::new();
        {
            let next_chunk = std::iter::from_fn(|| {
                if stop.load(Ordering::Acquire) {
                    return None;
                }
                if cancel.is_cancelled() {
                    cancelled = true;
                    return None;
                }
                match chunks.next()? {
                    Ok(chunk) => Some(chunk),
                    Err(e) => {
                        read_error = Some(e);
                        None
                    },
                }
            });

            let mut deliveries = std::pin::pin!(stream::iter(next_chunk)
                .map(|chunk| self.deliver(chunk, archive.as_ref(), &stem))
                .buffered(self.options.concurrency));

            while let Some(outcome) = deliveries.next().await {
                if !outcome.is_delivered() && self.options.stop_on_first_failure {
                    stop.store(true, Ordering::Release);
                }
                result.push(outcome);
            }
        }

        if cancelled {
            warn!(
                handled = result.len(),
                delivered = result.delivered().count(),
                "Upload run cancelled"
            );
            return Err(CsvupError::RunCancelled { result });
        }
        if let Some(e) = read_error {
            return Err(e);
        }

        info!(
            chunks = result.len(),
            delivered = result.delivered().count(),
            rows = result.rows_delivered(),
            "Upload run finished"
        );
        if result.is_success() {
            Ok(result)
        } else {
            Err(CsvupError::RunIncomplete { result })
        }
    }

    async fn deliver(&self, chunk: Chunk, archive: Option<&ChunkArchive>, stem: &str) -> ChunkResult {
        let file_name = chunk.file_name(stem);
        debug!(
            chunk = chunk.index(),
            rows = chunk.len(),
            first_line = ?chunk.first_line(),
            "Delivering chunk"
        );
        let staged = match archive {
            Some(archive) => stage(archive, &chunk, &file_name).await,
            None => false,
        };

        let result = self
            .retry
            .execute(self.uploader.as_ref(), &chunk, self.sink.as_ref())
            .await;
        self.sink.on_chunk_result(&result);

        if let Some(archive) = archive.filter(|_| staged && result.is_delivered()) {
            if let Err(e) = archive.mark_delivered(&file_name).await {
                warn!(file = %file_name, error = %e, "Failed to move chunk file to uploaded");
            }
        }
        result
    }
}

/// Archive failures never fail the upload itself
async fn stage(archive: &ChunkArchive, chunk: &Chunk, file_name: &str) -> bool {
    let staged = match chunk.to_csv() {
        Ok(payload) => archive.stage(file_name, &payload).await,
        Err(e) => Err(e),
    };
    match staged {
        Ok(_) => true,
        Err(e) => {
            warn!(file = %file_name, error = %e, "Failed to write chunk file");
            false
        },
    }
}
