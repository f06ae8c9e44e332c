//! csvup CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line interface for uploading a CSV file to a connector endpoint in
//! chunks.
//!
//! # Overview
//!
//! - **Configuration**: a JSON config file (`--config`, or `./config.json` when
//!   present) merged with command-line flags, flags winning
//! - **Upload**: runs the pipeline with a progress bar and Ctrl-C cancellation
//! - **Summary**: one line per chunk, or the whole result as JSON (`--json`)

pub mod error;
pub mod progress;
pub mod summary;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::Parser;
use csvup_common::logging::{init_logging, LogConfig, LogGuard, LogLevel, LogOutput};
use csvup_common::{CsvupError, RunResult};
use csvup_core::{AuthMode, EventSink, FanoutSink, TracingSink, UploadConfig};
use progress::ProgressSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// csvup - upload a CSV file in chunks with retry
#[derive(Parser, Debug)]
#[command(name = "csvup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source CSV file (overrides csvPath from the config file)
    pub csv_path: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, env = "CSVUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// 1-based line number of the header row
    #[arg(long, allow_negative_numbers = true)]
    pub header: Option<i64>,

    /// Base URL of the connector API
    #[arg(long, env = "CSVUP_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long, env = "CSVUP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Environment variable holding the username
    #[arg(long)]
    pub env_username_property: Option<String>,

    /// Environment variable holding the password
    #[arg(long)]
    pub env_password_property: Option<String>,

    #[arg(long)]
    pub connection_uuid: Option<String>,

    #[arg(long)]
    pub profile_uuid: Option<String>,

    /// Rows per chunk
    #[arg(long, allow_negative_numbers = true)]
    pub chunk_size: Option<i64>,

    /// Also close a chunk before it grows past this many bytes
    #[arg(long)]
    pub max_chunk_bytes: Option<u64>,

    /// Attempts per chunk, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// First retry wait in milliseconds, doubled on every further retry
    #[arg(long)]
    pub backoff_base_ms: Option<u64>,

    /// Longest single retry wait in milliseconds
    #[arg(long)]
    pub backoff_max_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Chunks uploaded at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop after the first chunk that fails
    #[arg(long)]
    pub stop_on_first_failure: bool,

    /// basic or token
    #[arg(long)]
    pub auth_mode: Option<AuthMode>,

    /// Keep a copy of every chunk file under this directory
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Skip the validation pass over the whole file before uploading
    #[arg(long)]
    pub no_preflight: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory for log files
    #[arg(long, default_value = "./logs")]
    pub log_dir: PathBuf,
}

impl Cli {
    /// Config file to load: `--config`, else `./config.json` if it exists
    pub fn config_file(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        })
    }

    /// Build the effective configuration
    pub fn load_config(&self) -> Result<UploadConfig> {
        let base = match self.config_file() {
            Some(path) => read_config_file(&path)?,
            None => UploadConfig::default(),
        };
        Ok(self.apply_overrides(base))
    }

    /// Apply every flag that was given on top of `config`
    pub fn apply_overrides(&self, mut config: UploadConfig) -> UploadConfig {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set_opt(&mut config.csv_path, &self.csv_path);
        set(&mut config.header, &self.header);
        set_opt(&mut config.base_url, &self.base_url);
        set_opt(&mut config.username, &self.username);
        if let Some(password) = &self.password {
            config.password = Some(password.as_str().into());
        }
        set_opt(&mut config.env_username_property, &self.env_username_property);
        set_opt(&mut config.env_password_property, &self.env_password_property);
        set_opt(&mut config.connection_uuid, &self.connection_uuid);
        set_opt(&mut config.profile_uuid, &self.profile_uuid);
        set(&mut config.chunk_size, &self.chunk_size);
        set_opt(&mut config.max_chunk_bytes, &self.max_chunk_bytes);
        set(&mut config.max_attempts, &self.max_attempts);
        set(&mut config.backoff_base_ms, &self.backoff_base_ms);
        set_opt(&mut config.backoff_max_ms, &self.backoff_max_ms);
        set(&mut config.request_timeout_secs, &self.request_timeout_secs);
        set(&mut config.concurrency, &self.concurrency);
        set(&mut config.auth_mode, &self.auth_mode);
        set_opt(&mut config.archive_dir, &self.archive_dir);

        config.stop_on_first_failure |= self.stop_on_first_failure;
        config.accept_invalid_certs |= self.insecure;
        if self.no_preflight {
            config.preflight_scan = false;
        }
        config
    }

    /// Logging setup for this invocation, with `LOG_*` environment overrides applied
    ///
    /// JSON summaries own stdout, so console logging is turned off for them.
    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::builder()
            .level(if self.verbose {
                LogLevel::Debug
            } else {
                LogLevel::Info
            })
            .output(if self.json {
                LogOutput::File
            } else {
                LogOutput::Both
            })
            .log_dir(self.log_dir.clone())
            .log_file_prefix("csvup")
            .build();

        config.clone().merge_env().unwrap_or(config)
    }

    /// Install the global subscriber described by [`Cli::log_config`]
    pub fn init_logging(&self) -> Result<LogGuard> {
        Ok(init_logging(&self.log_config())?)
    }

    fn show_progress(&self) -> bool {
        !(self.json || self.no_progress)
    }
}

fn read_config_file(path: &Path) -> Result<UploadConfig> {
    debug!(path = %path.display(), "Loading config file");
    UploadConfig::from_json_file(path).map_err(|e| match e {
        CsvupError::SourceUnavailable { source, .. } => CliError::config_file(path, source),
        other => CliError::config_file(path, other),
    })
}

/// Run an upload as described by `cli`
///
/// Returns the result of a fully delivered run. Failed, partial and cancelled
/// runs come back as [`CliError::Upload`] carrying their partial result.
pub async fn execute(cli: &Cli, cancel: &CancellationToken) -> Result<RunResult> {
    let config = cli.load_config()?;
    config.validate()?;

    let progress = Arc::new(if !cli.show_progress() {
        ProgressSink::hidden()
    } else if config.preflight_scan {
        ProgressSink::new(progress::create_progress_bar(0, "Uploading"))
    } else {
        ProgressSink::new(progress::create_spinner("Uploading"))
    });
    let sink: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(progress.clone()),
    );

    if let Ok(source) = config.source_path() {
        info!(source = %source.display(), chunk_size = config.chunk_size, "Starting upload");
    }
    let result = csvup_core::upload_csv_with(&config, sink, cancel).await;
    progress.finish();

    Ok(result?)
}
