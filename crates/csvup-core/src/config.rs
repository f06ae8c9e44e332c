//! Upload configuration
//!
//! Mirrors the keys of the `config.json` the CLI accepts (camelCase), so a
//! config file deserializes straight into [`UploadConfig`]. Every value the
//! pipeline needs is validated here, before the source file is opened.

use crate::auth::Secret;
use csvup_common::{CsvupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

// ============================================================================
// Defaults
// ============================================================================

/// Header row position when none is configured
pub const DEFAULT_HEADER_LINE: i64 = 1;

/// Rows per chunk when none is configured
pub const DEFAULT_CHUNK_SIZE: i64 = 10_000;

/// Attempts per chunk, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First retry waits this long; later retries double it
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 10_000;

/// Per-request network timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// How outbound requests are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `Authorization: Basic` built locally, no network call
    #[default]
    Basic,
    /// Bearer token obtained once from `{baseUrl}/auth` before uploading
    Token,
}

impl std::str::FromStr for AuthMode {
    type Err = CsvupError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(AuthMode::Basic),
            "token" | "jwt" | "bearer" => Ok(AuthMode::Token),
            _ => Err(CsvupError::invalid_config(format!(
                "unknown auth mode '{}' (expected 'basic' or 'token')",
                s
            ))),
        }
    }
}

/// Where chunks are delivered, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub base_url: Url,
    pub connection_uuid: Uuid,
    pub profile_uuid: Uuid,
}

/// Full configuration surface of an upload run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Source CSV file
    #[serde(default)]
    pub csv_path: Option<PathBuf>,

    /// 1-based header row position; earlier rows are skipped
    #[serde(default = "default_header")]
    pub header: i64,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<Secret>,

    /// Name of the environment variable holding the username
    #[serde(default, alias = "envQualysUsernameProperty")]
    pub env_username_property: Option<String>,

    /// Name of the environment variable holding the password
    #[serde(default, alias = "envQualysPasswordProperty")]
    pub env_password_property: Option<String>,

    #[serde(default)]
    pub connection_uuid: Option<String>,

    #[serde(default)]
    pub profile_uuid: Option<String>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,

    /// Also close a chunk before its serialized rows exceed this many bytes
    #[serde(default)]
    pub max_chunk_bytes: Option<u64>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff wait
    #[serde(default)]
    pub backoff_max_ms: Option<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Chunks uploaded at once; 1 keeps the run strictly sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Stop reading new chunks after the first chunk fails
    #[serde(default)]
    pub stop_on_first_failure: bool,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Keep a copy of every chunk file, moved to `uploaded/` once delivered
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Parse the whole source before uploading anything
    #[serde(default = "default_true")]
    pub preflight_scan: bool,

    /// Skip TLS certificate verification (self-signed appliances)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_header() -> i64 {
    DEFAULT_HEADER_LINE
}

fn default_chunk_size() -> i64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            header: DEFAULT_HEADER_LINE,
            base_url: None,
            username: None,
            password: None,
            env_username_property: None,
            env_password_property: None,
            connection_uuid: None,
            profile_uuid: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_bytes: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            concurrency: 1,
            stop_on_first_failure: false,
            auth_mode: AuthMode::Basic,
            archive_dir: None,
            preflight_scan: true,
            accept_invalid_certs: false,
        }
    }
}

impl UploadConfig {
    /// Load a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            CsvupError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Check every pre-flight constraint
    ///
    /// Does not touch the source file or the network.
    pub fn validate(&self) -> Result<()> {
        self.source_path()?;
        self.header_line()?;
        self.target()?;

        if self.chunk_size <= 0 {
            return Err(CsvupError::invalid_config(format!(
                "chunkSize must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.max_chunk_bytes == Some(0) {
            return Err(CsvupError::invalid_config("maxChunkBytes must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(CsvupError::invalid_config("maxAttempts must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(CsvupError::invalid_config("concurrency must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(CsvupError::invalid_config("requestTimeoutSecs must be positive"));
        }

        Ok(())
    }

    pub fn source_path(&self) -> Result<&Path> {
        self.csv_path
            .as_deref()
            .ok_or_else(|| CsvupError::invalid_config("csvPath is required"))
    }

    /// Header position as a 1-based line number
    pub fn header_line(&self) -> Result<usize> {
        usize::try_from(self.header)
            .ok()
            .filter(|line| *line >= 1)
            .ok_or_else(|| {
                CsvupError::invalid_config(format!(
                    "header must be a 1-based line number, got {}",
                    self.header
                ))
            })
    }

    /// Parse and check the delivery target
    pub fn target(&self) -> Result<UploadTarget> {
        let raw_url = required(&self.base_url, "baseUrl")?;
        let base_url = Url::parse(raw_url)
            .map_err(|e| CsvupError::invalid_config(format!("baseUrl '{}': {}", raw_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CsvupError::invalid_config(format!(
                "baseUrl must be http or https, got '{}'",
                base_url.scheme()
            )));
        }

        Ok(UploadTarget {
            base_url,
            connection_uuid: parse_uuid(&self.connection_uuid, "connectionUuid")?,
            profile_uuid: parse_uuid(&self.profile_uuid, "profileUuid")?,
        })
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Option<Duration> {
        self.backoff_max_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CsvupError::invalid_config(format!("{} is required", name)))
}

fn parse_uuid(value: &Option<String>, name: &str) -> Result<Uuid> {
    let raw = required(value, name)?;
    Uuid::parse_str(raw)
        .map_err(|e| CsvupError::invalid_config(format!("{} '{}' is not a UUID: {}", name, raw, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const CONNECTION: &str = "0b6f5a4e-0b4e-4f8e-9a51-8f0a8c3a2e11";
    const PROFILE: &str = "5c1f9d22-7a3b-4e0c-8d7e-2f6b1a9c4d55";

    fn valid() -> UploadConfig {
        UploadConfig {
            csv_path: Some(PathBuf::from("assets.csv")),
            base_url: Some("https://gateway.example.com".to_string()),
            connection_uuid: Some(CONNECTION.to_string()),
            profile_uuid: Some(PROFILE.to_string()),
            ..UploadConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = valid();
        config.validate().unwrap();

        let target = config.target().unwrap();
        assert_eq!(target.connection_uuid.to_string(), CONNECTION);
        assert_eq!(config.header_line().unwrap(), 1);
    }

    #[test]
    fn test_non_positive_chunk_size_rejected() {
        for size in [0, -5] {
            let config = UploadConfig {
                chunk_size: size,
                ..valid()
            };
            assert!(matches!(
                config.validate(),
                Err(CsvupError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_header_zero_rejected() {
        let config = UploadConfig {
            header: 0,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(CsvupError::InvalidConfiguration(msg)) if msg.contains("header")
        ));
    }

    #[test]
    fn test_missing_target_fields_rejected() {
        let config = UploadConfig {
            profile_uuid: None,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(CsvupError::InvalidConfiguration(msg)) if msg.contains("profileUuid")
        ));

        let config = UploadConfig {
            connection_uuid: Some("not-a-uuid".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            base_url: Some("ftp://gateway.example.com".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_config_json_keys() {
        let json = format!(
            r#"{{
                "csvPath": "/data/assets.csv",
                "header": 3,
                "baseUrl": "https://gateway.example.com",
                "username": "svc",
                "password": "hunter2",
                "envQualysUsernameProperty": "QUALYS_USER",
                "envQualysPasswordProperty": "QUALYS_PASS",
                "connectionUuid": "{}",
                "profileUuid": "{}"
            }}"#,
            CONNECTION, PROFILE
        );

        let config: UploadConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.header, 3);
        assert_eq!(config.env_username_property.as_deref(), Some("QUALYS_USER"));
        assert_eq!(config.env_password_property.as_deref(), Some("QUALYS_PASS"));
        assert_eq!(config.password.as_ref().map(Secret::expose), Some("hunter2"));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(config.preflight_scan);
        config.validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = UploadConfig {
            password: Some(Secret::from("hunter2")),
            ..valid()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_auth_mode_from_str() {
        assert_eq!("basic".parse::<AuthMode>().unwrap(), AuthMode::Basic);
        assert_eq!("JWT".parse::<AuthMode>().unwrap(), AuthMode::Token);
        assert!("kerberos".parse::<AuthMode>().is_err());
    }
}
