//! Single-attempt chunk upload and response classification
//!
//! An uploader performs exactly one HTTP request per call and classifies the
//! result; it never retries. See [`crate::retry`] for that.

use crate::auth::AuthContext;
use crate::chunker::Chunk;
use crate::config::{UploadConfig, UploadTarget};
use crate::endpoints;
use async_trait::async_trait;
use csvup_common::{Result, UploadFailure, UploadOutcome};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::error::Error as StdError;
use tracing::debug;

/// Longest response body excerpt kept in a failure message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Uploads one chunk, once
#[async_trait]
pub trait ChunkUploader: Send + Sync {
    async fn upload(&self, chunk: &Chunk) -> UploadOutcome;
}

/// Build the HTTP client used for token exchange and uploads
///
/// The request timeout bounds every single attempt.
pub fn build_client(config: &UploadConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.request_timeout())
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .user_agent(concat!("csvup/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Classify an HTTP response status
///
/// 2xx is success, 429 and 5xx are transient, anything else is fatal.
pub fn classify_status(status: StatusCode, body: &str) -> UploadOutcome {
    if status.is_success() {
        return UploadOutcome::Success {
            http_status: status.as_u16(),
        };
    }

    let failure = UploadFailure::new(Some(status.as_u16()), excerpt(body, status));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        UploadOutcome::Retryable(failure)
    } else {
        UploadOutcome::Fatal(failure)
    }
}

/// Classify a request that produced no response
///
/// Connection resets, timeouts and DNS failures are transient. A request that
/// could not even be built, or a redirect loop, will fail the same way again.
pub fn classify_transport(error: &reqwest::Error) -> UploadOutcome {
    let failure = UploadFailure::new(error.status().map(|s| s.as_u16()), error_chain(error));
    if error.is_builder() || error.is_redirect() {
        UploadOutcome::Fatal(failure)
    } else {
        UploadOutcome::Retryable(failure)
    }
}

fn excerpt(body: &str, status: StatusCode) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Uploads chunks as `multipart/form-data` files to the connector endpoint
pub struct HttpUploader {
    client: Client,
    url: String,
    auth: AuthContext,
    source_stem: String,
}

impl HttpUploader {
    pub fn new(client: Client, target: &UploadTarget, auth: AuthContext, source_stem: impl Into<String>) -> Self {
        Self {
            client,
            url: endpoints::upload_url(target),
            auth,
            source_stem: source_stem.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, file_name: String, payload: Vec<u8>) -> UploadOutcome {
        let part = match Part::bytes(payload).file_name(file_name).mime_str("text/csv") {
            Ok(part) => part,
            Err(e) => return classify_transport(&e),
        };
        let form = Form::new().part("file", part);
        let request = self.auth.apply(self.client.post(&self.url)).multipart(form);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let body = if status.is_success() {
                    String::new()
                } else {
                    response.text().await.unwrap_or_default()
                };
                classify_status(status, &body)
            },
            Err(e) => classify_transport(&e),
        }
    }
}

#[async_trait]
impl ChunkUploader for HttpUploader {
    async fn upload(&self, chunk: &Chunk) -> UploadOutcome {
        let payload = match chunk.to_csv() {
            Ok(payload) => payload,
            Err(e) => {
                return UploadOutcome::Fatal(UploadFailure::new(
                    None,
                    format!("chunk could not be serialized: {}", e),
                ))
            },
        };

        let file_name = chunk.file_name(&self.source_stem);
        debug!(
            chunk = chunk.index(),
            rows = chunk.len(),
            bytes = payload.len(),
            file = %file_name,
            "Sending chunk"
        );
        self.send(file_name, payload).await
    }
}
