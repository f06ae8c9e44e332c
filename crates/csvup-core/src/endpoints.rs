//! Endpoint URL builders
//!
//! Helper functions to construct the target API's URLs from the base URL.

use crate::config::UploadTarget;
use url::Url;

/// Path of the token exchange endpoint
pub const TOKEN_PATH: &str = "/auth";

fn trimmed(base_url: &Url) -> &str {
    base_url.as_str().trim_end_matches('/')
}

/// Build the token exchange URL
pub fn token_url(base_url: &Url) -> String {
    format!("{}{}", trimmed(base_url), TOKEN_PATH)
}

/// Build the chunk upload URL for a connection/profile pair
pub fn upload_url(target: &UploadTarget) -> String {
    format!(
        "{}/connector-config/connector/integration/{}/{}/file-upload",
        trimmed(&target.base_url),
        target.connection_uuid,
        target.profile_uuid
    )
}
