//! Credential resolution and the per-request authentication context
//!
//! Credentials are resolved once, before any upload. The resulting
//! [`AuthContext`] is an immutable header value attached to every request, so
//! it can be shared freely between concurrent uploads.

use crate::config::{AuthMode, UploadConfig, UploadTarget};
use crate::endpoints;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use csvup_common::{CsvupError, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// A string that never appears in `Debug` output
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Resolve one credential value
///
/// An explicit non-empty value wins; otherwise the environment variable named
/// by `env_var` is consulted through `lookup`. Empty values count as absent.
pub fn resolve_credential<F>(explicit: Option<&str>, env_var: Option<&str>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit.filter(|v| !v.is_empty()) {
        return Some(value.to_string());
    }

    env_var
        .filter(|name| !name.is_empty())
        .and_then(|name| lookup(name))
        .filter(|v| !v.is_empty())
}

/// Username and password for the upload target
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Secret,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Resolve from explicit config values, falling back to named environment variables
    pub fn resolve(config: &UploadConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(config: &UploadConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = resolve_credential(
            config.username.as_deref(),
            config.env_username_property.as_deref(),
            &lookup,
        )
        .ok_or_else(|| missing("username", config.env_username_property.as_deref()))?;

        let password = resolve_credential(
            config.password.as_ref().map(Secret::expose),
            config.env_password_property.as_deref(),
            &lookup,
        )
        .ok_or_else(|| missing("password", config.env_password_property.as_deref()))?;

        Ok(Self::new(username, password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Secret {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

fn missing(what: &str, env_var: Option<&str>) -> CsvupError {
    match env_var {
        Some(name) => CsvupError::missing_credentials(format!(
            "no {} given and environment variable '{}' is unset or empty",
            what, name
        )),
        None => CsvupError::missing_credentials(format!("no {} given", what)),
    }
}

/// Authorization material attached to every upload request
#[derive(Clone)]
pub struct AuthContext {
    mode: AuthMode,
    authorization: HeaderValue,
}

impl AuthContext {
    /// `Authorization: Basic base64(username:password)`
    pub fn basic(credentials: &Credentials) -> Result<Self> {
        let encoded = STANDARD.encode(format!(
            "{}:{}",
            credentials.username,
            credentials.password.expose()
        ));
        Self::from_header(AuthMode::Basic, format!("Basic {}", encoded))
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer(token: &str) -> Result<Self> {
        Self::from_header(AuthMode::Token, format!("Bearer {}", token))
    }

    fn from_header(mode: AuthMode, value: String) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(&value).map_err(|_| {
            CsvupError::Authentication("credentials contain characters not allowed in a header".to_string())
        })?;
        authorization.set_sensitive(true);
        Ok(Self {
            mode,
            authorization,
        })
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Attach the authorization header to a request
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.authorization.clone())
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("mode", &self.mode)
            .field("authorization", &"***")
            .finish()
    }
}

/// Produces the [`AuthContext`] for a run
#[derive(Debug)]
pub struct AuthSession {
    credentials: Credentials,
    mode: AuthMode,
}

impl AuthSession {
    pub fn new(credentials: Credentials, mode: AuthMode) -> Self {
        Self { credentials, mode }
    }

    /// Build the context for `target`
    ///
    /// Basic mode is purely local. Token mode exchanges the credentials once
    /// at `{baseUrl}/auth`; the token is then reused for the whole run.
    pub async fn context(&self, client: &Client, target: &UploadTarget) -> Result<AuthContext> {
        match self.mode {
            AuthMode::Basic => AuthContext::basic(&self.credentials),
            AuthMode::Token => {
                let token = self.exchange_token(client, target).await?;
                AuthContext::bearer(&token)
            },
        }
    }

    async fn exchange_token(&self, client: &Client, target: &UploadTarget) -> Result<String> {
        let url = endpoints::token_url(&target.base_url);
        let form = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.expose()),
            ("token", "true"),
        ];

        let response = client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CsvupError::Authentication(format!("token request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, %url, "Token exchange rejected");
            return Err(CsvupError::Authentication(format!(
                "token endpoint {} returned {}",
                url, status
            )));
        }

        let token = response
            .text()
            .await
            .map_err(|e| CsvupError::Authentication(format!("unreadable token response: {}", e)))?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(CsvupError::Authentication(
                "token endpoint returned an empty body".to_string(),
            ));
        }

        info!(username = %self.credentials.username, "Token generated");
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_explicit_value_wins_over_env() {
        let lookup = env(&[("SCAN_USER", "from-env")]);
        assert_eq!(
            resolve_credential(Some("explicit"), Some("SCAN_USER"), &lookup).as_deref(),
            Some("explicit")
        );
    }

    #[test]
    fn test_env_fallback_when_explicit_missing_or_empty() {
        let lookup = env(&[("SCAN_USER", "from-env")]);
        assert_eq!(
            resolve_credential(None, Some("SCAN_USER"), &lookup).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            resolve_credential(Some(""), Some("SCAN_USER"), &lookup).as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn test_nothing_resolves() {
        let lookup = env(&[("EMPTY", "")]);
        assert!(resolve_credential(None, Some("EMPTY"), &lookup).is_none());
        assert!(resolve_credential(None, Some("UNSET"), &lookup).is_none());
        assert!(resolve_credential(None, None, &lookup).is_none());
    }

    #[test]
    fn test_credentials_missing_password_names_variable() {
        let config = UploadConfig {
            username: Some("svc".to_string()),
            env_password_property: Some("SCAN_PASS".to_string()),
            ..UploadConfig::default()
        };

        match Credentials::resolve_with(&config, env(&[])) {
            Err(CsvupError::MissingCredentials(msg)) => assert!(msg.contains("SCAN_PASS")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_credentials_from_env() {
        let config = UploadConfig {
            env_username_property: Some("SCAN_USER".to_string()),
            env_password_property: Some("SCAN_PASS".to_string()),
            ..UploadConfig::default()
        };

        let creds =
            Credentials::resolve_with(&config, env(&[("SCAN_USER", "svc"), ("SCAN_PASS", "pw")]))
                .unwrap();
        assert_eq!(creds.username(), "svc");
        assert_eq!(creds.password().expose(), "pw");
    }

    #[test]
    fn test_basic_context_header() {
        let context = AuthContext::basic(&Credentials::new("user", "pass")).unwrap();
        let request = context
            .apply(Client::new().post("http://localhost/upload"))
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Basic dXNlcjpwYXNz"
        );
        assert_eq!(context.mode(), AuthMode::Basic);
    }

    #[test]
    fn test_debug_never_shows_secrets() {
        let creds = Credentials::new("user", "s3cr3t");
        let context = AuthContext::basic(&creds).unwrap();

        assert!(!format!("{:?}", creds).contains("s3cr3t"));
        assert!(!format!("{:?}", context).contains("dXNlcjpzM2NyM3Q"));
    }

    #[test]
    fn test_bearer_rejects_header_breaking_token() {
        assert!(AuthContext::bearer("abc\ndef").is_err());
        assert!(AuthContext::bearer("abc.def.ghi").is_ok());
    }
}
