//! Credential storage and access-token refresh.
//!
//! Interactive authorization happens outside the mount; this module only
//! consumes the credential file the user placed in the working directory
//! (YAML or JSON, chosen by extension) and keeps its cached access token
//! fresh against the OAuth token endpoint. Refreshed tokens are written
//! back to the file so later mounts skip the round trip.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skymount_core::{
    config::{load_settings, store_settings},
    domain::BackendError,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Google's OAuth 2.0 token endpoint.
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Contents of `<workdir>/gdrive.yaml` (or `.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// Long-lived token obtained once through the provider's consent flow.
    pub refresh_token: String,
    /// Cached short-lived bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,
    /// Export MIME overrides for provider-native document types.
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub exports: std::collections::HashMap<String, String>,
}

impl Credentials {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        load_settings(path)
    }

    pub fn store(&self, path: &Path) -> anyhow::Result<()> {
        store_settings(path, self)
    }

    /// True while the cached access token is safe to use.
    pub fn token_valid(&self) -> bool {
        match (&self.access_token, &self.token_expiry) {
            (Some(_), Some(expiry)) => {
                Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < *expiry
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Serializes token refresh and hands out valid bearer tokens.
#[derive(Debug)]
pub struct TokenManager {
    http: reqwest::Client,
    token_endpoint: String,
    source: PathBuf,
    state: Mutex<Credentials>,
}

impl TokenManager {
    /// Load credentials from `source` and refresh against the production
    /// endpoint.
    pub fn new(source: PathBuf) -> anyhow::Result<Self> {
        Self::with_endpoint(source, TOKEN_ENDPOINT)
    }

    /// Endpoint override, used by tests.
    pub fn with_endpoint(source: PathBuf, token_endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let credentials = Credentials::load(&source)?;
        Ok(Self {
            http: reqwest::Client::new(),
            token_endpoint: token_endpoint.into(),
            source,
            state: Mutex::new(credentials),
        })
    }

    /// Snapshot of the loaded credentials (for non-token settings).
    pub async fn credentials(&self) -> Credentials {
        self.state.lock().await.clone()
    }

    /// A valid bearer token, refreshed on demand.
    pub async fn access_token(&self) -> Result<String, BackendError> {
        let mut creds = self.state.lock().await;
        if creds.token_valid() {
            return Ok(creds.access_token.clone().expect("validity implies token"));
        }

        debug!("refreshing Google Drive access token");
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                BackendError::Transient(format!("token endpoint returned {status}"))
            } else {
                BackendError::PermissionDenied(format!("token refresh failed ({status}): {body}"))
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        creds.access_token = Some(token.access_token.clone());
        creds.token_expiry = Some(Utc::now() + Duration::seconds(token.expires_in));
        if let Err(err) = creds.store(&self.source) {
            // Persistence is best effort; the in-memory token still works.
            warn!(error = %err, "could not persist refreshed token");
        }
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn write_credentials(dir: &Path, expiry: Option<DateTime<Utc>>, token: Option<&str>) -> PathBuf {
        let creds = Credentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh-1".to_string(),
            access_token: token.map(|t| t.to_string()),
            token_expiry: expiry,
            exports: Default::default(),
        };
        let path = dir.join("gdrive.yaml");
        creds.store(&path).unwrap();
        path
    }

    #[test]
    fn validity_requires_token_and_future_expiry() {
        let mut creds = Credentials {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            access_token: None,
            token_expiry: None,
            exports: Default::default(),
        };
        assert!(!creds.token_valid());

        creds.access_token = Some("t".to_string());
        assert!(!creds.token_valid());

        creds.token_expiry = Some(Utc::now() + Duration::hours(1));
        assert!(creds.token_valid());

        // Tokens inside the refresh margin count as expired.
        creds.token_expiry = Some(Utc::now() + Duration::seconds(5));
        assert!(!creds.token_valid());
    }

    #[tokio::test]
    async fn cached_token_skips_the_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(
            dir.path(),
            Some(Utc::now() + Duration::hours(1)),
            Some("cached-token"),
        );

        // No mock server at all: any HTTP call would fail the test.
        let manager = TokenManager::with_endpoint(path, "http://127.0.0.1:9/token").unwrap();
        assert_eq!(manager.access_token().await.unwrap(), "cached-token");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(dir.path(), None, None);
        let manager =
            TokenManager::with_endpoint(path.clone(), format!("{}/token", server.uri())).unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "fresh-token");

        // The refreshed token landed back in the credential file.
        let reloaded = Credentials::load(&path).unwrap();
        assert_eq!(reloaded.access_token.as_deref(), Some("fresh-token"));
        assert!(reloaded.token_valid());
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(dir.path(), None, None);
        let manager =
            TokenManager::with_endpoint(path, format!("{}/token", server.uri())).unwrap();

        let err = manager.access_token().await.unwrap_err();
        assert!(matches!(err, BackendError::PermissionDenied(_)));
    }
}
