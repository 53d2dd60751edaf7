//! Typed HTTP client for the Drive v3 API.
//!
//! Wraps `reqwest::Client` with bearer authentication, the field
//! projections every call shares, and the HTTP-status → [`BackendError`]
//! classification. The base URL is overridable so tests can point the
//! client at a mock server.

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use skymount_core::domain::{BackendError, Quota};
use tokio_util::io::ReaderStream;

use crate::auth::TokenManager;

/// Production API host; file paths are appended verbatim.
const API_BASE_URL: &str = "https://www.googleapis.com";

/// Field projection requested on every file-returning call.
pub const FILE_FIELDS: &str = "id,name,size,mimeType,parents,createdTime,modifiedTime,trashed";

/// MIME type marking Drive folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

// ============================================================================
// Drive v3 response types
// ============================================================================

/// One file resource, as Drive serializes it.
///
/// Numeric fields arrive string-encoded; timestamps are RFC 3339.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trashed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveChange {
    pub file_id: Option<String>,
    #[serde(default)]
    pub removed: bool,
    pub file: Option<DriveItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeList {
    #[serde(default)]
    pub changes: Vec<DriveChange>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPageToken {
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    storage_quota: Option<StorageQuota>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageQuota {
    limit: Option<String>,
    usage: Option<String>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// Authenticated Drive v3 client.
#[derive(Debug)]
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl DriveClient {
    pub fn new(tokens: TokenManager) -> Self {
        Self::with_base_url(tokens, API_BASE_URL)
    }

    /// Base-URL override, used by tests.
    pub fn with_base_url(tokens: TokenManager, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        check_status(response).await
    }

    /// One page of the full listing.
    pub async fn list_page(&self, page_token: Option<&str>) -> Result<FileList, BackendError> {
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let mut builder = self.request(Method::GET, "/drive/v3/files").await?.query(&[
            ("pageSize", "1000"),
            ("orderBy", "createdTime"),
            ("fields", fields.as_str()),
        ]);
        if let Some(token) = page_token {
            builder = builder.query(&[("pageToken", token)]);
        }
        parse_json(self.send(builder).await?).await
    }

    /// Fetch a single item by id (parent resolution).
    pub async fn get_item(&self, id: &str) -> Result<DriveItem, BackendError> {
        let builder = self
            .request(Method::GET, &format!("/drive/v3/files/{id}"))
            .await?
            .query(&[("fields", FILE_FIELDS)]);
        parse_json(self.send(builder).await?).await
    }

    /// Create a file or folder from a metadata body.
    pub async fn create_item(
        &self,
        body: &serde_json::Value,
    ) -> Result<DriveItem, BackendError> {
        let builder = self
            .request(Method::POST, "/drive/v3/files")
            .await?
            .query(&[("fields", FILE_FIELDS)])
            .json(body);
        parse_json(self.send(builder).await?).await
    }

    /// Patch item metadata, optionally re-parenting.
    pub async fn update_item(
        &self,
        id: &str,
        body: &serde_json::Value,
        add_parents: Option<&str>,
        remove_parents: Option<&str>,
    ) -> Result<DriveItem, BackendError> {
        let mut builder = self
            .request(Method::PATCH, &format!("/drive/v3/files/{id}"))
            .await?
            .query(&[("fields", FILE_FIELDS)]);
        if let Some(parents) = add_parents {
            builder = builder.query(&[("addParents", parents)]);
        }
        if let Some(parents) = remove_parents {
            builder = builder.query(&[("removeParents", parents)]);
        }
        parse_json(self.send(builder.json(body)).await?).await
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), BackendError> {
        let builder = self
            .request(Method::DELETE, &format!("/drive/v3/files/{id}"))
            .await?;
        self.send(builder).await?;
        Ok(())
    }

    /// Overwrite an item's content, streaming from `content`.
    pub async fn upload_media(
        &self,
        id: &str,
        content: tokio::fs::File,
    ) -> Result<DriveItem, BackendError> {
        let stream = ReaderStream::new(content);
        let builder = self
            .request(Method::PATCH, &format!("/upload/drive/v3/files/{id}"))
            .await?
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .body(reqwest::Body::wrap_stream(stream));
        parse_json(self.send(builder).await?).await
    }

    /// Raw content download (`alt=media`).
    pub async fn download(&self, id: &str) -> Result<Response, BackendError> {
        let builder = self
            .request(Method::GET, &format!("/drive/v3/files/{id}"))
            .await?
            .query(&[("alt", "media")]);
        self.send(builder).await
    }

    /// Export a provider-native document to `mime_type`.
    pub async fn export(&self, id: &str, mime_type: &str) -> Result<Response, BackendError> {
        let builder = self
            .request(Method::GET, &format!("/drive/v3/files/{id}/export"))
            .await?
            .query(&[("mimeType", mime_type)]);
        self.send(builder).await
    }

    /// Handshake for the change feed.
    pub async fn start_page_token(&self) -> Result<String, BackendError> {
        let builder = self
            .request(Method::GET, "/drive/v3/changes/startPageToken")
            .await?;
        let token: StartPageToken = parse_json(self.send(builder).await?).await?;
        Ok(token.start_page_token)
    }

    /// One page of the change feed.
    pub async fn changes_page(&self, page_token: &str) -> Result<ChangeList, BackendError> {
        let fields =
            format!("newStartPageToken,nextPageToken,changes(fileId,removed,file({FILE_FIELDS}))");
        let builder = self.request(Method::GET, "/drive/v3/changes").await?.query(&[
            ("pageToken", page_token),
            ("fields", fields.as_str()),
        ]);
        parse_json(self.send(builder).await?).await
    }

    /// True if `id` has at least one live child.
    pub async fn has_children(&self, id: &str) -> Result<bool, BackendError> {
        let query = format!("'{id}' in parents and trashed=false");
        let builder = self.request(Method::GET, "/drive/v3/files").await?.query(&[
            ("q", query.as_str()),
            ("pageSize", "1"),
            ("fields", "files(id)"),
        ]);
        let list: FileList = parse_json(self.send(builder).await?).await?;
        Ok(!list.files.is_empty())
    }

    /// Storage quota from the about endpoint.
    pub async fn quota(&self) -> Result<Quota, BackendError> {
        let builder = self
            .request(Method::GET, "/drive/v3/about")
            .await?
            .query(&[("fields", "storageQuota")]);
        let about: About = parse_json(self.send(builder).await?).await?;
        let quota = about.storage_quota.unwrap_or(StorageQuota {
            limit: None,
            usage: None,
        });
        Ok(Quota {
            total_bytes: parse_size(quota.limit.as_deref()),
            used_bytes: parse_size(quota.usage.as_deref()),
        })
    }
}

/// Classify a non-success status into a backend error kind.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::PermissionDenied(body),
        StatusCode::TOO_MANY_REQUESTS => BackendError::Transient(format!("rate limited: {body}")),
        StatusCode::BAD_REQUEST => BackendError::InvalidArgument(body),
        s if s.is_server_error() => BackendError::Transient(format!("{s}: {body}")),
        s => BackendError::Other(anyhow::anyhow!("unexpected status {s}: {body}")),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::Other(anyhow::anyhow!("malformed provider response: {e}")))
}

/// Drive serializes byte counts as decimal strings.
fn parse_size(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_item_deserializes_the_wire_shape() {
        let raw = serde_json::json!({
            "id": "abc123",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "size": "2048",
            "parents": ["root-folder"],
            "createdTime": "2024-03-01T10:00:00Z",
            "modifiedTime": "2024-03-02T11:30:00Z"
        });
        let item: DriveItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.id, "abc123");
        assert_eq!(item.size.as_deref(), Some("2048"));
        assert_eq!(item.parents, vec!["root-folder".to_string()]);
        assert!(!item.trashed);
        assert_eq!(
            item.modified_time.unwrap().to_rfc3339(),
            "2024-03-02T11:30:00+00:00"
        );
    }

    #[test]
    fn missing_optional_fields_default() {
        let item: DriveItem = serde_json::from_value(serde_json::json!({"id": "x"})).unwrap();
        assert!(item.name.is_empty());
        assert!(item.size.is_none());
        assert!(item.parents.is_empty());
        assert!(item.created_time.is_none());
    }

    #[test]
    fn sizes_parse_from_strings() {
        assert_eq!(parse_size(Some("1024")), 1024);
        assert_eq!(parse_size(Some("not-a-number")), 0);
        assert_eq!(parse_size(None), 0);
    }
}
