//! The `Backend` adapter over the Drive client.
//!
//! Translates the engine's provider-neutral contract into Drive v3 calls:
//! a paged full listing with recursive parent resolution, the
//! start-page-token change feed, media upload/download with export
//! fallbacks for Google-native document types, and re-parenting moves.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use skymount_core::domain::{BackendError, Change, NodeKind, Quota, RemoteFile};
use skymount_core::ports::Backend;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, warn};

use crate::{
    auth::TokenManager,
    client::{DriveClient, DriveItem, FOLDER_MIME},
};

/// Alias Drive accepts for the drive's root folder in parent lists.
const ROOT_ALIAS: &str = "root";

/// Default export targets for Google-native document types.
fn default_exports() -> HashMap<String, String> {
    HashMap::from([
        (
            "application/vnd.google-apps.document".to_string(),
            "text/plain".to_string(),
        ),
        (
            "application/vnd.google-apps.spreadsheet".to_string(),
            "text/csv".to_string(),
        ),
    ])
}

/// Google Drive implementation of the backend contract.
#[derive(Debug)]
pub struct GdriveBackend {
    client: DriveClient,
    /// Provider-native MIME → export MIME.
    exports: HashMap<String, String>,
    /// Change-feed cursor; `None` until the first `changes` call.
    start_page_token: Mutex<Option<String>>,
}

impl GdriveBackend {
    /// Build from a credential file in the working directory. Export
    /// overrides in the file extend the defaults.
    pub fn from_source(source: &Path) -> anyhow::Result<Self> {
        let overrides = crate::auth::Credentials::load(source)?.exports;
        let tokens = TokenManager::new(source.to_path_buf())?;
        Ok(Self::new(DriveClient::new(tokens)).with_exports(overrides))
    }

    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            exports: default_exports(),
            start_page_token: Mutex::new(None),
        }
    }

    /// Merge user-supplied export mappings over the defaults.
    pub fn with_exports(mut self, overrides: HashMap<String, String>) -> Self {
        self.exports.extend(overrides);
        self
    }

    fn parent_query_id(parent: Option<&RemoteFile>) -> String {
        match parent {
            Some(p) => p.id.clone(),
            None => ROOT_ALIAS.to_string(),
        }
    }
}

/// Map a Drive item onto the provider-neutral record. The raw MIME type
/// rides along in `data` for later export decisions.
fn to_remote(item: DriveItem) -> RemoteFile {
    let is_dir = item.mime_type == FOLDER_MIME;
    let created = item.created_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let modified = item.modified_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    RemoteFile {
        id: item.id,
        name: item.name,
        parents: item.parents,
        size: item.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        created,
        modified,
        accessed: modified,
        kind: if is_dir {
            NodeKind::Directory
        } else {
            NodeKind::File
        },
        perm: if is_dir { 0o755 } else { 0o644 },
        data: serde_json::json!({ "mimeType": item.mime_type }),
    }
}

fn mime_of(file: &RemoteFile) -> Option<&str> {
    file.data.get("mimeType").and_then(|m| m.as_str())
}

#[async_trait]
impl Backend for GdriveBackend {
    async fn list_all(&self) -> Result<Vec<RemoteFile>, BackendError> {
        let mut by_id: HashMap<String, DriveItem> = HashMap::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.client.list_page(page_token.as_deref()).await?;
            for item in page.files {
                if item.trashed {
                    continue;
                }
                by_id.insert(item.id.clone(), item);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(files = by_id.len(), "drive listing complete");

        // Resolve parents the listing did not cover, walking upward until
        // every referenced ancestor is present.
        let mut missing: Vec<String> = by_id
            .values()
            .flat_map(|item| item.parents.clone())
            .filter(|p| !by_id.contains_key(p))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        while let Some(parent_id) = missing.pop() {
            if by_id.contains_key(&parent_id) {
                continue;
            }
            match self.client.get_item(&parent_id).await {
                Ok(item) => {
                    missing.extend(
                        item.parents
                            .iter()
                            .filter(|p| !by_id.contains_key(*p))
                            .cloned(),
                    );
                    by_id.insert(item.id.clone(), item);
                }
                Err(err) => {
                    // Shared items can reference parents this account
                    // cannot read; the child is kept, anchored nowhere.
                    warn!(id = %parent_id, error = %err, "could not resolve parent");
                }
            }
        }

        Ok(by_id.into_values().map(to_remote).collect())
    }

    async fn changes(&self) -> Result<Vec<Change>, BackendError> {
        let mut saved = self.start_page_token.lock().await;
        let mut token = match saved.clone() {
            Some(token) => token,
            None => {
                // First poll: establish the cursor and report nothing.
                let token = self.client.start_page_token().await?;
                *saved = Some(token.clone());
                token
            }
        };

        let mut out = Vec::new();
        loop {
            let page = self.client.changes_page(&token).await?;
            for change in page.changes {
                let Some(id) = change.file_id else {
                    continue;
                };
                let removed =
                    change.removed || change.file.as_ref().map(|f| f.trashed).unwrap_or(false);
                out.push(Change {
                    id,
                    file: if removed {
                        None
                    } else {
                        change.file.map(to_remote)
                    },
                    remove: removed,
                });
            }
            if let Some(new_token) = page.new_start_page_token {
                *saved = Some(new_token);
            }
            match page.next_page_token {
                Some(next) => token = next,
                None => break,
            }
        }
        Ok(out)
    }

    async fn create(
        &self,
        parent: Option<&RemoteFile>,
        name: &str,
        is_dir: bool,
    ) -> Result<RemoteFile, BackendError> {
        let mut body = serde_json::json!({
            "name": name,
            "parents": [Self::parent_query_id(parent)],
        });
        if is_dir {
            body["mimeType"] = serde_json::Value::String(FOLDER_MIME.to_string());
        }
        let created = self.client.create_item(&body).await?;
        Ok(to_remote(created))
    }

    async fn upload(
        &self,
        content: tokio::fs::File,
        file: &RemoteFile,
    ) -> Result<RemoteFile, BackendError> {
        let updated = self.client.upload_media(&file.id, content).await?;
        Ok(to_remote(updated))
    }

    async fn download_to(
        &self,
        mut dest: tokio::fs::File,
        file: &RemoteFile,
    ) -> Result<u64, BackendError> {
        let response = match mime_of(file).and_then(|m| self.exports.get(m)) {
            Some(export_mime) => {
                debug!(id = %file.id, mime = %export_mime, "exporting provider-native document");
                self.client.export(&file.id, export_mime).await?
            }
            None => self.client.download(&file.id).await?,
        };

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::Transient(e.to_string()))?;
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;
        Ok(written)
    }

    async fn rename(
        &self,
        file: &RemoteFile,
        new_parent: Option<&RemoteFile>,
        name: &str,
    ) -> Result<RemoteFile, BackendError> {
        let body = serde_json::json!({ "name": name });
        let (add_parents, remove_parents) = if file.has_parent(new_parent) {
            (None, None)
        } else {
            // Detach from every current parent; Drive treats the list as
            // comma separated.
            (
                Some(Self::parent_query_id(new_parent)),
                Some(file.parents.join(",")),
            )
        };
        let updated = self
            .client
            .update_item(
                &file.id,
                &body,
                add_parents.as_deref(),
                remove_parents.as_deref().filter(|s| !s.is_empty()),
            )
            .await?;
        Ok(to_remote(updated))
    }

    async fn delete(&self, file: &RemoteFile) -> Result<(), BackendError> {
        // Drive removes folders recursively; the filesystem contract wants
        // populated directories refused instead.
        if file.is_dir() && self.client.has_children(&file.id).await? {
            return Err(BackendError::NotEmpty(file.name.clone()));
        }
        self.client.delete_item(&file.id).await
    }

    async fn quota(&self) -> Result<Quota, BackendError> {
        self.client.quota().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, mime: &str, size: Option<&str>) -> DriveItem {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "mimeType": mime,
            "size": size,
            "parents": ["parent-1"],
            "createdTime": "2024-01-01T00:00:00Z",
            "modifiedTime": "2024-02-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn folders_map_to_directories() {
        let remote = to_remote(item("d1", "docs", FOLDER_MIME, None));
        assert!(remote.is_dir());
        assert_eq!(remote.perm, 0o755);
        assert_eq!(remote.size, 0);
    }

    #[test]
    fn files_keep_size_and_mime() {
        let remote = to_remote(item("f1", "a.pdf", "application/pdf", Some("2048")));
        assert!(!remote.is_dir());
        assert_eq!(remote.size, 2048);
        assert_eq!(mime_of(&remote), Some("application/pdf"));
        assert_eq!(remote.accessed, remote.modified);
    }

    #[test]
    fn export_defaults_cover_docs_and_sheets() {
        let exports = default_exports();
        assert_eq!(
            exports.get("application/vnd.google-apps.document").unwrap(),
            "text/plain"
        );
        assert_eq!(
            exports
                .get("application/vnd.google-apps.spreadsheet")
                .unwrap(),
            "text/csv"
        );
    }
}
