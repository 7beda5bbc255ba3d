use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use mediaferry_transfer::{ChildEntry, DestinationStore, TransferError, UploadHandle};

use crate::auth::{self, GraphCredentials};

pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Characters left unescaped inside a drive path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'~');

// ---

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("site has no document libraries")]
    NoDrive,
}

/// Graph client bound to one document library.
///
/// [`connect`] authenticates and resolves the site's first drive; all
/// writes then address paths relative to that drive's root.
///
/// [`connect`]: GraphClient::connect
#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    graph_base: String,
    token: String,
    drive_id: String,
}

impl GraphClient {
    pub async fn connect(credentials: &GraphCredentials) -> Result<Self, GraphError> {
        Self::connect_with(DEFAULT_GRAPH_BASE, DEFAULT_LOGIN_BASE, credentials).await
    }

    /// [`connect`] with overridable endpoints, for tests against a local
    /// server.
    ///
    /// [`connect`]: GraphClient::connect
    pub async fn connect_with(
        graph_base: &str,
        login_base: &str,
        credentials: &GraphCredentials,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::new();
        let token = auth::acquire_token(&http, login_base, credentials).await?;

        let url = format!("{graph_base}/sites/{}/drives", credentials.site_id);
        let drives: DriveListResponse = http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let drive = drives.value.into_iter().next().ok_or(GraphError::NoDrive)?;
        info!(library = %drive.name, "connected to document library");

        Ok(Self {
            http,
            graph_base: graph_base.trim_end_matches('/').to_string(),
            token,
            drive_id: drive.id,
        })
    }

    // ---

    fn item_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/drives/{}/root", self.graph_base, self.drive_id)
        } else {
            format!(
                "{}/drives/{}/root:/{}",
                self.graph_base,
                self.drive_id,
                encode_path(path)
            )
        }
    }

    fn children_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/children", self.item_url(""))
        } else {
            format!("{}:/children", self.item_url(path))
        }
    }
}

/// Percent-encodes each `/`-separated segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn store_err(err: reqwest::Error) -> TransferError {
    TransferError::Store(err.to_string())
}

fn status_err(context: &str, status: reqwest::StatusCode) -> TransferError {
    TransferError::Store(format!("{context}: unexpected status {status}"))
}

// ---

#[async_trait]
impl DestinationStore for GraphClient {
    async fn folder_exists(&self, path: &str) -> Result<bool, TransferError> {
        let response = self
            .http
            .get(self.item_url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(store_err)?;
        Ok(response.status().is_success())
    }

    /// Walks the path one segment at a time, creating whatever is missing.
    /// `replace` conflict behavior makes racing creates harmless.
    async fn create_folder(&self, path: &str) -> Result<(), TransferError> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let parent = current.clone();
            if current.is_empty() {
                current.push_str(segment);
            } else {
                current.push('/');
                current.push_str(segment);
            }

            if self.folder_exists(&current).await? {
                continue;
            }

            let response = self
                .http
                .post(self.children_url(&parent))
                .bearer_auth(&self.token)
                .json(&json!({
                    "name": segment,
                    "folder": {},
                    "@microsoft.graph.conflictBehavior": "replace",
                }))
                .send()
                .await
                .map_err(store_err)?;
            if !response.status().is_success() {
                return Err(status_err("create folder", response.status()));
            }
            debug!(folder = %current, "folder created");
        }
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, TransferError> {
        let response = self
            .http
            .get(self.children_url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(store_err)?;
        if !response.status().is_success() {
            return Err(status_err("list children", response.status()));
        }

        let listing: DriveChildrenResponse = response.json().await.map_err(store_err)?;
        Ok(listing
            .value
            .into_iter()
            .map(|item| ChildEntry {
                name: item.name,
                is_folder: item.folder.is_some(),
            })
            .collect())
    }

    async fn write_small(&self, path: &str, data: Bytes) -> Result<(), TransferError> {
        let url = format!("{}:/content", self.item_url(path));
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(store_err)?;
        match response.status().as_u16() {
            200 | 201 => Ok(()),
            _ => Err(status_err("upload", response.status())),
        }
    }

    async fn create_upload_session(&self, path: &str) -> Result<UploadHandle, TransferError> {
        let url = format!("{}:/createUploadSession", self.item_url(path));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "item": {"@microsoft.graph.conflictBehavior": "replace"}
            }))
            .send()
            .await
            .map_err(store_err)?;
        if !response.status().is_success() {
            return Err(status_err("create upload session", response.status()));
        }

        let session: UploadSessionResponse = response.json().await.map_err(store_err)?;
        Ok(UploadHandle(session.upload_url))
    }

    /// Session URLs are pre-authenticated, so this is the one request that
    /// carries no bearer token.
    async fn write_chunk(
        &self,
        session: &UploadHandle,
        offset: u64,
        data: Bytes,
        total_len: u64,
    ) -> Result<(), TransferError> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as u64 - 1;
        let response = self
            .http
            .put(&session.0)
            .header(
                reqwest::header::CONTENT_RANGE,
                format!("bytes {offset}-{end}/{total_len}"),
            )
            .body(data)
            .send()
            .await
            .map_err(store_err)?;
        match response.status().as_u16() {
            // 202 for intermediate chunks, 200/201 when the final chunk
            // completes the item.
            200 | 201 | 202 => Ok(()),
            _ => Err(status_err("upload chunk", response.status())),
        }
    }
}

// ---

#[derive(Deserialize)]
struct DriveListResponse {
    #[serde(default)]
    value: Vec<DriveEntry>,
}

#[derive(Deserialize)]
struct DriveEntry {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct DriveChildrenResponse {
    #[serde(default)]
    value: Vec<DriveItem>,
}

#[derive(Deserialize)]
struct DriveItem {
    name: String,
    folder: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: String,
}

// ---
