//! Google Drive v3 implementation of [`RemoteStorage`].

pub mod auth;
pub mod config;

pub use config::DriveConfig;

use crate::http::{is_transient_error, is_transient_status};
use crate::storage::{FolderRef, RemoteStorage, StorageError};
use async_trait::async_trait;
use auth::TokenSource;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use urlencoding::encode;
use uuid::Uuid;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FOLDER_FIELDS: &str = "id,name,parents";
const SEARCH_PAGE_SIZE: &str = "100";

pub struct DriveClient {
    http: Client,
    config: DriveConfig,
    tokens: TokenSource,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
}

impl From<DriveFile> for FolderRef {
    fn from(file: DriveFile) -> Self {
        FolderRef {
            id: file.id,
            name: file.name,
            parent_id: file.parents.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: [&'a str; 1],
}

impl DriveClient {
    pub fn new(config: DriveConfig, http: Client) -> Self {
        let tokens = TokenSource::new(&config);
        Self {
            http,
            config,
            tokens,
        }
    }

    async fn token(&self) -> Result<String, StorageError> {
        self.tokens.access_token(&self.http).await
    }

    async fn grant_public_read(&self, file_id: &str, token: &str) -> Result<(), StorageError> {
        let url = format!(
            "{}/files/{}/permissions",
            self.config.api_root,
            encode(file_id)
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({"type": "anyone", "role": "reader"}))
            .send()
            .await
            .map_err(send_error)?;
        check_status(response, "permissions.create").await?;
        Ok(())
    }

    async fn list_folders(&self, query: &str) -> Result<Vec<FolderRef>, StorageError> {
        let token = self.token().await?;
        let response = self
            .http
            .get(format!("{}/files", self.config.api_root))
            .bearer_auth(&token)
            .query(&[
                ("q", query),
                ("fields", "files(id,name,parents)"),
                ("pageSize", SEARCH_PAGE_SIZE),
            ])
            .send()
            .await
            .map_err(send_error)?;
        let list: FileList = check_status(response, "files.list")
            .await?
            .json()
            .await
            .map_err(|err| StorageError::Permanent(format!("files.list: {err}")))?;
        Ok(list.files.into_iter().map(FolderRef::from).collect())
    }
}

#[async_trait]
impl RemoteStorage for DriveClient {
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError> {
        let token = self.token().await?;
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME),
            parents: [parent_id],
        };
        let response = self
            .http
            .post(format!("{}/files", self.config.api_root))
            .bearer_auth(&token)
            .query(&[("fields", FOLDER_FIELDS)])
            .json(&metadata)
            .send()
            .await
            .map_err(send_error)?;
        let file: DriveFile = check_status(response, "files.create")
            .await?
            .json()
            .await
            .map_err(|err| StorageError::Permanent(format!("files.create: {err}")))?;
        self.grant_public_read(&file.id, &token).await?;
        Ok(file.id)
    }

    async fn find_child_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<FolderRef>, StorageError> {
        let query = format!(
            "mimeType='{FOLDER_MIME}' and name='{}' and '{}' in parents and trashed=false",
            escape_query(name),
            escape_query(parent_id)
        );
        Ok(self.list_folders(&query).await?.into_iter().next())
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, StorageError> {
        let token = self.token().await?;
        let metadata = FileMetadata {
            name,
            mime_type: None,
            parents: [parent_id],
        };
        let boundary = format!("listing-{}", Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, mime_type, bytes)?;
        let size = body.len();

        let response = self
            .http
            .post(format!("{}/files", self.config.upload_root))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(send_error)?;
        let file: DriveFile = check_status(response, "files.upload")
            .await?
            .json()
            .await
            .map_err(|err| StorageError::Permanent(format!("files.upload: {err}")))?;
        self.grant_public_read(&file.id, &token).await?;
        debug!(target = "listing.drive", file_id = %file.id, bytes = size, "file uploaded");
        Ok(format!(
            "https://drive.google.com/file/d/{}/view?usp=sharing",
            file.id
        ))
    }

    async fn search_folders_by_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<FolderRef>, StorageError> {
        let query = format!(
            "name contains '{}' and mimeType='{FOLDER_MIME}' and trashed=false",
            escape_query(fragment)
        );
        self.list_folders(&query).await
    }

    async fn get_folder(&self, id: &str) -> Result<FolderRef, StorageError> {
        let token = self.token().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_root, encode(id)))
            .bearer_auth(&token)
            .query(&[("fields", FOLDER_FIELDS)])
            .send()
            .await
            .map_err(send_error)?;
        let file: DriveFile = check_status(response, "files.get")
            .await?
            .json()
            .await
            .map_err(|err| StorageError::Permanent(format!("files.get: {err}")))?;
        Ok(file.into())
    }

    async fn delete_folder_by_id(&self, id: &str) -> Result<(), StorageError> {
        let token = self.token().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.config.api_root, encode(id)))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(send_error)?;
        check_status(response, "files.delete").await?;
        Ok(())
    }

    fn folder_url(&self, id: &str) -> String {
        format!("https://drive.google.com/drive/folders/{id}")
    }
}

fn send_error(err: reqwest::Error) -> StorageError {
    if is_transient_error(&err) {
        StorageError::Transient(err.to_string())
    } else {
        StorageError::Permanent(err.to_string())
    }
}

async fn check_status(response: Response, call: &str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = format!("{call}: HTTP {status}");
    if is_transient_status(status) {
        Err(StorageError::Transient(message))
    } else {
        Err(StorageError::Permanent(message))
    }
}

/// Drive query strings quote values with `'` and escape with `\`.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(
    boundary: &str,
    metadata: &FileMetadata<'_>,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<Vec<u8>, StorageError> {
    let metadata = serde_json::to_string(metadata)
        .map_err(|err| StorageError::Permanent(format!("metadata: {err}")))?;
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}
