use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// How a failed call should be treated: a retryable class may succeed on a
/// later resume, the others will not without user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl ApiErrorClass {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimit,
            StatusCode::REQUEST_TIMEOUT => Self::Transient,
            status if status.is_server_error() => Self::Transient,
            _ => Self::Permanent,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Transient)
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    /// Endpoints are resolved relative to `base_url`, so a path prefix such as
    /// `/api/v1` is preserved.
    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&base)?,
            token: token.into(),
        })
    }

    pub async fn get_me(&self) -> Result<UserInfo, DriveError> {
        let url = self.endpoint("auth/me")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_folder(&self, folder_id: &str) -> Result<FolderContents, DriveError> {
        let url = self.endpoint(&format!("folders/{folder_id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Reserves one upload destination per file, in request order. The server
    /// creates intermediate folders for nested relative paths and reports them
    /// in the optional delta.
    pub async fn initiate_batch(
        &self,
        parent_id: &str,
        files: &[FileInitItem],
    ) -> Result<BulkInitResponse, DriveError> {
        let url = self.endpoint("upload/bulk")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&BulkInitRequest { parent_id, files })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn confirm_upload(&self, confirm: &ConfirmUpload) -> Result<DriveItem, DriveError> {
        let url = self.endpoint("upload/confirm")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(confirm)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

impl DriveError {
    /// Transport failures without a response (connect, timeout) count as
    /// transient; a body that does not decode is permanent.
    pub fn class(&self) -> ApiErrorClass {
        match self {
            DriveError::Api { status, .. } => ApiErrorClass::from_status(*status),
            DriveError::Request(err) if err.is_decode() => ApiErrorClass::Permanent,
            DriveError::Request(err) => err
                .status()
                .map_or(ApiErrorClass::Transient, ApiErrorClass::from_status),
            DriveError::Url(_) => ApiErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub root_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

/// Tree-cache mutation reported by the server or synthesized after a confirm.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TreeDelta {
    #[serde(default)]
    pub added: Vec<DriveItem>,
    #[serde(default)]
    pub updated: Vec<DriveItem>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl TreeDelta {
    pub fn added(item: DriveItem) -> Self {
        Self {
            added: vec![item],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FolderContents {
    pub children: Vec<DriveItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileInitItem {
    pub file_name: String,
    pub file_type: String,
    pub relative_path: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Serialize)]
struct BulkInitRequest<'a> {
    parent_id: &'a str,
    files: &'a [FileInitItem],
}

/// Pre-signed destination plus the identifiers the confirm call needs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: Url,
    pub resource_id: String,
    pub s3_key: String,
    pub actual_parent_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BulkInitResponse {
    pub files: Vec<UploadTarget>,
    #[serde(default)]
    pub delta: Option<TreeDelta>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfirmUpload {
    pub resource_id: String,
    pub parent_id: String,
    pub name: String,
    pub size: u64,
    pub s3_key: String,
    pub relative_path: String,
}
