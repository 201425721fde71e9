use std::time::{Duration, SystemTime};

use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::host::sanitize_host;
use crate::models::{CreatedNode, NewNode, Node, Paginator, User, Version};

#[derive(Debug, Error)]
pub enum PapermergeError {
    #[error("host is empty; set PAPERMERGE_CLI__HOST")]
    MissingHost,
    #[error("token is empty; set PAPERMERGE_CLI__TOKEN")]
    MissingToken,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Targz,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Targz => "targz",
        }
    }
}

/// An archive response whose body has not been read yet.
#[derive(Debug)]
pub struct DownloadedArchive {
    /// File name suggested by the server's `Content-Disposition` header.
    pub file_name: Option<String>,
    response: Response,
}

impl DownloadedArchive {
    /// Hands out the response so the body can be streamed to disk.
    pub fn into_response(self) -> Response {
        self.response
    }
}

#[derive(Clone)]
pub struct PapermergeClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl PapermergeClient {
    pub fn new(host: &str, token: impl Into<String>) -> Result<Self, PapermergeError> {
        Self::with_http(Client::new(), host, token)
    }

    pub fn with_http(
        http: Client,
        host: &str,
        token: impl Into<String>,
    ) -> Result<Self, PapermergeError> {
        let host = sanitize_host(host);
        if host.is_empty() {
            return Err(PapermergeError::MissingHost);
        }
        let token = token.into();
        if token.trim().is_empty() {
            return Err(PapermergeError::MissingToken);
        }
        Ok(Self {
            http,
            base_url: Url::parse(&host)?,
            token,
        })
    }

    pub fn host(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub async fn get_me(&self) -> Result<User, PapermergeError> {
        let url = self.endpoint("/api/users/me")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_server_version(&self) -> Result<Version, PapermergeError> {
        let url = self.endpoint("/api/version/")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Fetches one page of the children of `node_id`.
    pub async fn list_children(
        &self,
        node_id: Uuid,
        page_number: u32,
        per_page: u32,
        order_by: Option<&str>,
    ) -> Result<Paginator<Node>, PapermergeError> {
        let mut url = self.endpoint(&format!("/api/nodes/{node_id}"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_number", &page_number.to_string());
            query.append_pair("per_page", &per_page.to_string());
            if let Some(order_by) = order_by.filter(|o| !o.is_empty()) {
                query.append_pair("order_by", order_by);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_node(&self, node: &NewNode) -> Result<CreatedNode, PapermergeError> {
        let url = self.endpoint("/api/nodes/")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(node)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(
        &self,
        parent_id: Uuid,
        title: &str,
    ) -> Result<CreatedNode, PapermergeError> {
        self.create_node(&NewNode::folder(title, parent_id)).await
    }

    /// Creates the empty document record that file content is later uploaded into.
    pub async fn create_document(
        &self,
        parent_id: Uuid,
        title: &str,
    ) -> Result<CreatedNode, PapermergeError> {
        self.create_node(&NewNode::document(title, parent_id)).await
    }

    /// Uploads `length` bytes of `body` as the content of an existing document.
    pub async fn upload_document_content(
        &self,
        document_id: Uuid,
        file_name: &str,
        body: impl Into<Body>,
        length: u64,
        mime_type: &str,
    ) -> Result<(), PapermergeError> {
        let url = self.endpoint(&format!("/api/documents/{document_id}/upload"))?;
        let part = Part::stream_with_length(body, length)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        Self::handle_empty_response(response).await
    }

    /// Replaces the tag set of a node.
    pub async fn assign_tags(&self, node_id: Uuid, tags: &[String]) -> Result<(), PapermergeError> {
        let url = self.tags_endpoint(node_id)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(tags)
            .send()
            .await?;
        Self::handle_empty_response(response).await
    }

    /// Merges `tags` into the node's existing tags.
    pub async fn add_tags(&self, node_id: Uuid, tags: &[String]) -> Result<(), PapermergeError> {
        let url = self.tags_endpoint(node_id)?;
        let response = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .json(tags)
            .send()
            .await?;
        Self::handle_empty_response(response).await
    }

    pub async fn remove_tags(&self, node_id: Uuid, tags: &[String]) -> Result<(), PapermergeError> {
        let url = self.tags_endpoint(node_id)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .json(tags)
            .send()
            .await?;
        Self::handle_empty_response(response).await
    }

    pub async fn download_nodes(
        &self,
        node_ids: &[Uuid],
        archive_type: ArchiveType,
    ) -> Result<DownloadedArchive, PapermergeError> {
        let mut url = self.endpoint("/api/nodes/download")?;
        {
            let mut query = url.query_pairs_mut();
            for id in node_ids {
                query.append_pair("node_ids", &id.to_string());
            }
            query.append_pair("archive_type", archive_type.as_str());
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name);
        Ok(DownloadedArchive {
            file_name,
            response,
        })
    }

    fn tags_endpoint(&self, node_id: Uuid) -> Result<Url, PapermergeError> {
        self.endpoint(&format!("/api/nodes/{node_id}/tags"))
    }

    // The host may carry a path prefix, so paths are appended rather than joined.
    fn endpoint(&self, path: &str) -> Result<Url, PapermergeError> {
        Ok(Url::parse(&format!("{}{path}", self.host()))?)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: Response,
    ) -> Result<T, PapermergeError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn handle_empty_response(response: Response) -> Result<(), PapermergeError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: Response) -> PapermergeError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        PapermergeError::Api {
            status,
            body,
            retry_after,
        }
    }
}

impl PapermergeError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            PapermergeError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// Server-side failures and transport failures (refused or dropped
    /// connections, timeouts, bodies cut short) are worth another attempt;
    /// everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            PapermergeError::Request(err) => {
                err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
            }
            _ => self.classification() == Some(ApiErrorClass::Transient),
        }
    }

    pub fn is_auth(&self) -> bool {
        self.classification() == Some(ApiErrorClass::Auth)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PapermergeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PapermergeError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status.is_server_error() {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

// value example: `attachment; filename=brother_004309.pdf`
fn attachment_file_name(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
