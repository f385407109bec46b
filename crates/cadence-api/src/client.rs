//! HTTP client for the analysis backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cadence_settings::ApiSettings;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::errors::{ApiError, Result};
use crate::poller::StatusSource;
use crate::types::{AnalysisRecord, UploadReceipt};

/// Client for `{base}/analysis/{id}` and `{base}/upload`.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Create a client whose requests are bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", cadence_core::constants::NAME, cadence_core::constants::VERSION))
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_token: None,
        })
    }

    /// Create a client from the `api` settings section.
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let client = Self::new(settings.base_url.clone(), settings.request_timeout())?;
        Ok(match &settings.auth_token {
            Some(token) => client.with_auth_token(token.clone()),
            None => client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the analysis status of a conversation.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn analysis(&self, id: &str) -> Result<AnalysisRecord> {
        let segment = path_segment(id)?;
        let resource = format!("analysis/{segment}");
        let response = self
            .authorize(self.http.get(self.url(&resource)))
            .send()
            .await?;
        decode(response, &resource).await
    }

    /// Upload an audio file from disk.
    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_owned();
        let mime = mime_for(path);
        self.upload_bytes(file_name, bytes, mime).await
    }

    /// Upload audio held in memory as the `file` part of a multipart form.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_bytes(
        &self,
        file_name: String,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<UploadReceipt> {
        if bytes.is_empty() {
            return Err(ApiError::InvalidRequest("audio file is empty".into()));
        }
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid content type {mime}: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorize(self.http.post(self.url("upload")))
            .multipart(form)
            .send()
            .await?;
        let receipt: UploadReceipt = decode(response, "upload").await?;
        debug!(conversation_id = %receipt.conversation_id, "upload accepted");
        Ok(receipt)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, id: &str) -> Result<AnalysisRecord> {
        self.analysis(id).await
    }
}

fn path_segment(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(ApiError::InvalidRequest(format!("invalid resource id: {id:?}")));
    }
    Ok(id)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, resource: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(resource, status = code, "request failed");
        return Err(match code {
            401 | 403 => ApiError::Unauthorized { status: code },
            404 => ApiError::NotFound(resource.to_owned()),
            _ => ApiError::Http { status: code, body },
        });
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{resource}: {e}")))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        Some("ogg" | "oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}
