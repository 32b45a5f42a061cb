//! HTTP client for the paper backend.
//!
//! One method per backend operation. Each issues exactly one request against
//! the configured origin; nothing is retried.

use futures_util::Stream;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{
    AnalysisResult, ChatHistoryEntry, ChatReply, Credentials, Paper, PaperId, QuestionRequest,
    StreamLogRequest, UploadResponse, User, UserId,
};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base: config.api_base.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Validation(format!("无效的请求地址 {}: {}", path, e)))
    }

    // ========================================================================
    // Papers
    // ========================================================================

    pub async fn upload_paper(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        user_id: UserId,
    ) -> Result<UploadResponse> {
        info!(file_name, user_id, size = bytes.len(), "uploading paper");
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string());

        let response = self
            .http
            .post(self.endpoint("/api/papers/upload")?)
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn analyze_paper(&self, paper_id: PaperId) -> Result<AnalysisResult> {
        info!(paper_id, "requesting analysis");
        let response = self
            .http
            .post(self.endpoint(&format!("/api/papers/{}/analyze", paper_id))?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn list_papers(&self, user_id: UserId) -> Result<Vec<Paper>> {
        let mut url = self.endpoint("/api/papers")?;
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string());
        let response = self.http.get(url).send().await?;
        let papers: Vec<Paper> = decode(response).await?;
        info!(user_id, count = papers.len(), "loaded paper list");
        Ok(papers)
    }

    pub async fn get_paper(&self, paper_id: PaperId) -> Result<Paper> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/papers/{}", paper_id))?)
            .send()
            .await?;
        decode(response).await
    }

    /// Where the backend serves the raw PDF for the viewer frame.
    pub fn pdf_url(&self, paper: &Paper) -> String {
        let name = paper
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(&paper.original_filename);
        format!(
            "{}/uploads/{}",
            self.base.as_str().trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }

    // ========================================================================
    // Chat
    // ========================================================================

    pub async fn ask(&self, paper_id: PaperId, question: &str, user_id: UserId) -> Result<ChatReply> {
        info!(paper_id, user_id, "asking question");
        let response = self
            .http
            .post(self.endpoint(&format!("/api/papers/{}/chat", paper_id))?)
            .json(&QuestionRequest { question, user_id })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn chat_history(
        &self,
        paper_id: PaperId,
        user_id: UserId,
    ) -> Result<Vec<ChatHistoryEntry>> {
        let mut url = self.endpoint(&format!("/api/papers/{}/chat/history", paper_id))?;
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string());
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    /// Opens the legacy streaming chain and hands back the raw body stream.
    /// Non-2xx statuses are reported before any bytes are consumed.
    pub async fn stream_log(
        &self,
        chain: &str,
        input: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<impl AsRef<[u8]>>>> {
        let url = self.endpoint(&format!(
            "/chain/{}/stream_log",
            urlencoding::encode(chain)
        ))?;
        info!(chain, "opening stream_log");
        let response = self
            .http
            .post(url)
            .json(&StreamLogRequest::new(input))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(chain, status = status.as_u16(), "stream_log rejected");
            return Err(ClientError::from_body(status.as_u16(), &body));
        }
        Ok(response.bytes_stream())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn register(&self, username: &str, email: &str) -> Result<User> {
        self.post_credentials("/api/users/register", username, email)
            .await
    }

    pub async fn login(&self, username: &str, email: &str) -> Result<User> {
        self.post_credentials("/api/users/login", username, email)
            .await
    }

    async fn post_credentials(&self, path: &str, username: &str, email: &str) -> Result<User> {
        info!(path, username, "submitting credentials");
        let body = Credentials {
            username: username.to_string(),
            email: email.to_string(),
        };
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }
}

/// Reads the body once, mapping non-2xx statuses to `Backend` errors and
/// unparseable 2xx bodies to `Decode`.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await?;
    if !status.is_success() {
        let err = ClientError::from_body(status.as_u16(), &body);
        warn!(path = %url, status = status.as_u16(), error = %err, "backend rejected request");
        return Err(err);
    }
    serde_json::from_str(&body).map_err(|e| {
        warn!(path = %url, error = %e, "malformed backend response");
        ClientError::from(e)
    })
}
