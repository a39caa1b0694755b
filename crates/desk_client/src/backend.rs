//! Backend transport - opening the chat stream and the resume call.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use desk_core::{DeskConfig, Provider};
use futures_util::{Stream, StreamExt};
use log::{error, info};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: Option<String>,
    pub provider: Provider,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, config: &DeskConfig) -> Self {
        Self {
            message: message.into(),
            thread_id: None,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn with_thread_id(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }
}

#[async_trait]
pub trait DeskBackend: Send + Sync {
    /// Open the response body of a chat submission.
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Resume a thread paused for human confirmation.
    async fn resume_thread(&self, thread_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// [`DeskBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether the backend reports itself healthy.
    pub async fn health(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send().await?;
        let response = ensure_success(response).await?;
        let health: HealthResponse = response.json().await?;
        Ok(health.status == "healthy")
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Backend returned {}: {}", status, body);
    Err(DeskError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DeskBackend for HttpBackend {
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.url("/chat");
        info!(
            "Opening chat stream at {} (provider: {}, thread: {:?})",
            url, request.provider, request.thread_id
        );

        let response = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to open chat stream: {}", e);
                DeskError::from(e)
            })?;
        let response = ensure_success(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DeskError::from));
        Ok(Box::pin(body))
    }

    async fn resume_thread(&self, thread_id: &str) -> Result<()> {
        let url = self.url(&format!("/approve/{thread_id}"));
        info!("Resuming thread {}", thread_id);
        let response = self.client.post(&url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
