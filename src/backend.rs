//! HTTP client for the research backend.
//!
//! [`ResearchBackend`] is the seam the controller talks to; [`HttpBackend`]
//! implements it over `reqwest`. Build one with [`HttpBackend::builder`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{
    ChatRecord, ChatSummary, ResearchStatus, Settings, SettingsUpdate, StartRequest, StartResponse,
};

/// Operations the client needs from the research service.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// `POST /api/research/start`
    async fn start_research(&self, query: &str) -> Result<StartResponse>;
    /// `GET /api/research/status/{id}`
    async fn research_status(&self, chat_id: &str) -> Result<ResearchStatus>;
    /// `POST /api/research/stop/{id}`
    async fn stop_research(&self, chat_id: &str) -> Result<()>;
    /// `GET /api/chats`
    async fn list_chats(&self) -> Result<Vec<ChatSummary>>;
    /// `GET /api/chat/{id}`
    async fn get_chat(&self, chat_id: &str) -> Result<ChatRecord>;
    /// `GET /api/settings`
    async fn get_settings(&self) -> Result<Settings>;
    /// `POST /api/settings`
    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings>;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the backend (e.g. `http://127.0.0.1:5000`).
    pub base_url: String,
    /// TCP connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    /// Defaults: connect 3 s, request 10 s.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn builder(base_url: impl Into<String>) -> HttpBackendBuilder {
        HttpBackendBuilder::new(base_url)
    }

    /// Backend configured from a loaded [`ClientConfig`].
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::builder(cfg.normalized_base_url())
            .connect_timeout(cfg.connect_timeout())
            .request_timeout(cfg.request_timeout())
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, field: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;
        decode(resp, url, field).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        field: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let mut req = self.client.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| connect_error(&url, e))?;
        decode(resp, url, field).await
    }
}

fn connect_error(url: &str, e: reqwest::Error) -> ClientError {
    ClientError::Connect {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

/// Map a response to `T`, turning non-2xx codes into [`ClientError::Http`]
/// with the server's `error` message when the body carries one.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response, url: String, field: &str) -> Result<T> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|e| ClientError::Json {
        field: "body".into(),
        detail: e.to_string(),
    })?;

    if !status.is_success() {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }
        let detail = serde_json::from_slice::<ErrorBody>(&bytes).ok().map(|b| b.error);
        return Err(ClientError::Http {
            status: status.as_u16(),
            url,
            detail,
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(|e| ClientError::Json {
        field: field.to_string(),
        detail: e.to_string(),
    })
}

#[async_trait]
impl ResearchBackend for HttpBackend {
    async fn start_research(&self, query: &str) -> Result<StartResponse> {
        self.post_json("/api/research/start", Some(&StartRequest { query }), "chat_id")
            .await
    }

    async fn research_status(&self, chat_id: &str) -> Result<ResearchStatus> {
        self.get_json(&format!("/api/research/status/{chat_id}"), "status")
            .await
    }

    async fn stop_research(&self, chat_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json::<(), _>(&format!("/api/research/stop/{chat_id}"), None, "status")
            .await?;
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        self.get_json("/api/chats", "chats").await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatRecord> {
        self.get_json(&format!("/api/chat/{chat_id}"), "chat").await
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.get_json("/api/settings", "settings").await
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        self.post_json("/api/settings", Some(update), "settings").await
    }
}

/// Builder for [`HttpBackend`].
pub struct HttpBackendBuilder {
    config: HttpBackendConfig,
}

impl HttpBackendBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: HttpBackendConfig::new(base_url),
        }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> HttpBackend {
        // Client::builder() only fails in broken TLS environments; fall back
        // to a default client there instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .unwrap_or_default();

        HttpBackend {
            config: self.config,
            client,
        }
    }
}
