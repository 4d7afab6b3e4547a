//! Generation backend collaborator.
//!
//! The generative API is out of scope for this service: it sits behind the
//! [`GenerationBackend`] trait, with an HTTP implementation for production
//! and a stub in the test utilities.

pub mod sessions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("no generation backend configured")]
    Unconfigured,
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One exchange in a chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// A generated image or video, addressed by URL on the upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAsset {
    pub url: String,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, GenerationError>;
    async fn prompt(&self, instruction: &str) -> Result<String, GenerationError>;
    async fn image(&self, prompt: &str) -> Result<GeneratedAsset, GenerationError>;
    async fn video(&self, prompt: &str) -> Result<GeneratedAsset, GenerationError>;
}

/// HTTP client for the upstream generation service.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, GenerationError> {
        let url = self.base_url.join(path).map_err(|_| GenerationError::Unconfigured)?;
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    history: &'a [ChatTurn],
    message: &'a str,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    instruction: &'a str,
}

#[derive(Serialize)]
struct AssetRequest<'a> {
    prompt: &'a str,
}

#[async_trait]
impl GenerationBackend for HttpGenerator {
    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, GenerationError> {
        let response: TextResponse = self.post("chat", &ChatRequest { history, message }).await?;
        Ok(response.text)
    }

    async fn prompt(&self, instruction: &str) -> Result<String, GenerationError> {
        let response: TextResponse = self.post("prompt", &PromptRequest { instruction }).await?;
        Ok(response.text)
    }

    async fn image(&self, prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        self.post("image", &AssetRequest { prompt }).await
    }

    async fn video(&self, prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        self.post("video", &AssetRequest { prompt }).await
    }
}

/// Placeholder used when no upstream is configured; every call fails with
/// [`GenerationError::Unconfigured`] and the handler maps that to 502.
pub struct UnconfiguredGenerator;

#[async_trait]
impl GenerationBackend for UnconfiguredGenerator {
    async fn chat(&self, _history: &[ChatTurn], _message: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unconfigured)
    }

    async fn prompt(&self, _instruction: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unconfigured)
    }

    async fn image(&self, _prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        Err(GenerationError::Unconfigured)
    }

    async fn video(&self, _prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        Err(GenerationError::Unconfigured)
    }
}
