//! OpenAI provider client
//!
//! Embeddings and short chat completions over the REST API, with
//! bounded retry and exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::error::{LlmError, LlmResult};
use super::LanguageModel;

/// OpenAI client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL, without trailing slash
    pub base_url: String,

    /// API key
    pub api_key: SecretString,

    /// Embedding model
    pub embedding_model: String,

    /// Requested embedding dimensions
    pub embedding_dimensions: usize,

    /// Completion model used for summaries and query distillation
    pub completion_model: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum attempts per request
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::new(String::new()),
            embedding_model: "text-embedding-3-large".to_string(),
            embedding_dimensions: 1536,
            completion_model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl OpenAiConfig {
    /// Default configuration with the given key
    pub fn with_api_key(api_key: SecretString) -> Self {
        Self {
            api_key,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI implementation of [`LanguageModel`]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Create a client; fails when the key is empty
    pub fn new(config: OpenAiConfig) -> LlmResult<Self> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(LlmError::Config {
                reason: "OpenAI API key is empty".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LlmError::Config {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Current configuration
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut request: F) -> LlmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut retry_delay = Duration::from_millis(250);
        let mut last_error = None;

        for attempt in 0..attempts {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        "OpenAI {} request failed (attempt {}/{}): {}",
                        operation,
                        attempt + 1,
                        attempts,
                        e
                    );

                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if let LlmError::RateLimited { retry_after_secs } = &e {
                        retry_delay = Duration::from_secs(*retry_after_secs);
                    }

                    last_error = Some(e);

                    if attempt + 1 < attempts {
                        tokio::time::sleep(retry_delay).await;
                        retry_delay = retry_delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Api {
            reason: "Max retries exceeded".to_string(),
        }))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> LlmResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    LlmError::from(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(LlmError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Authentication {
                reason: format!("HTTP {}: {}", status, body),
            });
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Network {
                reason: format!("HTTP {}: {}", status, body),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                reason: format!("HTTP {}: {}", status, body),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
            dimensions: self.config.embedding_dimensions,
        };

        let response: EmbeddingResponse = self
            .with_retry("embedding", || self.post("/embeddings", &body))
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "embedding response contained no data".to_string(),
            })
    }

    async fn quick_complete(&self, system: &str, user: &str) -> LlmResult<String> {
        let body = ChatRequest {
            model: &self.config.completion_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response: ChatResponse = self
            .with_retry("completion", || self.post("/chat/completions", &body))
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "completion response contained no choices".to_string(),
            })
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn embedding_space(&self) -> String {
        super::space_name(&[
            self.name(),
            &self.config.embedding_model,
            &self.config.embedding_dimensions.to_string(),
        ])
    }
}
