//! Generative backend abstraction
//!
//! Provides a unified interface for text and image generation:
//! - OpenAI-compatible HTTP APIs
//! - Mock backend for tests and local development
//!
//! Callers should not use a backend directly; wrap it in a
//! [`ResilientClient`] so retries and the circuit breaker apply.

pub mod breaker;
mod resilient;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use resilient::{ResilientClient, RetryPolicy};

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A chat message sent to the text-generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A generated image payload
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Raw backend failure, classified for retry decisions
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid backend response: {message}")]
    InvalidResponse { message: String },
}

impl BackendError {
    /// Rate limits (429), server errors (5xx), and transport failures are
    /// worth retrying; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            BackendError::Transport(_) => true,
            BackendError::InvalidResponse { .. } => false,
        }
    }

    /// HTTP status, where the failure carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            BackendError::Transport(e) => e.status().map(|s| s.as_u16()),
            BackendError::InvalidResponse { .. } => None,
        }
    }
}

/// Trait for generative backends
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generate a text completion for the given messages
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError>;

    /// Generate an image for the given prompt
    async fn generate_image(
        &self,
        prompt: &str,
    ) -> std::result::Result<GeneratedImage, BackendError>;

    /// Get the text model name
    fn text_model(&self) -> &str;
}

/// OpenAI-compatible backend client
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: String,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(
        api_key: String,
        text_model: String,
        image_model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            text_model,
            image_model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> std::result::Result<T, BackendError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Http { status, message });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.text_model,
            messages,
        };

        let result: ChatResponse = self.post_json("chat/completions", &request).await?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "Empty choices in completion response".to_string(),
            })
    }

    async fn generate_image(
        &self,
        prompt: &str,
    ) -> std::result::Result<GeneratedImage, BackendError> {
        let request = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: "1024x1024",
        };

        let result: ImageResponse = self.post_json("images/generations", &request).await?;

        let datum = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "Empty data in image response".to_string(),
            })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(datum.b64_json)
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Invalid image payload: {}", e),
            })?;

        Ok(GeneratedImage {
            bytes,
            content_type: "image/png".to_string(),
        })
    }

    fn text_model(&self) -> &str {
        &self.text_model
    }
}

/// Mock backend for tests and credential-free local runs
pub struct MockBackend;

/// Smallest valid PNG, used as the mock cover payload
const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[async_trait]
impl GenerativeBackend for MockBackend {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
    ) -> std::result::Result<String, BackendError> {
        Ok(serde_json::json!({
            "one_sentence": "A concise, reproducible summary of the paper.",
            "code_angle": "Implement the core idea as a minimal simulator and add the paper's novelty as a delta.",
            "bio_inspiration": "Identify which neural signal carries information and how learning changes synapses."
        })
        .to_string())
    }

    async fn generate_image(
        &self,
        _prompt: &str,
    ) -> std::result::Result<GeneratedImage, BackendError> {
        Ok(GeneratedImage {
            bytes: MOCK_PNG.to_vec(),
            content_type: "image/png".to_string(),
        })
    }

    fn text_model(&self) -> &str {
        "mock-generation"
    }
}

/// Create a backend based on configuration
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerativeBackend>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "generation.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAiBackend::new(
                api_key,
                config.text_model.clone(),
                config.image_model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockBackend)),
        other => {
            tracing::warn!(provider = other, "Unknown generation provider, using mock");
            Ok(Arc::new(MockBackend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_returns_summary_json() {
        let backend = MockBackend;
        let raw = backend.complete(&[ChatMessage::user("test")]).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed.get("one_sentence").is_some());
    }

    #[tokio::test]
    async fn test_mock_backend_image_is_png() {
        let backend = MockBackend;
        let image = backend.generate_image("a cover").await.unwrap();
        assert_eq!(&image.bytes[1..4], b"PNG");
        assert_eq!(image.content_type, "image/png");
    }

    #[test]
    fn test_error_classification() {
        let rate_limited = BackendError::Http {
            status: 429,
            message: "slow down".into(),
        };
        let server = BackendError::Http {
            status: 503,
            message: "unavailable".into(),
        };
        let auth = BackendError::Http {
            status: 401,
            message: "bad key".into(),
        };

        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!auth.is_retryable());
        assert_eq!(auth.status(), Some(401));
    }
}
