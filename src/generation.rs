//! Text generation provider for answering questions over retrieved
//! context.
//!
//! [`OpenAiChatProvider`] speaks the OpenAI chat-completions wire format
//! shared by Groq, OpenAI, and most local inference servers. The trait
//! seam keeps the query orchestrator testable without a live endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};

/// Per-request generation settings.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub system: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the configured model when set.
    pub model: Option<String>,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub tokens_generated: Option<u32>,
    pub time_ms: Option<u64>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Whether the provider is ready to serve requests (e.g. its API key
    /// is configured). Checked before retrieval so a missing key fails
    /// fast instead of after an embedding round trip.
    async fn available(&self) -> bool;

    async fn generate(&self, prompt: &str, opts: &GenerationOptions) -> Result<Generation>;
}

/// Provider for OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct OpenAiChatProvider {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ServiceUnavailable {
                service: "generation",
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatProvider {
    async fn available(&self) -> bool {
        self.api_key().is_some()
    }

    async fn generate(&self, prompt: &str, opts: &GenerationOptions) -> Result<Generation> {
        let api_key = self.api_key().ok_or(Error::ServiceUnavailable {
            service: "generation",
            reason: format!("{} is not set", self.config.api_key_env),
        })?;

        let model = opts.model.as_deref().unwrap_or(&self.config.model);
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": opts.system },
                { "role": "user", "content": prompt },
            ],
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ServiceUnavailable {
                service: "generation",
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::Unauthorized {
                    service: "generation",
                    reason: "invalid API key".to_string(),
                },
                429 => Error::RateLimited {
                    service: "generation",
                    reason: body_text,
                },
                _ => Error::Service {
                    service: "generation",
                    reason: format!("endpoint error {}: {}", status, body_text),
                },
            });
        }

        let json: serde_json::Value = response.json().await.map_err(|e| Error::Service {
            service: "generation",
            reason: format!("invalid response body: {}", e),
        })?;

        let text = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or(Error::Service {
                service: "generation",
                reason: "invalid response: missing choices[0].message.content".to_string(),
            })?
            .trim()
            .to_string();

        let tokens_generated = json
            .get("usage")
            .and_then(|u| u.get("completion_tokens"))
            .and_then(|t| t.as_u64())
            .map(|t| t as u32);

        Ok(Generation {
            text,
            model: model.to_string(),
            tokens_generated,
            time_ms: Some(started.elapsed().as_millis() as u64),
        })
    }
}
