//! Embedding provider abstraction and batch orchestration.
//!
//! [`EmbeddingProvider`] is the seam between the pipeline and whatever
//! produces vectors; [`HttpEmbeddingProvider`] talks to any
//! OpenAI-compatible `/embeddings` endpoint. [`Embedder`] layers batch
//! semantics on top: one failed item costs one slot, not the batch.
//!
//! Vector utilities for SQLite BLOB storage live here too:
//! - [`vec_to_blob`] encodes a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] decodes a BLOB back into a `Vec<f32>`
//! - [`cosine_similarity`] and [`normalized_similarity`] score vectors
//!
//! # Retry Strategy
//!
//! The HTTP provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) retry
//! - HTTP 4xx (client error, not 429) fails immediately
//! - Network errors retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `384`). Fixed for the process lifetime.
    fn dims(&self) -> usize;
    /// Embed one text. Implementations handle their own retries.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Provider for OpenAI-compatible `POST {base_url}/embeddings` endpoints.
pub struct HttpEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ServiceUnavailable {
                service: "embedding",
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env).ok()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = self.api_key() {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| Error::Service {
                                service: "embedding",
                                reason: format!("invalid response body: {}", e),
                            })?;
                        return parse_embedding_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Service {
                            service: "embedding",
                            reason: format!("endpoint error {}: {}", status, body_text),
                        });
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        return Err(Error::Unauthorized {
                            service: "embedding",
                            reason: format!("endpoint error {}: {}", status, body_text),
                        });
                    }
                    return Err(Error::Service {
                        service: "embedding",
                        reason: format!("endpoint error {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(Error::ServiceUnavailable {
                        service: "embedding",
                        reason: e.to_string(),
                    });
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or(Error::Service {
            service: "embedding",
            reason: "embedding failed after retries".to_string(),
        }))
    }
}

/// Extract `data[0].embedding` from an OpenAI-compatible response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or(Error::Service {
            service: "embedding",
            reason: "invalid response: missing data[0].embedding".to_string(),
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Batch orchestration over a provider.
///
/// Holds the provider behind an `Arc` so pipeline tasks can share it.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed a single text (e.g. a search query).
    ///
    /// Rejects empty input and verifies the returned vector matches the
    /// provider's declared dimensionality.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation(
                "cannot embed empty text".to_string(),
            ));
        }

        let vector = self.provider.embed(text).await?;
        if vector.len() != self.provider.dims() {
            return Err(Error::Service {
                service: "embedding",
                reason: format!(
                    "model {} returned {} dims, expected {}",
                    self.provider.model_name(),
                    vector.len(),
                    self.provider.dims()
                ),
            });
        }

        Ok(vector)
    }

    /// Embed a batch, preserving input order and length.
    ///
    /// A failed item becomes `None` in its slot rather than failing the
    /// whole batch. An empty batch is a validation error.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Err(Error::Validation(
                "cannot embed an empty batch".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        let mut failed = 0usize;

        for (i, text) in texts.iter().enumerate() {
            match self.embed_one(text).await {
                Ok(v) => vectors.push(Some(v)),
                Err(e) => {
                    warn!(item = i, error = %e, "embedding failed for batch item");
                    failed += 1;
                    vectors.push(None);
                }
            }
        }

        if failed > 0 {
            warn!(
                total = texts.len(),
                failed, "batch completed with missing embeddings"
            );
        }

        Ok(vectors)
    }
}

/// Encode an embedding vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`. Mismatched lengths and zero vectors
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine similarity rescaled to `[0, 1]`: `(1 + cos) / 2`.
pub fn normalized_similarity(a: &[f32], b: &[f32]) -> f64 {
    (1.0 + cosine_similarity(a, b) as f64) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        dims: usize,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(Error::Service {
                    service: "embedding",
                    reason: "stub failure".to_string(),
                });
            }
            let mut v = vec![0.0f32; self.dims];
            v[0] = text.len() as f32;
            Ok(v)
        }
    }

    fn embedder(dims: usize, fail_on: Option<&str>) -> Embedder {
        Embedder::new(Arc::new(StubProvider {
            dims,
            fail_on: fail_on.map(str::to_string),
        }))
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let vec = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3f32, -0.7, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn normalized_similarity_stays_in_unit_interval() {
        for (a, b) in [
            (vec![1.0f32, 0.0], vec![1.0f32, 0.0]),
            (vec![1.0, 0.0], vec![-1.0, 0.0]),
            (vec![1.0, 0.0], vec![0.0, 1.0]),
        ] {
            let s = normalized_similarity(&a, &b);
            assert!((0.0..=1.0).contains(&s), "similarity {} out of range", s);
        }
    }

    #[tokio::test]
    async fn embed_one_rejects_empty_text() {
        let e = embedder(4, None);
        assert!(matches!(
            e.embed_one("   ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn embed_batch_rejects_empty_batch() {
        let e = embedder(4, None);
        assert!(matches!(
            e.embed_batch(&[]).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_batch_item_becomes_absent_slot() {
        let e = embedder(4, Some("bad"));
        let texts = vec![
            "good one".to_string(),
            "bad".to_string(),
            "another good".to_string(),
        ];
        let out = e.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].is_some());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
    }

    #[tokio::test]
    async fn embed_one_checks_dimensionality() {
        struct WrongDims;

        #[async_trait]
        impl EmbeddingProvider for WrongDims {
            fn model_name(&self) -> &str {
                "wrong"
            }
            fn dims(&self) -> usize {
                8
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![0.5; 3])
            }
        }

        let e = Embedder::new(Arc::new(WrongDims));
        assert!(matches!(
            e.embed_one("hello").await,
            Err(Error::Service { .. })
        ));
    }
}
