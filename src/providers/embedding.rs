use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Deserialize;

use super::ProviderError;

/// Standard embedding dimension (all-MiniLM-class models).
pub const EMBEDDING_DIM: usize = 384;

/// Text-to-vector capability.
///
/// Implementations must be safe for concurrent callers.
pub trait EmbeddingClient: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;

    /// Whether the backend can currently serve requests. Used by the
    /// startup cascade.
    fn is_available(&self) -> bool;
}

/// Ollama embeddings endpoint client.
pub struct OllamaEmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::MalformedResponse {
                service: "embeddings",
                detail: format!("HTTP client construction failed: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient for OllamaEmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.model, "prompt": text });

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    service: "embeddings",
                    secs: self.timeout_secs,
                }
            } else if e.is_connect() {
                ProviderError::Connection {
                    service: "embeddings",
                    url: self.base_url.clone(),
                }
            } else {
                ProviderError::MalformedResponse {
                    service: "embeddings",
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                service: "embeddings",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaEmbeddingResponse =
            response
                .json()
                .map_err(|e| ProviderError::MalformedResponse {
                    service: "embeddings",
                    detail: e.to_string(),
                })?;

        if parsed.embedding.is_empty() {
            return Err(ProviderError::MalformedResponse {
                service: "embeddings",
                detail: "empty embedding vector".into(),
            });
        }

        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "embedding availability check failed");
                false
            }
        }
    }
}

/// Deterministic hash-based embedder.
///
/// Last-resort backend in the startup cascade and the test fixture.
/// Identical texts map to identical unit vectors; distinct texts map to
/// near-orthogonal ones. No semantic signal — similarity search degrades
/// to exact-text matching.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingClient for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(hash_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Generate a deterministic L2-normalized vector from text.
fn hash_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];

    for (i, slot) in vec.iter_mut().enumerate() {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        i.hash(&mut hasher);
        // Map the hash into [-1, 1]
        *slot = (hasher.finish() % 10_000) as f32 / 5_000.0 - 1.0;
    }

    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

/// An embedding backend candidate for the startup cascade.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Ollama { base_url: String, model: String },
    Hash,
}

/// Resolve the first available backend from an ordered candidate list.
///
/// Resolution happens once at process start; the chosen client is injected
/// into the matcher. Falls back to the hash embedder when nothing in the
/// list responds.
pub fn resolve_embedder(
    candidates: &[EmbeddingBackend],
    timeout_secs: u64,
) -> Box<dyn EmbeddingClient> {
    for candidate in candidates {
        match candidate {
            EmbeddingBackend::Ollama { base_url, model } => {
                match OllamaEmbeddingClient::new(base_url, model, timeout_secs) {
                    Ok(client) if client.is_available() => {
                        tracing::info!(model = %model, "embedding backend: ollama");
                        return Box::new(client);
                    }
                    Ok(_) => {
                        tracing::debug!(model = %model, "embedding backend not available, trying next");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "embedding backend construction failed");
                    }
                }
            }
            EmbeddingBackend::Hash => {
                tracing::info!("embedding backend: deterministic hash");
                return Box::new(HashEmbedder::new());
            }
        }
    }

    tracing::warn!("no configured embedding backend available; falling back to hash");
    Box::new(HashEmbedder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embed_is_deterministic() {
        let embedder = HashEmbedder::new();
        let v1 = embedder.embed("same text").unwrap();
        let v2 = embedder.embed("same text").unwrap();
        assert_eq!(v1, v2);
    }

    #[test]
    fn hash_embed_different_texts_differ() {
        let embedder = HashEmbedder::new();
        let v1 = embedder.embed("text A").unwrap();
        let v2 = embedder.embed("text B").unwrap();
        assert_ne!(v1, v2);
    }

    #[test]
    fn hash_embed_is_l2_normalized() {
        let embedder = HashEmbedder::new();
        let vec = embedder.embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be L2-normalized, got norm = {norm}"
        );
    }

    #[test]
    fn hash_embed_distinct_texts_near_orthogonal() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("governance policy for faculty review").unwrap();
        let b = embedder.embed("student outcomes assessment report").unwrap();
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        assert!(
            dot.abs() < 0.3,
            "unrelated texts should be near-orthogonal, got {dot}"
        );
    }

    #[test]
    fn dimension_is_384() {
        assert_eq!(HashEmbedder::new().dimension(), 384);
    }

    #[test]
    fn embed_batch_preserves_order() {
        let embedder = HashEmbedder::new();
        let batch = embedder.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("one").unwrap());
        assert_eq!(batch[1], embedder.embed("two").unwrap());
    }

    #[test]
    fn cascade_falls_back_to_hash() {
        // Unreachable Ollama first, hash second.
        let candidates = vec![
            EmbeddingBackend::Ollama {
                base_url: "http://localhost:1".into(),
                model: "nomic-embed-text".into(),
            },
            EmbeddingBackend::Hash,
        ];
        let embedder = resolve_embedder(&candidates, 1);
        assert!(embedder.is_available());
        assert_eq!(embedder.dimension(), EMBEDDING_DIM);
    }

    #[test]
    fn empty_cascade_still_resolves() {
        let embedder = resolve_embedder(&[], 1);
        assert!(embedder.embed("anything").is_ok());
    }
}
