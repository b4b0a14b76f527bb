use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use super::ProviderError;

/// Flat metadata attached to an indexed vector. Ordered map so record
/// serialization is stable.
pub type Metadata = BTreeMap<String, String>;

/// A nearest-neighbor match returned by a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Equality filter over record metadata.
#[derive(Debug, Clone)]
pub struct MetadataFilter {
    key: String,
    value: String,
}

impl MetadataFilter {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata.get(&self.key).is_some_and(|v| v == &self.value)
    }
}

/// Nearest-neighbor index over embeddings with metadata.
///
/// Externally owned and shared across workflow runs; implementations must
/// be safe for concurrent callers.
pub trait VectorIndex: Send + Sync {
    fn upsert(&self, id: &str, embedding: &[f32], metadata: Metadata) -> Result<(), ProviderError>;

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// In-memory vector index backed by brute-force cosine scan.
pub struct InMemoryVectorIndex {
    entries: Mutex<Vec<IndexEntry>>,
}

struct IndexEntry {
    id: String,
    embedding: Vec<f32>,
    metadata: Metadata,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(&self, id: &str, embedding: &[f32], metadata: Metadata) -> Result<(), ProviderError> {
        if embedding.is_empty() {
            return Err(ProviderError::MalformedResponse {
                service: "vector index",
                detail: format!("empty embedding for record {id}"),
            });
        }

        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.id != id);
        entries.push(IndexEntry {
            id: id.to_string(),
            embedding: embedding.to_vec(),
            metadata,
        });
        Ok(())
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>, ProviderError> {
        let entries = self.entries.lock().unwrap();

        let mut scored: Vec<ScoredRecord> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| ScoredRecord {
                id: e.id.clone(),
                score: cosine_similarity(embedding, &e.embedding),
                metadata: e.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored)
    }
}

/// Cosine similarity; zero for mismatched dimensions or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
