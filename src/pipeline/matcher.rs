use std::collections::HashSet;

use serde::Serialize;

use crate::models::{EvidenceItem, Standard};
use crate::providers::{
    cosine_similarity, EmbeddingClient, Metadata, MetadataFilter, VectorIndex,
};

/// A candidate standard for an evidence item, with its cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct StandardSuggestion {
    pub standard_id: String,
    pub similarity: f32,
}

/// Combines the embedding client and vector index into candidate
/// (evidence, standard) suggestions and citation scoring.
///
/// Similarity search is an optimization hint, not a correctness
/// dependency: every provider failure degrades to a neutral result
/// instead of failing the caller.
pub struct SimilarityMatcher<'a> {
    embedder: &'a dyn EmbeddingClient,
    index: &'a dyn VectorIndex,
    similarity_floor: f32,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingClient,
        index: &'a dyn VectorIndex,
        similarity_floor: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            similarity_floor,
        }
    }

    /// Embed and upsert every standard with `type == "standard"` metadata.
    /// Called once per workflow before the first round. Failures are logged
    /// and skipped; the affected standards simply get no suggestions.
    pub fn index_standards(&self, standards: &[Standard]) {
        for standard in standards {
            let text = format!("{}\n{}", standard.title, standard.description);
            let embedding = match self.embedder.embed(&text) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(standard_id = %standard.id, error = %e, "standard embedding failed, skipping");
                    continue;
                }
            };

            let mut metadata = Metadata::new();
            metadata.insert("type".into(), "standard".into());
            metadata.insert("accreditor_id".into(), standard.accreditor_id.clone());

            if let Err(e) = self.index.upsert(&standard.id, &embedding, metadata) {
                tracing::warn!(standard_id = %standard.id, error = %e, "standard upsert failed, skipping");
            }
        }
    }

    /// Suggest up to `top_k` candidate standards for an evidence item.
    ///
    /// Reuses the precomputed embedding when present. Only records with
    /// similarity at or above the floor, restricted to the candidate set,
    /// are returned. Empty on any provider failure.
    pub fn suggest(
        &self,
        evidence: &EvidenceItem,
        candidate_standards: &[Standard],
        top_k: usize,
    ) -> Vec<StandardSuggestion> {
        let embedding = match &evidence.embedding {
            Some(e) => e.clone(),
            None => match self.embedder.embed(&evidence.text) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(evidence_id = %evidence.id, error = %e, "evidence embedding failed, no suggestions");
                    return vec![];
                }
            },
        };

        let filter = MetadataFilter::new("type", "standard");
        // Over-fetch so candidate-set filtering still leaves top_k results.
        let records = match self.index.query(&embedding, top_k * 2, Some(&filter)) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(evidence_id = %evidence.id, error = %e, "vector query failed, no suggestions");
                return vec![];
            }
        };

        let candidate_ids: HashSet<&str> =
            candidate_standards.iter().map(|s| s.id.as_str()).collect();

        records
            .into_iter()
            .filter(|r| r.score >= self.similarity_floor && candidate_ids.contains(r.id.as_str()))
            .take(top_k)
            .map(|r| StandardSuggestion {
                standard_id: r.id,
                similarity: r.score,
            })
            .collect()
    }

    /// Score how well a cited excerpt is supported: weighted blend of the
    /// excerpt's similarity to the source evidence (0.7) and to the
    /// narrative prose (0.3), clamped to [0,1]. Neutral 0.5 when the
    /// embedding backend fails.
    pub fn verify_citation(
        &self,
        narrative_excerpt: &str,
        evidence_text: &str,
        cited_excerpt: &str,
    ) -> f32 {
        let embeddings =
            match self
                .embedder
                .embed_batch(&[evidence_text, cited_excerpt, narrative_excerpt])
            {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "citation embedding failed, neutral score");
                    return 0.5;
                }
            };

        let sim_evidence = cosine_similarity(&embeddings[0], &embeddings[1]);
        let sim_narrative = cosine_similarity(&embeddings[2], &embeddings[1]);

        (0.7 * sim_evidence + 0.3 * sim_narrative).clamp(0.0, 1.0)
    }
}
