use std::collections::HashMap;

use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::EvidenceItem;

use super::matcher::SimilarityMatcher;
use super::types::{Narrative, VerificationReport, VerificationResult};
use super::PipelineError;

/// Placeholder factual-consistency score. Not derived from the narrative;
/// stands in until a real fact-checking signal exists.
pub const FACTUAL_ACCURACY_PROXY: f32 = 0.85;

/// Scores each narrative's citation accuracy, factual proxy and
/// completeness, and decides pass/fail against the citation threshold.
///
/// A citation that resolves to no known evidence item is recorded as an
/// issue on that narrative's result — it never fails the stage.
pub struct VerifierStage<'a> {
    matcher: &'a SimilarityMatcher<'a>,
    config: &'a PipelineConfig,
}

impl<'a> VerifierStage<'a> {
    pub fn new(matcher: &'a SimilarityMatcher<'a>, config: &'a PipelineConfig) -> Self {
        Self { matcher, config }
    }

    pub fn run(
        &self,
        narratives: &[Narrative],
        evidence: &[EvidenceItem],
    ) -> Result<VerificationReport, PipelineError> {
        let evidence_by_id: HashMap<Uuid, &EvidenceItem> =
            evidence.iter().map(|e| (e.id, e)).collect();

        let mut results = Vec::with_capacity(narratives.len());

        for narrative in narratives {
            let mut issues = Vec::new();
            let mut citation_scores = Vec::with_capacity(narrative.citations.len());

            for citation in &narrative.citations {
                match evidence_by_id.get(&citation.evidence_id) {
                    Some(item) => {
                        citation_scores.push(self.matcher.verify_citation(
                            &narrative.content,
                            &item.text,
                            &citation.excerpt,
                        ));
                    }
                    None => {
                        issues.push(format!("Evidence not found: {}", citation.evidence_id));
                        citation_scores.push(0.0);
                    }
                }
            }

            let citation_accuracy = if citation_scores.is_empty() {
                0.0
            } else {
                citation_scores.iter().sum::<f32>() / citation_scores.len() as f32
            };

            let completeness = (narrative.word_count as f32
                / self.config.target_narrative_words as f32)
                .min(1.0);

            results.push(VerificationResult::from_scores(
                narrative.standard_id.clone(),
                citation_accuracy,
                FACTUAL_ACCURACY_PROXY,
                completeness,
                issues,
                self.config.citation_threshold,
            ));
        }

        let verified_count = results.iter().filter(|r| r.verified).count();
        let needs_revision = results.len() - verified_count;
        let overall_verification_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.overall_score).sum::<f32>() / results.len() as f32
        };

        tracing::info!(
            verified = verified_count,
            needs_revision,
            overall = overall_verification_score,
            "verification complete"
        );

        Ok(VerificationReport {
            results,
            verified_count,
            needs_revision,
            overall_verification_score,
        })
    }
}
