use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::{EvidenceItem, InstitutionProfile, Standard};
use crate::providers::{AgentRole, GenerationRequest, LlmClient};

use super::matcher::{SimilarityMatcher, StandardSuggestion};
use super::prompt::{build_mapper_prompt, MAPPER_SYSTEM_PROMPT};
use super::sanitize::{extract_json_block, sanitize_llm_output};
use super::types::{Mapping, MapperOutcome};
use super::PipelineError;

const AGENT: &str = "mapper";

/// Similarity suggestions gathered for one evidence item, fed to the
/// mapper prompt as a prior.
#[derive(Debug, Clone)]
pub struct EvidencePriors {
    pub evidence_id: Uuid,
    pub suggestions: Vec<StandardSuggestion>,
}

/// Maps evidence items to standards with confidence scores and reasoning.
///
/// One LLM call per run consumes the whole evidence batch plus the
/// similarity priors; the response is validated strictly — a single
/// mapping missing a required field rejects the entire batch.
pub struct MapperStage<'a> {
    llm: &'a dyn LlmClient,
    matcher: &'a SimilarityMatcher<'a>,
    config: &'a PipelineConfig,
}

impl<'a> MapperStage<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        matcher: &'a SimilarityMatcher<'a>,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            llm,
            matcher,
            config,
        }
    }

    pub fn run(
        &self,
        institution: &InstitutionProfile,
        evidence: &[EvidenceItem],
        standards: &[Standard],
    ) -> Result<MapperOutcome, PipelineError> {
        if evidence.is_empty() {
            tracing::info!("no evidence supplied, skipping mapper call");
            return Ok(MapperOutcome::empty());
        }

        let priors = self.collect_priors(evidence, standards);

        let request = GenerationRequest {
            role: AgentRole::Mapper,
            system: MAPPER_SYSTEM_PROMPT.to_string(),
            prompt: build_mapper_prompt(institution, evidence, standards, &priors),
            temperature: self.config.mapper_temperature,
            max_tokens: self.config.max_tokens,
        };

        let completion = self
            .llm
            .generate(&request)
            .map_err(|e| PipelineError::from_provider(AGENT, e))?;

        let batch = parse_mapping_batch(&completion.content)?;
        Ok(self.partition(batch, evidence, standards))
    }

    /// Fan out the per-evidence similarity lookups across scoped threads;
    /// they share no mutable state, and the LLM call waits for all of them.
    fn collect_priors(
        &self,
        evidence: &[EvidenceItem],
        standards: &[Standard],
    ) -> Vec<EvidencePriors> {
        let top_k = self.config.similarity_top_k;
        let mut priors = Vec::with_capacity(evidence.len());

        std::thread::scope(|scope| {
            let handles: Vec<_> = evidence
                .iter()
                .map(|item| {
                    (
                        item.id,
                        scope.spawn(move || self.matcher.suggest(item, standards, top_k)),
                    )
                })
                .collect();

            for (evidence_id, handle) in handles {
                let suggestions = match handle.join() {
                    Ok(s) => s,
                    Err(_) => {
                        tracing::warn!(evidence_id = %evidence_id, "similarity lookup thread panicked");
                        vec![]
                    }
                };
                priors.push(EvidencePriors {
                    evidence_id,
                    suggestions,
                });
            }
        });

        priors
    }

    /// Split the validated batch into accepted / needs-review / rejected,
    /// dropping mappings that reference ids outside the supplied sets.
    fn partition(
        &self,
        batch: ParsedBatch,
        evidence: &[EvidenceItem],
        standards: &[Standard],
    ) -> MapperOutcome {
        let evidence_ids: HashSet<Uuid> = evidence.iter().map(|e| e.id).collect();
        let standard_ids: HashSet<&str> = standards.iter().map(|s| s.id.as_str()).collect();

        let mut accepted = Vec::new();
        let mut needs_review = Vec::new();
        let mut rejected_count = 0;

        for mapping in batch.mappings {
            if !evidence_ids.contains(&mapping.evidence_id)
                || !standard_ids.contains(mapping.standard_id.as_str())
            {
                tracing::warn!(
                    evidence_id = %mapping.evidence_id,
                    standard_id = %mapping.standard_id,
                    "mapping references unknown id — dropped"
                );
                continue;
            }

            if mapping.confidence_score >= self.config.mapping_acceptance_threshold {
                accepted.push(mapping);
            } else if mapping.confidence_score >= self.config.review_floor {
                needs_review.push(mapping);
            } else {
                rejected_count += 1;
            }
        }

        tracing::info!(
            accepted = accepted.len(),
            needs_review = needs_review.len(),
            rejected = rejected_count,
            "mapper batch partitioned"
        );

        MapperOutcome {
            accepted,
            needs_review,
            rejected_count,
            unmapped_evidence: batch.unmapped_evidence,
            overall_confidence: batch.overall_confidence,
        }
    }
}

/// Validated mapping batch, before threshold partitioning.
struct ParsedBatch {
    mappings: Vec<Mapping>,
    unmapped_evidence: Vec<Uuid>,
    overall_confidence: f32,
}

#[derive(Deserialize)]
struct RawBatch {
    mappings: Option<Vec<serde_json::Value>>,
    unmapped_evidence: Option<Vec<String>>,
    overall_confidence: Option<f32>,
}

/// Parse the mapper response into a validated batch.
///
/// Any mapping missing `evidence_id`, `standard_id` or `confidence_score`
/// rejects the whole batch. Confidence scores are clamped into [0,1].
fn parse_mapping_batch(content: &str) -> Result<ParsedBatch, PipelineError> {
    let cleaned = sanitize_llm_output(content);
    let json = extract_json_block(&cleaned).ok_or_else(|| PipelineError::MalformedAgentOutput {
        agent: AGENT,
        detail: "no JSON object in response".into(),
    })?;

    let raw: RawBatch =
        serde_json::from_str(&json).map_err(|e| PipelineError::MalformedAgentOutput {
            agent: AGENT,
            detail: e.to_string(),
        })?;

    let mut mappings = Vec::new();
    for (i, value) in raw.mappings.unwrap_or_default().iter().enumerate() {
        mappings.push(parse_mapping(value, i)?);
    }

    // Lenient: ids here are advisory, a bad one is dropped not fatal.
    let unmapped_evidence = raw
        .unmapped_evidence
        .unwrap_or_default()
        .iter()
        .filter_map(|s| match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = %s, "unparseable unmapped_evidence id — dropped");
                None
            }
        })
        .collect();

    let overall_confidence = raw
        .overall_confidence
        .unwrap_or_else(|| mean_confidence(&mappings))
        .clamp(0.0, 1.0);

    Ok(ParsedBatch {
        mappings,
        unmapped_evidence,
        overall_confidence,
    })
}

fn parse_mapping(value: &serde_json::Value, index: usize) -> Result<Mapping, PipelineError> {
    let missing = |field: &str| PipelineError::MalformedAgentOutput {
        agent: AGENT,
        detail: format!("mapping #{index} missing required field `{field}`"),
    };

    let evidence_id_str = value
        .get("evidence_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("evidence_id"))?;
    let evidence_id =
        Uuid::parse_str(evidence_id_str).map_err(|_| PipelineError::MalformedAgentOutput {
            agent: AGENT,
            detail: format!("mapping #{index} has non-uuid evidence_id `{evidence_id_str}`"),
        })?;

    let standard_id = value
        .get("standard_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("standard_id"))?
        .to_string();

    let confidence_score = value
        .get("confidence_score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| missing("confidence_score"))? as f32;

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let excerpts = value
        .get("excerpts")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(Mapping {
        evidence_id,
        standard_id,
        confidence_score: confidence_score.clamp(0.0, 1.0),
        reasoning,
        excerpts,
    })
}

fn mean_confidence(mappings: &[Mapping]) -> f32 {
    if mappings.is_empty() {
        return 0.0;
    }
    mappings.iter().map(|m| m.confidence_score).sum::<f32>() / mappings.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceType, InstitutionType};
    use crate::providers::{HashEmbedder, InMemoryVectorIndex, MockLlmClient};
    use chrono::Utc;

    fn make_institution() -> InstitutionProfile {
        InstitutionProfile {
            id: Uuid::new_v4(),
            name: "Ridgeline College".into(),
            institution_type: InstitutionType::College,
            state: None,
        }
    }

    fn make_evidence(id: Uuid) -> EvidenceItem {
        EvidenceItem {
            id,
            title: "Mission Statement".into(),
            evidence_type: EvidenceType::Policy,
            text: "Our mission is student success.".into(),
            keywords: vec![],
            embedding: None,
            uploaded_at: Utc::now(),
        }
    }

    fn make_standard(id: &str) -> Standard {
        Standard {
            id: id.into(),
            accreditor_id: "acc-1".into(),
            title: format!("Standard {id}"),
            description: "desc".into(),
            required_evidence_types: vec![],
            applicable_institution_types: vec![],
            weight: 1.0,
        }
    }

    fn batch_response(entries: &[(Uuid, &str, f32)]) -> String {
        let mappings: Vec<String> = entries
            .iter()
            .map(|(eid, sid, conf)| {
                format!(
                    r#"{{"evidence_id": "{eid}", "standard_id": "{sid}", "confidence_score": {conf}, "reasoning": "supports the standard", "excerpts": ["excerpt"]}}"#
                )
            })
            .collect();
        format!(
            r#"{{"mappings": [{}], "unmapped_evidence": [], "overall_confidence": 0.8}}"#,
            mappings.join(",")
        )
    }

    fn run_mapper(
        llm: &MockLlmClient,
        evidence: &[EvidenceItem],
        standards: &[Standard],
    ) -> Result<MapperOutcome, PipelineError> {
        let embedder = HashEmbedder::new();
        let index = InMemoryVectorIndex::new();
        let config = PipelineConfig::default();
        let matcher = SimilarityMatcher::new(&embedder, &index, config.similarity_floor);
        let stage = MapperStage::new(llm, &matcher, &config);
        stage.run(&make_institution(), evidence, standards)
    }

    #[test]
    fn partitions_by_confidence_thresholds() {
        let e1 = Uuid::new_v4();
        let e2 = Uuid::new_v4();
        let e3 = Uuid::new_v4();
        let evidence = vec![make_evidence(e1), make_evidence(e2), make_evidence(e3)];
        let standards = vec![make_standard("ACC-1.A")];

        let response =
            batch_response(&[(e1, "ACC-1.A", 0.9), (e2, "ACC-1.A", 0.5), (e3, "ACC-1.A", 0.2)]);
        let llm = MockLlmClient::new().with_response(AgentRole::Mapper, &response);

        let outcome = run_mapper(&llm, &evidence, &standards).unwrap();

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].evidence_id, e1);
        assert_eq!(outcome.needs_review.len(), 1);
        assert_eq!(outcome.needs_review[0].evidence_id, e2);
        assert_eq!(outcome.rejected_count, 1);
        // Threshold exclusion: nothing below 0.7 in the accepted set.
        assert!(outcome.accepted.iter().all(|m| m.confidence_score >= 0.7));
    }

    #[test]
    fn missing_confidence_rejects_whole_batch() {
        let e1 = Uuid::new_v4();
        let evidence = vec![make_evidence(e1)];
        let standards = vec![make_standard("ACC-1.A")];

        let response = format!(
            r#"{{"mappings": [{{"evidence_id": "{e1}", "standard_id": "ACC-1.A", "reasoning": "no score"}}], "unmapped_evidence": [], "overall_confidence": 0.9}}"#
        );
        let llm = MockLlmClient::new().with_response(AgentRole::Mapper, &response);

        let err = run_mapper(&llm, &evidence, &standards).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedAgentOutput { agent: "mapper", .. }));
    }

    #[test]
    fn non_json_response_rejected() {
        let evidence = vec![make_evidence(Uuid::new_v4())];
        let standards = vec![make_standard("ACC-1.A")];
        let llm = MockLlmClient::new()
            .with_response(AgentRole::Mapper, "I could not map anything, sorry!");

        let err = run_mapper(&llm, &evidence, &standards).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedAgentOutput { .. }));
    }

    #[test]
    fn unknown_ids_are_dropped_not_fatal() {
        let e1 = Uuid::new_v4();
        let evidence = vec![make_evidence(e1)];
        let standards = vec![make_standard("ACC-1.A")];

        // Second mapping references a hallucinated evidence id.
        let response = batch_response(&[(e1, "ACC-1.A", 0.9), (Uuid::new_v4(), "ACC-1.A", 0.9)]);
        let llm = MockLlmClient::new().with_response(AgentRole::Mapper, &response);

        let outcome = run_mapper(&llm, &evidence, &standards).unwrap();
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].evidence_id, e1);
    }

    #[test]
    fn confidence_clamped_into_unit_interval() {
        let e1 = Uuid::new_v4();
        let evidence = vec![make_evidence(e1)];
        let standards = vec![make_standard("ACC-1.A")];

        let response = batch_response(&[(e1, "ACC-1.A", 1.7)]);
        let llm = MockLlmClient::new().with_response(AgentRole::Mapper, &response);

        let outcome = run_mapper(&llm, &evidence, &standards).unwrap();
        assert!((outcome.accepted[0].confidence_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_evidence_short_circuits_without_llm_call() {
        // A mapper failure would surface if the LLM were called.
        let llm = MockLlmClient::new()
            .with_failure(AgentRole::Mapper, crate::providers::MockLlmFailure::Timeout);
        let outcome = run_mapper(&llm, &[], &[make_standard("ACC-1.A")]).unwrap();
        assert!(outcome.accepted.is_empty());
        assert!((outcome.overall_confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fenced_response_parses() {
        let e1 = Uuid::new_v4();
        let evidence = vec![make_evidence(e1)];
        let standards = vec![make_standard("ACC-1.A")];

        let response = format!(
            "Here is the mapping:\n```json\n{}\n```",
            batch_response(&[(e1, "ACC-1.A", 0.8)])
        );
        let llm = MockLlmClient::new().with_response(AgentRole::Mapper, &response);

        let outcome = run_mapper(&llm, &evidence, &standards).unwrap();
        assert_eq!(outcome.accepted.len(), 1);
    }

    #[test]
    fn timeout_surfaces_as_upstream_timeout() {
        let evidence = vec![make_evidence(Uuid::new_v4())];
        let standards = vec![make_standard("ACC-1.A")];
        let llm = MockLlmClient::new()
            .with_failure(AgentRole::Mapper, crate::providers::MockLlmFailure::Timeout);

        let err = run_mapper(&llm, &evidence, &standards).unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamTimeout { agent: "mapper", .. }));
    }
}
