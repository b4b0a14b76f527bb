use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::{EvidenceItem, InstitutionProfile, Standard};
use crate::providers::{AgentRole, GenerationRequest, LlmClient};

use super::prompt::{build_narrator_prompt, NARRATOR_SYSTEM_PROMPT};
use super::sanitize::{extract_json_block, sanitize_llm_output};
use super::types::{Citation, Mapping, Narrative, NarratorReport};
use super::PipelineError;

const AGENT: &str = "narrator";

/// Generates cited narrative prose for every standard with at least one
/// accepted mapping.
///
/// Structured JSON responses are used directly; anything else falls back to
/// the raw text with citations synthesized from the evidence grouping.
/// Transport-level LLM failures abort the stage; parse-shaped problems
/// never do.
pub struct NarratorStage<'a> {
    llm: &'a dyn LlmClient,
    config: &'a PipelineConfig,
}

impl<'a> NarratorStage<'a> {
    pub fn new(llm: &'a dyn LlmClient, config: &'a PipelineConfig) -> Self {
        Self { llm, config }
    }

    pub fn run(
        &self,
        accepted_mappings: &[Mapping],
        evidence: &[EvidenceItem],
        standards: &[Standard],
        institution: &InstitutionProfile,
    ) -> Result<NarratorReport, PipelineError> {
        let evidence_by_id: HashMap<Uuid, &EvidenceItem> =
            evidence.iter().map(|e| (e.id, e)).collect();
        let standards_by_id: HashMap<&str, &Standard> =
            standards.iter().map(|s| (s.id.as_str(), s)).collect();

        // Group evidence per standard: BTreeMap gives a stable standard
        // order; within a group, mapping order with first-occurrence dedup.
        let mut grouped: BTreeMap<&str, Vec<Uuid>> = BTreeMap::new();
        for mapping in accepted_mappings {
            let group = grouped.entry(mapping.standard_id.as_str()).or_default();
            if !group.contains(&mapping.evidence_id) {
                group.push(mapping.evidence_id);
            }
        }

        let mut narratives = Vec::new();

        for (standard_id, evidence_ids) in &grouped {
            let Some(standard) = standards_by_id.get(standard_id) else {
                tracing::warn!(standard_id = %standard_id, "accepted mapping references unknown standard — skipped");
                continue;
            };

            let group: Vec<&EvidenceItem> = evidence_ids
                .iter()
                .filter_map(|id| {
                    let item = evidence_by_id.get(id).copied();
                    if item.is_none() {
                        tracing::warn!(evidence_id = %id, "mapped evidence missing from supplied set — skipped");
                    }
                    item
                })
                .collect();
            if group.is_empty() {
                continue;
            }

            let request = GenerationRequest {
                role: AgentRole::Narrator,
                system: NARRATOR_SYSTEM_PROMPT.to_string(),
                prompt: build_narrator_prompt(standard, &group, institution),
                temperature: self.config.narrator_temperature,
                max_tokens: self.config.max_tokens,
            };

            let completion = self
                .llm
                .generate(&request)
                .map_err(|e| PipelineError::from_provider(AGENT, e))?;

            narratives.push(parse_narrative(
                &completion.content,
                standard,
                &group,
                self.config.target_narrative_words,
            ));
        }

        let confidence = if narratives.is_empty() {
            0.0
        } else {
            narratives.iter().map(|n| n.completeness_score).sum::<f32>() / narratives.len() as f32
        };

        tracing::info!(narratives = narratives.len(), "narration complete");

        Ok(NarratorReport {
            narratives,
            confidence,
        })
    }
}

#[derive(Deserialize)]
struct RawNarrative {
    #[serde(default)]
    title: Option<String>,
    content: String,
    #[serde(default)]
    citations: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    completeness_score: Option<f32>,
}

#[derive(Deserialize)]
struct RawCitation {
    #[serde(default)]
    seq: Option<u32>,
    evidence_id: Uuid,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    page: Option<String>,
}

/// Parse the narrator response; fall back to raw text plus synthesized
/// citations when the structured shape is absent.
fn parse_narrative(
    content: &str,
    standard: &Standard,
    evidence_group: &[&EvidenceItem],
    target_words: usize,
) -> Narrative {
    let cleaned = sanitize_llm_output(content);

    if let Some(json) = extract_json_block(&cleaned) {
        if let Ok(raw) = serde_json::from_str::<RawNarrative>(&json) {
            return structured_narrative(raw, standard, target_words);
        }
        tracing::debug!(standard_id = %standard.id, "narrator JSON did not match schema, using raw text");
    }

    fallback_narrative(cleaned, standard, evidence_group, target_words)
}

fn structured_narrative(raw: RawNarrative, standard: &Standard, target_words: usize) -> Narrative {
    // Lenient per-citation parsing — a bad entry is dropped, not fatal.
    let citations: Vec<Citation> = raw
        .citations
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter_map(|(i, value)| {
            match serde_json::from_value::<RawCitation>(value.clone()) {
                Ok(c) => Some(Citation {
                    seq: c.seq.unwrap_or(i as u32 + 1),
                    evidence_id: c.evidence_id,
                    title: c.title.unwrap_or_default(),
                    excerpt: c.excerpt.unwrap_or_default(),
                    page: c.page,
                }),
                Err(e) => {
                    tracing::warn!(standard_id = %standard.id, error = %e, "unparseable citation — dropped");
                    None
                }
            }
        })
        .collect();

    let word_count = raw.content.split_whitespace().count();
    let completeness_score = raw
        .completeness_score
        .unwrap_or_else(|| default_completeness(word_count, target_words))
        .clamp(0.0, 1.0);

    Narrative {
        // The supplied standard wins over whatever the model echoed back.
        standard_id: standard.id.clone(),
        title: raw.title.unwrap_or_else(|| standard.title.clone()),
        content: raw.content,
        citations,
        word_count,
        completeness_score,
    }
}

/// Raw text becomes the content; citations are synthesized by zipping the
/// evidence grouping order with sequence ids 1..N. Page detail is lost.
fn fallback_narrative(
    content: String,
    standard: &Standard,
    evidence_group: &[&EvidenceItem],
    target_words: usize,
) -> Narrative {
    let citations: Vec<Citation> = evidence_group
        .iter()
        .enumerate()
        .map(|(i, item)| Citation {
            seq: i as u32 + 1,
            evidence_id: item.id,
            title: item.title.clone(),
            excerpt: item.excerpt(200),
            page: None,
        })
        .collect();

    let word_count = content.split_whitespace().count();

    Narrative {
        standard_id: standard.id.clone(),
        title: standard.title.clone(),
        content,
        citations,
        word_count,
        completeness_score: default_completeness(word_count, target_words),
    }
}

fn default_completeness(word_count: usize, target_words: usize) -> f32 {
    if target_words == 0 {
        return 1.0;
    }
    (word_count as f32 / target_words as f32).min(1.0)
}
