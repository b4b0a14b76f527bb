use std::collections::HashSet;

use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::Standard;
use crate::providers::{AgentRole, GenerationRequest, LlmClient};

use super::prompt::{build_remediation_prompt, GAP_ANALYST_SYSTEM_PROMPT};
use super::sanitize::sanitize_llm_output;
use super::types::{GapRecord, GapReport, GapStatus, GapSummary, Mapping, RiskLevel};
use super::PipelineError;

/// Classifies every standard into a compliance-risk bucket from the
/// accepted mapping set.
///
/// Classification is pure computation; the remediation plan is the only
/// LLM involvement and is advisory — its failure never fails the stage.
pub struct GapFinderStage<'a> {
    llm: &'a dyn LlmClient,
    config: &'a PipelineConfig,
}

impl<'a> GapFinderStage<'a> {
    pub fn new(llm: &'a dyn LlmClient, config: &'a PipelineConfig) -> Self {
        Self { llm, config }
    }

    pub fn run(
        &self,
        standards: &[Standard],
        accepted_mappings: &[Mapping],
    ) -> Result<GapReport, PipelineError> {
        let detailed_gaps = classify_gaps(
            standards,
            accepted_mappings,
            self.config.sufficiency_min_evidence,
        );
        let gap_summary = summarize(&detailed_gaps);

        // Completeness proxy, not a statistical confidence.
        let confidence = if standards.is_empty() {
            0.5
        } else {
            (detailed_gaps.len() as f32 / standards.len() as f32 + 0.5).min(0.95)
        };

        let remediation_plan = self.remediation_plan(&detailed_gaps);

        tracing::info!(
            red = gap_summary.red,
            amber = gap_summary.amber,
            green = gap_summary.green,
            "gap classification complete"
        );

        Ok(GapReport {
            gap_summary,
            detailed_gaps,
            remediation_plan,
            confidence,
        })
    }

    /// Best-effort remediation prose for the open gaps.
    fn remediation_plan(&self, gaps: &[GapRecord]) -> Option<String> {
        let open: Vec<&GapRecord> = gaps
            .iter()
            .filter(|g| g.status != GapStatus::Green)
            .collect();
        if open.is_empty() {
            return None;
        }

        let request = GenerationRequest {
            role: AgentRole::GapAnalyst,
            system: GAP_ANALYST_SYSTEM_PROMPT.to_string(),
            prompt: build_remediation_prompt(&open),
            temperature: 0.3,
            max_tokens: self.config.max_tokens,
        };

        match self.llm.generate(&request) {
            Ok(completion) => {
                let plan = sanitize_llm_output(&completion.content);
                if plan.is_empty() {
                    None
                } else {
                    Some(plan)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "remediation generation failed, omitting plan");
                None
            }
        }
    }
}

/// Classify every standard against the accepted mapping set.
///
/// Deterministic: a fixed (standards, mappings) pair always produces the
/// same records. `current_evidence_count` counts distinct evidence items.
pub fn classify_gaps(
    standards: &[Standard],
    accepted_mappings: &[Mapping],
    sufficiency_min_evidence: usize,
) -> Vec<GapRecord> {
    let mut records: Vec<GapRecord> = standards
        .iter()
        .map(|standard| {
            let evidence_ids: HashSet<Uuid> = accepted_mappings
                .iter()
                .filter(|m| m.standard_id == standard.id)
                .map(|m| m.evidence_id)
                .collect();
            let count = evidence_ids.len();

            let status = if count == 0 {
                GapStatus::Red
            } else if count < sufficiency_min_evidence {
                GapStatus::Amber
            } else {
                GapStatus::Green
            };

            GapRecord {
                standard_id: standard.id.clone(),
                status,
                risk_level: RiskLevel::from(status),
                current_evidence_count: count,
                required_evidence_types: standard.required_evidence_types.clone(),
                priority: 0, // assigned below after ordering
                recommendations: recommendations_for(standard, status, count, sufficiency_min_evidence),
            }
        })
        .collect();

    // Worst first: severity, then standard weight, then id for stability.
    let weight_of = |id: &str| {
        standards
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.weight)
            .unwrap_or(1.0)
    };
    records.sort_by(|a, b| {
        b.status
            .severity()
            .cmp(&a.status.severity())
            .then(
                weight_of(&b.standard_id)
                    .partial_cmp(&weight_of(&a.standard_id))
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.standard_id.cmp(&b.standard_id))
    });

    for (i, record) in records.iter_mut().enumerate() {
        record.priority = i + 1;
    }

    records
}

fn recommendations_for(
    standard: &Standard,
    status: GapStatus,
    count: usize,
    sufficiency_min_evidence: usize,
) -> Vec<String> {
    match status {
        GapStatus::Green => vec![],
        GapStatus::Red => {
            let mut recs = vec![format!(
                "No evidence is currently mapped to {}; collect and map supporting documents.",
                standard.id
            )];
            for required in &standard.required_evidence_types {
                recs.push(format!("Provide {required} evidence for {}.", standard.id));
            }
            recs
        }
        GapStatus::Amber => vec![format!(
            "Only {count} evidence item(s) mapped to {}; add at least {} more independent source(s).",
            standard.id,
            sufficiency_min_evidence - count
        )],
    }
}

fn summarize(gaps: &[GapRecord]) -> GapSummary {
    let mut summary = GapSummary::default();
    for gap in gaps {
        match gap.status {
            GapStatus::Red => summary.red += 1,
            GapStatus::Amber => summary.amber += 1,
            GapStatus::Green => summary.green += 1,
        }
    }
    summary
}
