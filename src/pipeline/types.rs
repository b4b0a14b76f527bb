use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An asserted evidence→standard relationship with a confidence score.
///
/// Created only by the mapper; `confidence_score` is clamped into [0,1] at
/// the parse boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub evidence_id: Uuid,
    pub standard_id: String,
    pub confidence_score: f32,
    pub reasoning: String,
    #[serde(default)]
    pub excerpts: Vec<String>,
}

/// Partitioned result of a mapper run.
#[derive(Debug, Clone, Serialize)]
pub struct MapperOutcome {
    /// Mappings at or above the acceptance threshold — the working set fed
    /// to the gap finder and narrator.
    pub accepted: Vec<Mapping>,
    /// Mappings in the review band: kept for a human, excluded from the
    /// working set.
    pub needs_review: Vec<Mapping>,
    pub rejected_count: usize,
    pub unmapped_evidence: Vec<Uuid>,
    pub overall_confidence: f32,
}

impl MapperOutcome {
    pub fn empty() -> Self {
        Self {
            accepted: vec![],
            needs_review: vec![],
            rejected_count: 0,
            unmapped_evidence: vec![],
            overall_confidence: 0.0,
        }
    }
}

/// Compliance-risk bucket for a standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapStatus {
    Red,
    Amber,
    Green,
}

impl GapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Amber => "amber",
            Self::Green => "green",
        }
    }

    /// Ordering key for prioritization; higher is worse.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Red => 2,
            Self::Amber => 1,
            Self::Green => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl From<GapStatus> for RiskLevel {
    fn from(status: GapStatus) -> Self {
        match status {
            GapStatus::Red => Self::High,
            GapStatus::Amber => Self::Medium,
            GapStatus::Green => Self::Low,
        }
    }
}

/// Gap classification for one standard. A pure function of the standard and
/// the accepted mapping set; recomputed every round, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapRecord {
    pub standard_id: String,
    pub status: GapStatus,
    pub risk_level: RiskLevel,
    pub current_evidence_count: usize,
    pub required_evidence_types: Vec<String>,
    /// 1-based rank; 1 is the most urgent gap.
    pub priority: usize,
    pub recommendations: Vec<String>,
}

/// Counts per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapSummary {
    pub red: usize,
    pub amber: usize,
    pub green: usize,
}

/// Full gap finder output.
#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    pub gap_summary: GapSummary,
    /// Ordered by priority rank.
    pub detailed_gaps: Vec<GapRecord>,
    /// Advisory prose from the gap-analyst role; absent when generation was
    /// unavailable or there is nothing to remediate.
    pub remediation_plan: Option<String>,
    pub confidence: f32,
}

/// A reference from narrative prose to a source evidence item.
/// Subordinate to its narrative; no independent lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based sequence id, matching the `[n]` marker in the prose.
    pub seq: u32,
    pub evidence_id: Uuid,
    pub title: String,
    pub excerpt: String,
    /// Page marker when the source provided one.
    pub page: Option<String>,
}

/// Generated compliance prose for one standard.
#[derive(Debug, Clone, Serialize)]
pub struct Narrative {
    pub standard_id: String,
    pub title: String,
    pub content: String,
    pub citations: Vec<Citation>,
    pub word_count: usize,
    pub completeness_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NarratorReport {
    pub narratives: Vec<Narrative>,
    /// Mean completeness across narratives; 0.0 when none were produced.
    pub confidence: f32,
}

/// Verification scores for one narrative.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub standard_id: String,
    pub citation_accuracy: f32,
    pub factual_accuracy: f32,
    pub completeness: f32,
    pub overall_score: f32,
    pub issues_found: Vec<String>,
    pub verified: bool,
}

impl VerificationResult {
    /// Derive `overall_score` and `verified` from the sub-scores. The only
    /// place either field is computed.
    pub fn from_scores(
        standard_id: String,
        citation_accuracy: f32,
        factual_accuracy: f32,
        completeness: f32,
        issues_found: Vec<String>,
        citation_threshold: f32,
    ) -> Self {
        let overall_score =
            0.4 * citation_accuracy + 0.3 * factual_accuracy + 0.3 * completeness;
        let verified = overall_score >= citation_threshold && issues_found.is_empty();

        Self {
            standard_id,
            citation_accuracy,
            factual_accuracy,
            completeness,
            overall_score,
            issues_found,
            verified,
        }
    }
}

/// Verifier stage output.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub results: Vec<VerificationResult>,
    pub verified_count: usize,
    pub needs_revision: usize,
    /// Mean overall score; 0.0 when no narratives were verified. Drives
    /// round convergence.
    pub overall_verification_score: f32,
}

/// Uniform envelope every stage returns to the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub success: bool,
    pub payload: Value,
    pub confidence_score: f32,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}

/// One completed (or aborted) round of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRound {
    /// 1-based, strictly increasing, no gaps.
    pub round_number: u32,
    /// Stage envelopes in execution order.
    pub agent_results: Vec<AgentResult>,
    /// Mean stage confidence.
    pub overall_confidence: f32,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Terminal output of a workflow: full round history plus the final
/// snapshot. Callers always receive one of these, even on failure.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub institution_id: Uuid,
    pub accreditor_id: String,
    pub rounds: Vec<PipelineRound>,
    /// Accepted mapping set from the last successful mapper run.
    pub mappings: Vec<Mapping>,
    pub gaps: Vec<GapRecord>,
    pub narratives: Vec<Narrative>,
    pub verification: Option<VerificationReport>,
    pub status: WorkflowStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_formula() {
        let result = VerificationResult::from_scores(
            "ACC-1.A".into(),
            0.9,
            0.85,
            0.8,
            vec![],
            0.85,
        );
        assert!((result.overall_score - 0.855).abs() < 1e-6);
        assert!(result.verified);
    }

    #[test]
    fn issues_block_verification_even_above_threshold() {
        let result = VerificationResult::from_scores(
            "ACC-1.A".into(),
            1.0,
            1.0,
            1.0,
            vec!["Evidence not found: abc".into()],
            0.85,
        );
        assert!((result.overall_score - 1.0).abs() < 1e-6);
        assert!(!result.verified);
    }

    #[test]
    fn below_threshold_not_verified() {
        let result =
            VerificationResult::from_scores("ACC-1.A".into(), 0.5, 0.85, 0.5, vec![], 0.85);
        assert!(!result.verified);
    }

    #[test]
    fn gap_status_severity_ordering() {
        assert!(GapStatus::Red.severity() > GapStatus::Amber.severity());
        assert!(GapStatus::Amber.severity() > GapStatus::Green.severity());
    }

    #[test]
    fn risk_level_follows_status() {
        assert_eq!(RiskLevel::from(GapStatus::Red), RiskLevel::High);
        assert_eq!(RiskLevel::from(GapStatus::Amber), RiskLevel::Medium);
        assert_eq!(RiskLevel::from(GapStatus::Green), RiskLevel::Low);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&GapStatus::Red).unwrap(), "\"red\"");
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn mapping_deserializes_with_default_excerpts() {
        let json = r#"{
            "evidence_id": "550e8400-e29b-41d4-a716-446655440000",
            "standard_id": "ACC-1.A",
            "confidence_score": 0.8,
            "reasoning": "direct match"
        }"#;
        let mapping: Mapping = serde_json::from_str(json).unwrap();
        assert!(mapping.excerpts.is_empty());
    }
}
