use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "Credence";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "info,credence=debug".to_string()
}

/// Tunable thresholds and limits for a pipeline run.
///
/// Every value has a documented default; construct with `Default::default()`
/// and override individual fields. The config is serialized into diagnostic
/// dumps, so field names are stable.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Minimum mapping confidence for the accepted set.
    pub mapping_acceptance_threshold: f32,
    /// Lower bound of the needs-review band. Mappings scoring in
    /// `[review_floor, mapping_acceptance_threshold)` are retained for
    /// human review; anything below is rejected outright.
    pub review_floor: f32,
    /// Minimum cosine similarity for a standard suggestion.
    pub similarity_floor: f32,
    /// Suggestions requested per evidence item.
    pub similarity_top_k: usize,
    /// Minimum verification score for a narrative to count as verified,
    /// and for a round to converge.
    pub citation_threshold: f32,
    /// Distinct accepted evidence items below which a standard is AMBER.
    pub sufficiency_min_evidence: usize,
    /// Word count at which a narrative scores full completeness.
    pub target_narrative_words: usize,
    /// Sampling temperature for the mapper role.
    pub mapper_temperature: f32,
    /// Sampling temperature for the narrator role. Low: cited prose must
    /// stay close to the evidence.
    pub narrator_temperature: f32,
    /// Token budget per generation request.
    pub max_tokens: u32,
    /// Rounds to run when the caller passes 0.
    pub default_max_rounds: u32,
    /// HTTP timeout for LLM and embedding calls.
    pub llm_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mapping_acceptance_threshold: 0.7,
            review_floor: 0.4,
            similarity_floor: 0.7,
            similarity_top_k: 5,
            citation_threshold: 0.85,
            sufficiency_min_evidence: 2,
            target_narrative_words: 400,
            mapper_temperature: 0.1,
            narrator_temperature: 0.2,
            max_tokens: 2048,
            default_max_rounds: 3,
            llm_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let config = PipelineConfig::default();
        assert!((config.mapping_acceptance_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.review_floor - 0.4).abs() < f32::EPSILON);
        assert!((config.citation_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.sufficiency_min_evidence, 2);
        assert_eq!(config.target_narrative_words, 400);
    }

    #[test]
    fn review_band_sits_below_acceptance() {
        let config = PipelineConfig::default();
        assert!(config.review_floor < config.mapping_acceptance_threshold);
    }

    #[test]
    fn app_name_is_credence() {
        assert_eq!(APP_NAME, "Credence");
    }

    #[test]
    fn config_serializes() {
        let json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        assert!(json.contains("\"citation_threshold\":0.85"));
    }
}
