use serde::{Deserialize, Serialize};

use super::enums::InstitutionType;

/// One compliance requirement published by an accreditor.
///
/// `id` is the accreditor-assigned code (e.g. "HLC-3.A"), not a synthetic
/// key. Immutable during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standard {
    pub id: String,
    pub accreditor_id: String,
    pub title: String,
    pub description: String,
    /// Evidence-requirement tags, e.g. "policy", "assessment".
    #[serde(default)]
    pub required_evidence_types: Vec<String>,
    /// Empty means the standard applies to every institution type.
    #[serde(default)]
    pub applicable_institution_types: Vec<InstitutionType>,
    /// Relative weight for prioritization.
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Standard {
    pub fn applies_to(&self, institution_type: InstitutionType) -> bool {
        self.applicable_institution_types.is_empty()
            || self.applicable_institution_types.contains(&institution_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_standard(applicable: Vec<InstitutionType>) -> Standard {
        Standard {
            id: "ACC-1.A".into(),
            accreditor_id: "acc-1".into(),
            title: "Mission".into(),
            description: "The institution's mission is clear.".into(),
            required_evidence_types: vec!["policy".into()],
            applicable_institution_types: applicable,
            weight: 1.0,
        }
    }

    #[test]
    fn empty_applicability_matches_all() {
        let standard = make_standard(vec![]);
        assert!(standard.applies_to(InstitutionType::University));
        assert!(standard.applies_to(InstitutionType::Specialized));
    }

    #[test]
    fn scoped_applicability_filters() {
        let standard = make_standard(vec![InstitutionType::CommunityCollege]);
        assert!(standard.applies_to(InstitutionType::CommunityCollege));
        assert!(!standard.applies_to(InstitutionType::University));
    }

    #[test]
    fn weight_defaults_to_one() {
        let json = r#"{
            "id": "ACC-1.B",
            "accreditor_id": "acc-1",
            "title": "Integrity",
            "description": "Acts with integrity."
        }"#;
        let standard: Standard = serde_json::from_str(json).unwrap();
        assert!((standard.weight - 1.0).abs() < f32::EPSILON);
        assert!(standard.required_evidence_types.is_empty());
    }
}
