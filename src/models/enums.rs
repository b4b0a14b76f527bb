use serde::{Deserialize, Serialize};

/// Kind of evidence artifact an institution can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Policy,
    Report,
    MeetingMinutes,
    Syllabus,
    Survey,
    Handbook,
    Assessment,
    Other,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Report => "report",
            Self::MeetingMinutes => "meeting_minutes",
            Self::Syllabus => "syllabus",
            Self::Survey => "survey",
            Self::Handbook => "handbook",
            Self::Assessment => "assessment",
            Self::Other => "other",
        }
    }
}

/// Institution category; standards declare which categories they apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    University,
    College,
    CommunityCollege,
    TechnicalInstitute,
    Specialized,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::University => "university",
            Self::College => "college",
            Self::CommunityCollege => "community_college",
            Self::TechnicalInstitute => "technical_institute",
            Self::Specialized => "specialized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_type_serializes_snake_case() {
        let json = serde_json::to_string(&EvidenceType::MeetingMinutes).unwrap();
        assert_eq!(json, "\"meeting_minutes\"");
    }

    #[test]
    fn institution_type_round_trips() {
        let parsed: InstitutionType = serde_json::from_str("\"community_college\"").unwrap();
        assert_eq!(parsed, InstitutionType::CommunityCollege);
        assert_eq!(parsed.as_str(), "community_college");
    }
}
