use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::EvidenceType;

/// A document or data artifact offered in support of one or more standards.
///
/// Owned by the external evidence store; immutable for the duration of a
/// pipeline run. `text` is the already-extracted full text — extraction
/// itself happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: Uuid,
    pub title: String,
    pub evidence_type: EvidenceType,
    pub text: String,
    pub keywords: Vec<String>,
    /// Precomputed embedding, when the ingest path already produced one.
    /// The matcher reuses it instead of re-embedding.
    pub embedding: Option<Vec<f32>>,
    pub uploaded_at: DateTime<Utc>,
}

impl EvidenceItem {
    /// Leading excerpt of the extracted text, capped at `max_chars`.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(text: &str) -> EvidenceItem {
        EvidenceItem {
            id: Uuid::new_v4(),
            title: "Faculty Handbook".into(),
            evidence_type: EvidenceType::Handbook,
            text: text.into(),
            keywords: vec!["faculty".into()],
            embedding: None,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let item = make_item(&"a".repeat(500));
        assert_eq!(item.excerpt(200).len(), 200);
    }

    #[test]
    fn excerpt_keeps_short_text_whole() {
        let item = make_item("short text");
        assert_eq!(item.excerpt(200), "short text");
    }
}
