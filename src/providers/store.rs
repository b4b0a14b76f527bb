use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::ProviderError;
use crate::models::{EvidenceItem, InstitutionType, Standard};

/// Read-only access to an institution's evidence set.
///
/// Ingestion, extraction and persistence live upstream; the pipeline only
/// reads.
pub trait EvidenceStore: Send + Sync {
    fn get(&self, institution_id: Uuid) -> Result<Vec<EvidenceItem>, ProviderError>;
}

/// Read-only access to an accreditor's published standards.
pub trait StandardsCatalog: Send + Sync {
    fn get(
        &self,
        accreditor_id: &str,
        institution_type: InstitutionType,
    ) -> Result<Vec<Standard>, ProviderError>;
}

/// In-memory evidence store keyed by institution.
pub struct InMemoryEvidenceStore {
    items: Mutex<HashMap<Uuid, Vec<EvidenceItem>>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, institution_id: Uuid, item: EvidenceItem) {
        self.items
            .lock()
            .unwrap()
            .entry(institution_id)
            .or_default()
            .push(item);
    }
}

impl Default for InMemoryEvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn get(&self, institution_id: Uuid) -> Result<Vec<EvidenceItem>, ProviderError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&institution_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory standards catalog.
pub struct InMemoryStandardsCatalog {
    standards: Mutex<Vec<Standard>>,
}

impl InMemoryStandardsCatalog {
    pub fn new() -> Self {
        Self {
            standards: Mutex::new(Vec::new()),
        }
    }

    pub fn with_standards(standards: Vec<Standard>) -> Self {
        Self {
            standards: Mutex::new(standards),
        }
    }

    pub fn add(&self, standard: Standard) {
        self.standards.lock().unwrap().push(standard);
    }
}

impl Default for InMemoryStandardsCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardsCatalog for InMemoryStandardsCatalog {
    fn get(
        &self,
        accreditor_id: &str,
        institution_type: InstitutionType,
    ) -> Result<Vec<Standard>, ProviderError> {
        Ok(self
            .standards
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.accreditor_id == accreditor_id && s.applies_to(institution_type))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceType;
    use chrono::Utc;

    fn make_standard(id: &str, accreditor_id: &str, applicable: Vec<InstitutionType>) -> Standard {
        Standard {
            id: id.into(),
            accreditor_id: accreditor_id.into(),
            title: format!("Standard {id}"),
            description: "desc".into(),
            required_evidence_types: vec![],
            applicable_institution_types: applicable,
            weight: 1.0,
        }
    }

    #[test]
    fn catalog_filters_by_accreditor() {
        let catalog = InMemoryStandardsCatalog::new();
        catalog.add(make_standard("A-1", "acc-a", vec![]));
        catalog.add(make_standard("B-1", "acc-b", vec![]));

        let standards = catalog.get("acc-a", InstitutionType::University).unwrap();
        assert_eq!(standards.len(), 1);
        assert_eq!(standards[0].id, "A-1");
    }

    #[test]
    fn catalog_filters_by_institution_type() {
        let catalog = InMemoryStandardsCatalog::new();
        catalog.add(make_standard("A-1", "acc-a", vec![InstitutionType::University]));
        catalog.add(make_standard(
            "A-2",
            "acc-a",
            vec![InstitutionType::CommunityCollege],
        ));

        let standards = catalog
            .get("acc-a", InstitutionType::CommunityCollege)
            .unwrap();
        assert_eq!(standards.len(), 1);
        assert_eq!(standards[0].id, "A-2");
    }

    #[test]
    fn evidence_store_isolates_institutions() {
        let store = InMemoryEvidenceStore::new();
        let inst_a = Uuid::new_v4();
        let inst_b = Uuid::new_v4();

        store.add(
            inst_a,
            EvidenceItem {
                id: Uuid::new_v4(),
                title: "Policy".into(),
                evidence_type: EvidenceType::Policy,
                text: "text".into(),
                keywords: vec![],
                embedding: None,
                uploaded_at: Utc::now(),
            },
        );

        assert_eq!(store.get(inst_a).unwrap().len(), 1);
        assert!(store.get(inst_b).unwrap().is_empty());
    }
}
