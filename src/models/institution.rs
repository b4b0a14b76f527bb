use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::InstitutionType;

/// Institution context fed to the mapper and narrator prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionProfile {
    pub id: Uuid,
    pub name: String,
    pub institution_type: InstitutionType,
    pub state: Option<String>,
}

impl InstitutionProfile {
    /// One-line description for prompt headers.
    pub fn context_line(&self) -> String {
        match &self.state {
            Some(state) => format!(
                "{} ({}, {})",
                self.name,
                self.institution_type.as_str(),
                state
            ),
            None => format!("{} ({})", self.name, self.institution_type.as_str()),
        }
    }
}
