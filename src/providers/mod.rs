pub mod embedding;
pub mod llm;
pub mod store;
pub mod vector;

pub use embedding::*;
pub use llm::*;
pub use store::*;
pub use vector::*;

use thiserror::Error;

/// Errors surfaced by external capabilities (LLM, embeddings, vector index,
/// evidence/standards stores). Timeouts stay distinguishable from malformed
/// responses so the pipeline can report them separately.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("cannot reach {service} at {url}")]
    Connection { service: &'static str, url: String },

    #[error("{service} request timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} returned error (status {status}): {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {service} response: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("no {0} backend available")]
    Unavailable(&'static str),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}
