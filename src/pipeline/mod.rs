pub mod gapfinder;
pub mod mapper;
pub mod matcher;
pub mod narrator;
pub mod orchestrator;
pub mod prompt;
pub mod sanitize;
pub mod types;
pub mod verifier;

pub use gapfinder::*;
pub use mapper::*;
pub use matcher::*;
pub use narrator::*;
pub use orchestrator::*;
pub use sanitize::*;
pub use types::*;
pub use verifier::*;

use thiserror::Error;

use crate::providers::ProviderError;

/// Cross-cutting pipeline failures. These abort the current round.
///
/// Stage-internal issues (a citation that does not resolve, a low-confidence
/// mapping) are recorded as data on the stage outputs and never raised.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{agent} returned output that does not match its schema: {detail}")]
    MalformedAgentOutput { agent: &'static str, detail: String },

    #[error("{agent} upstream call timed out: {detail}")]
    UpstreamTimeout { agent: &'static str, detail: String },

    #[error("required capability unavailable: {0}")]
    MissingCapability(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl PipelineError {
    /// Classify a provider failure for the given agent, keeping timeouts
    /// and malformed responses distinguishable in the round history.
    pub fn from_provider(agent: &'static str, err: ProviderError) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout {
                agent,
                detail: err.to_string(),
            }
        } else if err.is_malformed() {
            Self::MalformedAgentOutput {
                agent,
                detail: err.to_string(),
            }
        } else {
            Self::Provider(err)
        }
    }
}
