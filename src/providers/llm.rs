use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Role a generation request is issued under.
///
/// Each role carries its own system prompt and sampling defaults; the
/// backend itself is role-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Mapper,
    GapAnalyst,
    Narrator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mapper => "mapper",
            Self::GapAnalyst => "gap_analyst",
            Self::Narrator => "narrator",
        }
    }
}

/// A role-scoped prompt ready for the model.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub role: AgentRole,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Generated text plus usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub finish_reason: String,
}

/// LLM text generation capability.
///
/// Implementations must be safe for concurrent callers; independent
/// workflow runs share one client.
pub trait LlmClient: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError>;

    /// Whether the backend can currently serve requests. Checked before a
    /// workflow starts.
    fn is_available(&self) -> bool;
}

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::MalformedResponse {
                service: "llm",
                detail: format!("HTTP client construction failed: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local(model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::new("http://localhost:11434", model, timeout_secs)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() {
                ProviderError::Connection {
                    service: "llm",
                    url: self.base_url.clone(),
                }
            } else if e.is_timeout() {
                ProviderError::Timeout {
                    service: "llm",
                    secs: self.timeout_secs,
                }
            } else {
                ProviderError::MalformedResponse {
                    service: "llm",
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                service: "llm",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse =
            response
                .json()
                .map_err(|e| ProviderError::MalformedResponse {
                    service: "llm",
                    detail: e.to_string(),
                })?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    service: "llm",
                    secs: self.timeout_secs,
                }
            } else if e.is_connect() {
                ProviderError::Connection {
                    service: "llm",
                    url: self.base_url.clone(),
                }
            } else {
                ProviderError::MalformedResponse {
                    service: "llm",
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                service: "llm",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse =
            response
                .json()
                .map_err(|e| ProviderError::MalformedResponse {
                    service: "llm",
                    detail: e.to_string(),
                })?;

        if parsed.response.trim().is_empty() {
            return Err(ProviderError::MalformedResponse {
                service: "llm",
                detail: format!("empty completion for role {}", request.role.as_str()),
            });
        }

        Ok(Completion {
            content: parsed.response,
            prompt_tokens: parsed.prompt_eval_count.unwrap_or(0),
            completion_tokens: parsed.eval_count.unwrap_or(0),
            finish_reason: parsed.done_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    fn is_available(&self) -> bool {
        match self.list_models() {
            Ok(models) => models.iter().any(|m| m.starts_with(&self.model)),
            Err(e) => {
                tracing::debug!(error = %e, "LLM availability check failed");
                false
            }
        }
    }
}

/// Deterministic mock LLM for tests — canned response per role.
///
/// Roles without a configured response get an empty completion, which
/// downstream parsers treat as a fallback-shaped (not failed) output.
pub struct MockLlmClient {
    responses: HashMap<AgentRole, String>,
    failures: HashMap<AgentRole, MockLlmFailure>,
    latency_ms: u64,
    available: bool,
}

/// Failure mode a mock can be armed with for a given role.
#[derive(Debug, Clone, Copy)]
pub enum MockLlmFailure {
    Timeout,
    Empty,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            failures: HashMap::new(),
            latency_ms: 0,
            available: true,
        }
    }

    /// A client whose availability check fails.
    pub fn unavailable() -> Self {
        let mut client = Self::new();
        client.available = false;
        client
    }

    pub fn with_response(mut self, role: AgentRole, response: &str) -> Self {
        self.responses.insert(role, response.to_string());
        self
    }

    pub fn with_failure(mut self, role: AgentRole, failure: MockLlmFailure) -> Self {
        self.failures.insert(role, failure);
        self
    }

    /// Simulated per-call latency, for cancellation tests.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        if self.latency_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.latency_ms));
        }

        if let Some(failure) = self.failures.get(&request.role) {
            return Err(match failure {
                MockLlmFailure::Timeout => ProviderError::Timeout {
                    service: "llm",
                    secs: 0,
                },
                MockLlmFailure::Empty => ProviderError::MalformedResponse {
                    service: "llm",
                    detail: format!("empty completion for role {}", request.role.as_str()),
                },
            });
        }

        let content = self.responses.get(&request.role).cloned().unwrap_or_default();
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(Completion {
            content,
            prompt_tokens: request.prompt.split_whitespace().count() as u32,
            completion_tokens,
            finish_reason: "stop".to_string(),
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(role: AgentRole) -> GenerationRequest {
        GenerationRequest {
            role,
            system: "system".into(),
            prompt: "prompt text here".into(),
            temperature: 0.1,
            max_tokens: 128,
        }
    }

    #[test]
    fn mock_returns_role_response() {
        let client = MockLlmClient::new().with_response(AgentRole::Mapper, "mapped");
        let completion = client.generate(&make_request(AgentRole::Mapper)).unwrap();
        assert_eq!(completion.content, "mapped");
        assert_eq!(completion.finish_reason, "stop");
    }

    #[test]
    fn mock_unconfigured_role_returns_empty_content() {
        let client = MockLlmClient::new();
        let completion = client.generate(&make_request(AgentRole::Narrator)).unwrap();
        assert!(completion.content.is_empty());
    }

    #[test]
    fn mock_timeout_failure_is_distinguishable() {
        let client = MockLlmClient::new().with_failure(AgentRole::Mapper, MockLlmFailure::Timeout);
        let err = client.generate(&make_request(AgentRole::Mapper)).unwrap_err();
        assert!(err.is_timeout());
        // Other roles unaffected
        assert!(client.generate(&make_request(AgentRole::Narrator)).is_ok());
    }

    #[test]
    fn mock_availability_flag() {
        assert!(MockLlmClient::new().is_available());
        assert!(!MockLlmClient::unavailable().is_available());
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3:8b", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model(), "llama3:8b");
    }

    #[test]
    fn role_names_are_stable() {
        assert_eq!(AgentRole::Mapper.as_str(), "mapper");
        assert_eq!(AgentRole::GapAnalyst.as_str(), "gap_analyst");
        assert_eq!(AgentRole::Narrator.as_str(), "narrator");
    }
}
