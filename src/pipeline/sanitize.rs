//! Post-LLM output sanitization and JSON payload extraction.
//!
//! Strips model artifacts (thinking blocks, stray special tokens) before the
//! stage parsers run.

use std::sync::LazyLock;

use regex::Regex;

/// Strip model-specific artifacts from raw LLM output.
///
/// Handles:
/// 1. `<think>...</think>` reasoning blocks emitted by some local models
/// 2. Stray `<unusedN>` tokenizer tokens
/// 3. Leading/trailing whitespace left behind by stripping
pub fn sanitize_llm_output(raw: &str) -> String {
    static THINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    static UNUSED_TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

    let text = THINK_RE.replace_all(raw, "");
    let text = UNUSED_TOKEN_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Extract the JSON payload from a model response.
///
/// Prefers a ```json fenced block; otherwise takes the span from the first
/// `{` to the last `}`. Returns None when neither shape is present.
pub fn extract_json_block(response: &str) -> Option<String> {
    if let Some(fence_start) = response.find("```json") {
        let content_start = fence_start + 7;
        if let Some(fence_len) = response[content_start..].find("```") {
            return Some(response[content_start..content_start + fence_len].trim().to_string());
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(response[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_think_block() {
        let raw = "<think>Let me reason about this.</think>\n{\"a\": 1}";
        assert_eq!(sanitize_llm_output(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_unused_tokens() {
        let raw = "<unused12>Some content<unused3>";
        assert_eq!(sanitize_llm_output(raw), "Some content");
    }

    #[test]
    fn plain_text_passes_through_trimmed() {
        assert_eq!(sanitize_llm_output("  plain  "), "plain");
    }

    #[test]
    fn extracts_fenced_json() {
        let response = "Here is the result:\n```json\n{\"mappings\": []}\n```\nDone.";
        assert_eq!(extract_json_block(response).unwrap(), "{\"mappings\": []}");
    }

    #[test]
    fn extracts_bare_object() {
        let response = "prefix {\"a\": {\"b\": 2}} suffix";
        assert_eq!(extract_json_block(response).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn no_json_returns_none() {
        assert!(extract_json_block("no structured content here").is_none());
    }

    #[test]
    fn unclosed_fence_falls_back_to_bare_object() {
        let response = "```json\n{\"a\": 1}";
        assert_eq!(extract_json_block(response).unwrap(), "{\"a\": 1}");
    }
}
