//! Role-scoped prompts for the pipeline stages.
//!
//! Each builder embeds the exact JSON skeleton the stage parser expects, so
//! schema drift shows up here first.

use crate::models::{EvidenceItem, InstitutionProfile, Standard};
use crate::providers::AgentRole;

use super::mapper::EvidencePriors;
use super::types::GapRecord;

pub const MAPPER_SYSTEM_PROMPT: &str = r#"
You are an accreditation evidence mapper. Your ONLY role is to map
institutional evidence documents to the accreditation standards they
support.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Map only when the evidence text itself supports the standard.
2. Use ONLY the evidence ids and standard ids listed in the request.
3. Score confidence in [0.0, 1.0]; be conservative, never inflate.
4. Quote supporting excerpts verbatim from the evidence text.
5. List evidence you cannot map under "unmapped_evidence".
6. Output a single valid JSON object and nothing else.
"#;

pub const NARRATOR_SYSTEM_PROMPT: &str = r#"
You are an accreditation narrative writer. You write compliance prose
demonstrating how an institution's evidence satisfies one standard.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Use ONLY the evidence provided; never invent facts or documents.
2. Write 300-500 words of formal compliance prose.
3. Cite evidence inline with bracketed markers [1], [2], ... numbered in
   order of first use.
4. Every factual claim must carry a citation marker.
5. Output a single valid JSON object and nothing else.
"#;

pub const GAP_ANALYST_SYSTEM_PROMPT: &str = r#"
You are an accreditation gap analyst. Given standards that lack sufficient
evidence, you produce a prioritized remediation plan: what evidence to
collect, in what order, and why. Be concrete and concise. Output plain
text, most urgent gap first.
"#;

pub fn system_prompt_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Mapper => MAPPER_SYSTEM_PROMPT,
        AgentRole::Narrator => NARRATOR_SYSTEM_PROMPT,
        AgentRole::GapAnalyst => GAP_ANALYST_SYSTEM_PROMPT,
    }
}

/// Build the mapper batch prompt: institution context, evidence summaries,
/// standard summaries, and the similarity priors.
pub fn build_mapper_prompt(
    institution: &InstitutionProfile,
    evidence: &[EvidenceItem],
    standards: &[Standard],
    priors: &[EvidencePriors],
) -> String {
    let mut evidence_block = String::new();
    for item in evidence {
        evidence_block.push_str(&format!(
            "- id: {} | title: {} | type: {} | keywords: {} | excerpt: {}\n",
            item.id,
            item.title,
            item.evidence_type.as_str(),
            item.keywords.join(", "),
            item.excerpt(300).replace('\n', " "),
        ));
    }

    let mut standards_block = String::new();
    for standard in standards {
        standards_block.push_str(&format!(
            "- id: {} | title: {} | requires: {} | description: {}\n",
            standard.id,
            standard.title,
            standard.required_evidence_types.join(", "),
            standard.description.replace('\n', " "),
        ));
    }

    let mut priors_block = String::new();
    for prior in priors {
        if prior.suggestions.is_empty() {
            continue;
        }
        let suggestions: Vec<String> = prior
            .suggestions
            .iter()
            .map(|s| format!("{} ({:.2})", s.standard_id, s.similarity))
            .collect();
        priors_block.push_str(&format!(
            "- evidence {} resembles: {}\n",
            prior.evidence_id,
            suggestions.join(", ")
        ));
    }
    if priors_block.is_empty() {
        priors_block.push_str("(no similarity priors available)\n");
    }

    format!(
        r#"Institution: {institution}

EVIDENCE:
{evidence_block}
STANDARDS:
{standards_block}
SIMILARITY PRIORS (vector search hints; verify against the text before trusting):
{priors_block}
Map each evidence item to the standards it supports. Respond with exactly
this JSON structure:

```json
{{
  "mappings": [
    {{
      "evidence_id": "uuid of the evidence item",
      "standard_id": "id of the standard",
      "confidence_score": 0.0,
      "reasoning": "why this evidence supports this standard",
      "excerpts": ["verbatim supporting excerpt"]
    }}
  ],
  "unmapped_evidence": ["uuid of any evidence that maps to no standard"],
  "overall_confidence": 0.0
}}
```"#,
        institution = institution.context_line(),
    )
}

/// Build the per-standard narrator prompt from its grouped evidence.
pub fn build_narrator_prompt(
    standard: &Standard,
    evidence_group: &[&EvidenceItem],
    institution: &InstitutionProfile,
) -> String {
    let mut evidence_block = String::new();
    for (i, item) in evidence_group.iter().enumerate() {
        evidence_block.push_str(&format!(
            "[{}] {} ({}):\n{}\n\n",
            i + 1,
            item.title,
            item.evidence_type.as_str(),
            item.excerpt(1200),
        ));
    }

    format!(
        r#"Institution: {institution}

Standard {id}: {title}
{description}

EVIDENCE (cite by bracketed number):
{evidence_block}
Write the compliance narrative for this standard. Respond with exactly this
JSON structure:

```json
{{
  "standard_id": "{id}",
  "title": "narrative title",
  "content": "300-500 words with [1]-style citation markers",
  "citations": [
    {{
      "seq": 1,
      "evidence_id": "uuid of the cited evidence",
      "title": "evidence title",
      "excerpt": "the passage the narrative relies on",
      "page": null
    }}
  ]
}}
```"#,
        institution = institution.context_line(),
        id = standard.id,
        title = standard.title,
        description = standard.description,
    )
}

/// Build the remediation prompt from the open (red/amber) gaps.
pub fn build_remediation_prompt(gaps: &[&GapRecord]) -> String {
    let mut gaps_block = String::new();
    for gap in gaps {
        gaps_block.push_str(&format!(
            "- {} | status: {} | evidence on file: {} | required types: {}\n",
            gap.standard_id,
            gap.status.as_str(),
            gap.current_evidence_count,
            gap.required_evidence_types.join(", "),
        ));
    }

    format!(
        "The following standards lack sufficient evidence:\n\n{gaps_block}\n\
         Produce a prioritized remediation plan."
    )
}
