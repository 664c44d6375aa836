//! Prompt construction for chunk analysis.

use crate::models::Chunk;

/// System prompt shared by all chat backends.
pub const SYSTEM_PROMPT: &str = r#"You are an experienced Kubernetes site reliability engineer.
You receive excerpts of a diagnostic bundle: pod and container logs, event dumps
and `kubectl describe` output.
Identify root causes, anomalies and failures. Only report what the excerpts support.
Respond with a single JSON object and nothing else."#;

const RESPONSE_FORMAT: &str = r#"Respond with JSON in exactly this shape:
{"findings": [{"severity": "critical|warning|info", "summary": "one line",
               "evidence": "verbatim log lines", "source_ids": ["<SOURCE id>"]}],
 "no_issue": ["<SOURCE id>"]}
- Use the SOURCE ids shown in the headers.
- List in "no_issue" every source you inspected and found healthy.
- Use an empty "findings" list when nothing is wrong."#;

/// Render the user prompt for a chunk, labelling every member with its
/// source id so findings can be attributed.
pub fn build_user_prompt(chunk: &Chunk) -> String {
    let mut prompt = String::with_capacity(chunk.text.len() + 1024);

    prompt.push_str(RESPONSE_FORMAT);
    prompt.push_str("\n\n=== BUNDLE EXCERPT ===\n\n");

    for member in &chunk.members {
        prompt.push_str(&format!(
            "### SOURCE: {} (kind: {}",
            member.source_id, member.source_kind
        ));
        if let Some(part) = member.part {
            prompt.push_str(&format!(", part {}/{}", part.index + 1, part.total));
        }
        prompt.push_str(")\n```\n");

        let text = chunk.member_text(member);
        prompt.push_str(text);
        if !text.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n\n");
    }

    prompt.push_str("=== END OF EXCERPT ===\n\nNow output the JSON object:");
    prompt
}
