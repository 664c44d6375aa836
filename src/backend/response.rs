//! Lenient parsing of model output into [`RawAnalysis`].
//!
//! Accepted shapes, in order: a JSON object with `findings`/`no_issue`, a
//! JSON array of findings, a single finding object, or one JSON object per
//! line. Code fences and surrounding prose are tolerated.

use super::{BackendError, RawAnalysis, RawFinding};
use serde_json::Value;

/// Parse the text content of a model response.
pub fn parse_analysis(content: &str) -> Result<RawAnalysis, BackendError> {
    let body = strip_code_fence(content.trim());

    if body.is_empty() {
        return Err(BackendError::Malformed("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(analysis) = from_value(value) {
            return Ok(analysis);
        }
    }

    if let Some(analysis) = from_json_lines(body) {
        return Ok(analysis);
    }

    // A body that opens as JSON must parse completely.
    if body.starts_with('{') || body.starts_with('[') {
        return Err(BackendError::Malformed(format!(
            "incomplete JSON document: {}",
            preview(body)
        )));
    }

    // Prose around a single JSON document.
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&body[start..=end]) {
                if let Some(analysis) = from_value(value) {
                    return Ok(analysis);
                }
            }
        }
    }

    Err(BackendError::Malformed(format!(
        "no JSON findings in response: {}",
        preview(body)
    )))
}

fn from_value(value: Value) -> Option<RawAnalysis> {
    let is_analysis = value.get("findings").is_some() || value.get("no_issue").is_some();
    let is_finding = value.get("summary").is_some() || value.get("title").is_some();

    if value.is_array() {
        let findings: Vec<RawFinding> = serde_json::from_value(value).ok()?;
        Some(RawAnalysis {
            findings,
            no_issue: Vec::new(),
        })
    } else if is_analysis {
        serde_json::from_value(value).ok()
    } else if is_finding {
        let finding: RawFinding = serde_json::from_value(value).ok()?;
        Some(RawAnalysis {
            findings: vec![finding],
            no_issue: Vec::new(),
        })
    } else {
        None
    }
}

fn from_json_lines(body: &str) -> Option<RawAnalysis> {
    let mut analysis = RawAnalysis::default();
    let mut parsed_any = false;

    for line in body.lines() {
        let line = line.trim().trim_end_matches(',');
        if !line.starts_with('{') && !line.starts_with('[') {
            continue;
        }

        // Every JSON-looking line must stand on its own.
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return None;
        };
        if !value.is_object() {
            return None;
        }

        if let Some(cleared) = value.get("no_issue") {
            match cleared {
                Value::String(id) => analysis.no_issue.push(id.clone()),
                Value::Array(ids) => analysis
                    .no_issue
                    .extend(ids.iter().filter_map(|v| v.as_str().map(String::from))),
                _ => {}
            }
            parsed_any = true;
            continue;
        }

        if let Ok(finding) = serde_json::from_value::<RawFinding>(value) {
            analysis.findings.push(finding);
            parsed_any = true;
        }
    }

    parsed_any.then_some(analysis)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_response() {
        let analysis = parse_analysis(concat!(
            r#"{"findings": [{"severity": "critical", "#,
            r#""summary": "CrashLoopBackOff on payments-api", "#,
            r#""evidence": "Back-off restarting failed container", "#,
            r#""source_ids": ["pods/payments-api.log"]}], "#,
            r#""no_issue": ["pods/redis.log"]}"#,
        ))
        .unwrap();

        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.findings[0].severity, "critical");
        assert_eq!(analysis.no_issue, vec!["pods/redis.log"]);
    }

    #[test]
    fn test_empty_findings_is_valid() {
        let analysis = parse_analysis(r#"{"findings": []}"#).unwrap();
        assert!(analysis.findings.is_empty());
    }

    #[test]
    fn test_fenced_response() {
        let analysis = parse_analysis(
            "```json\n{\"findings\": [{\"summary\": \"ImagePullBackOff\"}]}\n```",
        )
        .unwrap();
        assert_eq!(analysis.findings[0].summary, "ImagePullBackOff");
    }

    #[test]
    fn test_array_response() {
        let analysis =
            parse_analysis(r#"[{"summary": "a"}, {"title": "b", "severity": "warning"}]"#).unwrap();
        assert_eq!(analysis.findings.len(), 2);
        assert_eq!(analysis.findings[1].summary, "b");
    }

    #[test]
    fn test_json_lines_response() {
        let body = r#"Here is what I found:
{"severity": "warning", "summary": "Readiness probe failed", "source_ids": ["events/ns.txt"]}
{"severity": "info", "summary": "Pod rescheduled"}
{"no_issue": "pods/redis.log"}
"#;
        let analysis = parse_analysis(body).unwrap();
        assert_eq!(analysis.findings.len(), 2);
        assert_eq!(analysis.no_issue, vec!["pods/redis.log"]);
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let body = "Sure! {\"findings\": [{\"summary\": \"node NotReady\"}]} Hope this helps.";
        let analysis = parse_analysis(body).unwrap();
        assert_eq!(analysis.findings[0].summary, "node NotReady");
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let body = concat!(
            "{\"findings\": [\n",
            "  {\"severity\": \"critical\", \"summary\": \"OOMKilled\", ",
            "\"source_ids\": [\"pods/a.log\"]},\n",
            "  {\"severity\": \"warning\", \"summary\": \"Readiness fa",
        );
        assert!(matches!(parse_analysis(body), Err(BackendError::Malformed(_))));

        let array = "[\n{\"summary\": \"OOMKilled\"},\n{\"summary\": \"Back";
        assert!(matches!(parse_analysis(array), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn test_json_lines_with_broken_line_is_malformed() {
        let body = "{\"summary\": \"OOMKilled\"}\n{\"summary\": \"ImagePull";
        assert!(matches!(parse_analysis(body), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn test_malformed_response() {
        assert!(matches!(
            parse_analysis("I could not find any problems."),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(parse_analysis("   "), Err(BackendError::Malformed(_))));
        assert!(matches!(
            parse_analysis(r#"{"findings": "#),
            Err(BackendError::Malformed(_))
        ));
    }
}
