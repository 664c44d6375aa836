//! Markdown and JSON report generation.
//!
//! The Markdown report always states coverage, lists unanalyzed chunks and
//! skipped bundle entries, so an incomplete analysis is never mistaken for a
//! clean bill of health.

use crate::models::{AggregatedReport, Finding, Report, ReportMetadata, Severity};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# k-log Diagnostic Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.analysis));
    output.push_str(&generate_completeness_section(report));
    output.push_str(&generate_findings_section(&report.analysis.findings));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Bundle:** `{}`\n", metadata.bundle));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Log Units Ingested:** {}\n",
        metadata.units_ingested
    ));
    if !metadata.skipped_entries.is_empty() {
        section.push_str(&format!(
            "- **Entries Skipped:** {}\n",
            metadata.skipped_entries.len()
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(analysis: &AggregatedReport) -> String {
    let mut section = String::new();
    let summary = &analysis.summary;

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| {} Critical | {} Warning | {} Info | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::Warning.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.warning, summary.info, summary.total
    ));

    section.push_str(&format!(
        "- **Coverage:** {:.1}% of {} log units\n",
        analysis.coverage * 100.0,
        analysis.total_units
    ));
    section.push_str(&format!(
        "- **Chunks Analyzed:** {} of {}\n",
        analysis.total_chunks - analysis.unanalyzed_chunks.len(),
        analysis.total_chunks
    ));
    if analysis.ambiguous_pairs > 0 {
        section.push_str(&format!(
            "- **Near-duplicate pairs kept separate:** {}\n",
            analysis.ambiguous_pairs
        ));
    }
    section.push('\n');

    section
}

/// Unanalyzed chunks and skipped entries.
fn generate_completeness_section(report: &Report) -> String {
    let mut section = String::new();
    let analysis = &report.analysis;

    section.push_str("## Completeness\n\n");

    if analysis.unanalyzed_chunks.is_empty() {
        section.push_str("All chunks were analyzed.\n\n");
    } else {
        let chunk_list: Vec<String> = analysis
            .unanalyzed_chunks
            .iter()
            .map(|c| c.to_string())
            .collect();
        section.push_str(&format!(
            "⚠️ **{} chunk(s) could not be analyzed:** {}\n\n",
            analysis.unanalyzed_chunks.len(),
            chunk_list.join(", ")
        ));
        section.push_str(
            "Findings below do not cover the content of these chunks. Rerun with a longer \
             timeout or more retries to analyze them.\n\n",
        );
    }

    let skipped = &report.metadata.skipped_entries;
    if !skipped.is_empty() {
        section.push_str("### Skipped Bundle Entries\n\n");
        section.push_str("| Entry | Reason |\n");
        section.push_str("|:---|:---|\n");
        for entry in skipped {
            section.push_str(&format!("| `{}` | {} |\n", entry.path, entry.reason));
        }
        section.push('\n');
    }

    section
}

fn generate_findings_section(findings: &[Finding]) -> String {
    let mut section = String::new();

    section.push_str("## Findings\n\n");

    if findings.is_empty() {
        section.push_str("No findings were reported for the analyzed content.\n\n");
        return section;
    }

    for (rank, finding) in findings.iter().enumerate() {
        section.push_str(&generate_finding_block(rank + 1, finding));
    }

    section
}

fn generate_finding_block(rank: usize, finding: &Finding) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {}. {} **{}** {}\n\n",
        rank,
        finding.severity.emoji(),
        finding.severity.to_string().to_uppercase(),
        finding.summary
    ));

    let sources: Vec<String> = finding
        .source_ids
        .iter()
        .map(|s| format!("`{}`", s))
        .collect();
    if sources.is_empty() {
        block.push_str("**Sources:** unattributed\n\n");
    } else {
        block.push_str(&format!("**Sources:** {}\n\n", sources.join(", ")));
    }

    block.push_str(&format!(
        "*First seen in chunk {} | Id: {} | Occurrences: {}*\n\n",
        finding.chunk_origin, finding.finding_id, finding.occurrences
    ));

    if !finding.evidence.is_empty() {
        block.push_str("<details>\n<summary>Evidence</summary>\n\n```\n");
        block.push_str(&finding.evidence);
        block.push_str("\n```\n</details>\n\n");
    }

    block.push_str("---\n\n");

    block
}

fn generate_footer() -> String {
    format!(
        "*Report generated by k-log v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FindingId, SeveritySummary, SkippedEntry};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn create_test_report() -> Report {
        let findings = vec![Finding {
            finding_id: FindingId { chunk: 0, seq: 0 },
            severity: Severity::Critical,
            source_ids: BTreeSet::from(["pods/a.log".to_string(), "pods/b.log".to_string()]),
            summary: "CrashLoopBackOff on payments-api".to_string(),
            evidence: "Back-off restarting failed container".to_string(),
            chunk_origin: 0,
            occurrences: 2,
        }];

        Report {
            metadata: ReportMetadata {
                bundle: "./bundle.tgz".to_string(),
                analysis_date: Utc::now(),
                model_used: "ollama/llama3.2:latest".to_string(),
                units_ingested: 4,
                skipped_entries: vec![SkippedEntry {
                    path: "pods/broken.log.gz".to_string(),
                    reason: "invalid gzip header".to_string(),
                }],
                duration_seconds: 12.5,
            },
            analysis: AggregatedReport {
                summary: SeveritySummary::from_findings(&findings),
                findings,
                unanalyzed_chunks: BTreeSet::from([2]),
                coverage: 0.75,
                total_units: 4,
                total_chunks: 3,
                ambiguous_pairs: 1,
            },
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# k-log Diagnostic Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("**Coverage:** 75.0% of 4 log units"));
        assert!(markdown.contains("**Chunks Analyzed:** 2 of 3"));
        assert!(markdown.contains("could not be analyzed:** 2"));
        assert!(markdown.contains("`pods/broken.log.gz` | invalid gzip header"));
        assert!(markdown.contains("**CRITICAL** CrashLoopBackOff on payments-api"));
        assert!(markdown.contains("`pods/a.log`, `pods/b.log`"));
    }

    #[test]
    fn test_clean_report_states_coverage() {
        let mut report = create_test_report();
        report.analysis.findings.clear();
        report.analysis.summary = SeveritySummary::default();
        report.analysis.unanalyzed_chunks.clear();
        report.metadata.skipped_entries.clear();

        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("All chunks were analyzed."));
        assert!(markdown.contains("No findings were reported"));
        assert!(markdown.contains("**Coverage:**"));
        assert!(!markdown.contains("Skipped Bundle Entries"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["analysis"]["coverage"], 0.75);
        assert_eq!(value["analysis"]["unanalyzed_chunks"][0], 2);
        assert_eq!(value["analysis"]["findings"][0]["finding_id"]["chunk"], 0);
        assert_eq!(value["metadata"]["skipped_entries"][0]["path"], "pods/broken.log.gz");
    }
}
