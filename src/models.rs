//! Data models for the log analysis pipeline.
//!
//! This module contains the values handed from stage to stage: log units
//! produced by ingestion, chunks produced by the chunker, findings produced
//! by the orchestrator and the aggregated report.

use crate::error::ChunkAnalysisFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational observation, no action required
    Info,
    /// Degraded behaviour that may lead to an outage
    Warning,
    /// Failure that is likely a root cause
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🔵",
            Severity::Warning => "🟡",
            Severity::Critical => "🔴",
        }
    }

    /// Maps a free-form severity label from a model response.
    ///
    /// Unknown labels fall back to `Info` and are logged.
    pub fn from_label(label: &str) -> Self {
        Self::known_label(label).unwrap_or_else(|| {
            debug!("Unknown severity label {:?}, treating as info", label);
            Severity::Info
        })
    }

    fn known_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "critical" | "crit" | "fatal" | "error" | "err" | "high" | "severe" | "emergency"
            | "alert" => Some(Severity::Critical),
            "warning" | "warn" | "medium" | "moderate" => Some(Severity::Warning),
            "info" | "informational" | "low" | "notice" | "debug" | "" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// Where a log unit came from inside the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pod,
    Event,
    Describe,
    Other,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Pod => write!(f, "pod"),
            SourceKind::Event => write!(f, "event"),
            SourceKind::Describe => write!(f, "describe"),
            SourceKind::Other => write!(f, "other"),
        }
    }
}

/// One classified file of the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUnit {
    /// Classification of the source.
    pub source_kind: SourceKind,
    /// Path of the entry relative to the bundle root, `/`-separated.
    pub source_id: String,
    /// Position of the entry in the bundle (0-based).
    pub ordinal: usize,
    /// Normalized text content.
    pub raw_text: String,
}

/// A bundle entry that could not be turned into a log unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Position of a fragment within a unit that was split across chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// 0-based index of this fragment.
    pub index: usize,
    /// Total number of fragments the unit was split into.
    pub total: usize,
}

/// One unit (or unit fragment) inside a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMember {
    pub source_id: String,
    pub source_kind: SourceKind,
    /// Byte offset of this member's text within [`Chunk::text`].
    pub start: usize,
    /// Byte offset one past the end of this member's text.
    pub end: usize,
    /// Set when the member is a fragment of an oversized unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<PartInfo>,
}

/// A budget-sized group of log units submitted as one analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: usize,
    pub members: Vec<ChunkMember>,
    /// Concatenated text of all members, in member order.
    pub text: String,
    /// Size of the chunk in the configured size unit.
    pub approx_size: usize,
}

impl Chunk {
    /// Source ids of the members, in order.
    pub fn member_unit_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.source_id.as_str()).collect()
    }

    /// Text belonging to a single member.
    pub fn member_text(&self, member: &ChunkMember) -> &str {
        &self.text[member.start..member.end]
    }

    /// Returns true if a unit with this source id is part of the chunk.
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.members.iter().any(|m| m.source_id == source_id)
    }
}

/// Stable identifier of a finding: the chunk that produced it and its
/// position within that chunk's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FindingId {
    pub chunk: usize,
    pub seq: usize,
}

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}-f{}", self.chunk, self.seq)
    }
}

/// One normalized diagnostic observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: FindingId,
    pub severity: Severity,
    /// Units implicated by this finding.
    pub source_ids: BTreeSet<String>,
    /// One-line description of the problem.
    pub summary: String,
    /// Supporting log excerpts.
    pub evidence: String,
    /// Chunk in which the finding was first detected.
    pub chunk_origin: usize,
    /// Number of raw findings merged into this one.
    pub occurrences: usize,
}

/// Successful analysis of a single chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub findings: Vec<Finding>,
    /// Units the backend explicitly reported as healthy.
    pub cleared: BTreeSet<String>,
}

/// Terminal result for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Analyzed {
        chunk_id: usize,
        analysis: ChunkAnalysis,
    },
    Failed {
        chunk_id: usize,
        failure: ChunkAnalysisFailure,
    },
}

impl ChunkOutcome {
    pub fn chunk_id(&self) -> usize {
        match self {
            ChunkOutcome::Analyzed { chunk_id, .. } | ChunkOutcome::Failed { chunk_id, .. } => {
                *chunk_id
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChunkOutcome::Failed { .. })
    }
}

/// Counts of findings per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeveritySummary {
    /// Creates a summary from a list of findings.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            ..Self::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }
}

/// The merged, ranked result of analysing every chunk of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    /// Findings ranked by severity, then by first-seen chunk, then by id.
    pub findings: Vec<Finding>,
    /// Chunks whose analysis permanently failed.
    pub unanalyzed_chunks: BTreeSet<usize>,
    /// Fraction of units referenced by a finding or reported healthy.
    pub coverage: f64,
    pub total_units: usize,
    pub total_chunks: usize,
    /// Near-duplicate pairs that were kept separate.
    pub ambiguous_pairs: usize,
    pub summary: SeveritySummary,
}

impl AggregatedReport {
    /// Returns true if every chunk was analyzed.
    pub fn is_complete(&self) -> bool {
        self.unanalyzed_chunks.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.summary.critical > 0
    }

    /// Returns true if the report needs attention: a critical finding or
    /// an incomplete analysis.
    pub fn needs_attention(&self) -> bool {
        self.has_critical() || !self.is_complete()
    }
}

/// Metadata about one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Bundle path as given on the command line.
    pub bundle: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Backend and model that served the analysis.
    pub model_used: String,
    /// Number of log units ingested.
    pub units_ingested: usize,
    /// Bundle entries that could not be read.
    pub skipped_entries: Vec<SkippedEntry>,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete diagnostic report handed to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub analysis: AggregatedReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding {
            finding_id: FindingId { chunk: 0, seq: 0 },
            severity,
            source_ids: BTreeSet::new(),
            summary: "OOMKilled".to_string(),
            evidence: String::new(),
            chunk_origin: 0,
            occurrences: 1,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(Severity::from_label("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_label("error"), Severity::Critical);
        assert_eq!(Severity::from_label(" warn "), Severity::Warning);
        assert_eq!(Severity::from_label("medium"), Severity::Warning);
        assert_eq!(Severity::from_label("low"), Severity::Info);
        assert_eq!(Severity::from_label("whatever"), Severity::Info);
    }

    #[test]
    fn test_severity_abbreviations_and_unknown_labels() {
        assert_eq!(Severity::from_label("CRIT"), Severity::Critical);
        assert_eq!(Severity::from_label("Err"), Severity::Critical);
        assert_eq!(Severity::known_label("notice"), Some(Severity::Info));
        assert_eq!(Severity::known_label(""), Some(Severity::Info));
        assert_eq!(Severity::known_label("sev-1"), None);
        assert_eq!(Severity::from_label("sev-1"), Severity::Info);
    }

    #[test]
    fn test_finding_id_ordering_and_display() {
        let a = FindingId { chunk: 0, seq: 5 };
        let b = FindingId { chunk: 1, seq: 0 };
        assert!(a < b);
        assert_eq!(b.to_string(), "c1-f0");
    }

    #[test]
    fn test_chunk_member_text() {
        let chunk = Chunk {
            chunk_id: 0,
            members: vec![
                ChunkMember {
                    source_id: "pods/a.log".to_string(),
                    source_kind: SourceKind::Pod,
                    start: 0,
                    end: 6,
                    part: None,
                },
                ChunkMember {
                    source_id: "events/ns.txt".to_string(),
                    source_kind: SourceKind::Event,
                    start: 6,
                    end: 12,
                    part: None,
                },
            ],
            text: "alpha\nbravo\n".to_string(),
            approx_size: 12,
        };

        assert_eq!(chunk.member_unit_ids(), vec!["pods/a.log", "events/ns.txt"]);
        assert_eq!(chunk.member_text(&chunk.members[1]), "bravo\n");
        assert!(chunk.contains_source("pods/a.log"));
        assert!(!chunk.contains_source("pods/b.log"));
    }

    #[test]
    fn test_severity_summary() {
        let findings = vec![
            finding(Severity::Critical),
            finding(Severity::Warning),
            finding(Severity::Warning),
            finding(Severity::Info),
        ];

        let summary = SeveritySummary::from_findings(&findings);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.warning, 2);
        assert_eq!(summary.info, 1);
    }

    #[test]
    fn test_report_needs_attention() {
        let mut report = AggregatedReport {
            findings: vec![],
            unanalyzed_chunks: BTreeSet::new(),
            coverage: 1.0,
            total_units: 1,
            total_chunks: 1,
            ambiguous_pairs: 0,
            summary: SeveritySummary::default(),
        };
        assert!(!report.needs_attention());

        report.unanalyzed_chunks.insert(0);
        assert!(report.needs_attention());

        report.unanalyzed_chunks.clear();
        report.summary.critical = 1;
        assert!(report.needs_attention());
    }
}
