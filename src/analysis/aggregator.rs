//! Finding aggregation and statistics.
//!
//! Per-chunk findings are clustered across chunks, merged, ranked and
//! summarized into a single [`AggregatedReport`]. Findings are processed in
//! a canonical order so the result does not depend on the order in which
//! chunk outcomes arrive.

use crate::models::{AggregatedReport, ChunkOutcome, Finding, SeveritySummary};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Separator placed between evidence excerpts of merged findings.
const EVIDENCE_SEPARATOR: &str = "\n---\n";

/// Deduplication parameters.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Minimum summary similarity for two findings to be the same issue.
    pub similarity_threshold: f64,
    /// Width of the band below the threshold reported as ambiguous.
    pub ambiguity_margin: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            ambiguity_margin: 0.15,
        }
    }
}

impl From<&crate::config::AggregationConfig> for AggregatorConfig {
    fn from(config: &crate::config::AggregationConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            ambiguity_margin: config.ambiguity_margin,
        }
    }
}

/// Merges chunk outcomes into one report.
pub struct ResultAggregator {
    config: AggregatorConfig,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Aggregate the outcomes of every chunk of a bundle whose units are
    /// `unit_ids`.
    pub fn aggregate(&self, unit_ids: &[String], outcomes: Vec<ChunkOutcome>) -> AggregatedReport {
        let total_chunks = outcomes.len();
        let mut unanalyzed_chunks = BTreeSet::new();
        let mut cleared = BTreeSet::new();
        let mut findings = Vec::new();

        for outcome in outcomes {
            let chunk_id = outcome.chunk_id();
            match outcome {
                ChunkOutcome::Analyzed { analysis, .. } => {
                    debug!(
                        "Chunk {} reported {} findings, {} sources cleared",
                        chunk_id,
                        analysis.findings.len(),
                        analysis.cleared.len()
                    );
                    findings.extend(analysis.findings);
                    cleared.extend(analysis.cleared);
                }
                ChunkOutcome::Failed { failure, .. } => {
                    debug!("Chunk {} unanalyzed: {}", chunk_id, failure);
                    unanalyzed_chunks.insert(chunk_id);
                }
            }
        }

        findings.sort_by_key(|f| (f.chunk_origin, f.finding_id));
        let raw_count = findings.len();

        let (clusters, ambiguous_pairs) = self.cluster(&findings);
        let mut merged: Vec<Finding> = clusters
            .into_iter()
            .map(|members| merge_cluster(&findings, &members))
            .collect();

        sort_by_rank(&mut merged);

        let coverage = compute_coverage(unit_ids, &merged, &cleared);
        let summary = SeveritySummary::from_findings(&merged);

        info!(
            "Aggregated {} raw findings into {} ({} ambiguous pairs kept apart), coverage {:.1}%",
            raw_count,
            merged.len(),
            ambiguous_pairs,
            coverage * 100.0
        );

        AggregatedReport {
            findings: merged,
            unanalyzed_chunks,
            coverage,
            total_units: unit_ids.len(),
            total_chunks,
            ambiguous_pairs,
            summary,
        }
    }

    /// Group findings (in canonical order) into clusters of indices.
    ///
    /// Returns the clusters ordered by their first member plus the number
    /// of near-duplicate pairs that ended up in different clusters.
    fn cluster(&self, findings: &[Finding]) -> (Vec<Vec<usize>>, usize) {
        let normalized: Vec<String> = findings
            .iter()
            .map(|f| normalize_summary(&f.summary))
            .collect();
        let tokens: Vec<BTreeSet<&str>> = normalized
            .iter()
            .map(|s| s.split_whitespace().collect())
            .collect();

        let threshold = self.config.similarity_threshold;
        let lower = threshold - self.config.ambiguity_margin;

        let mut sets = DisjointSet::new(findings.len());
        let mut near_misses = Vec::new();

        for i in 0..findings.len() {
            for j in (i + 1)..findings.len() {
                let (a, b) = (&findings[i], &findings[j]);
                if a.chunk_origin == b.chunk_origin {
                    continue;
                }

                let same_text = !normalized[i].is_empty() && normalized[i] == normalized[j];
                let similarity = jaccard(&tokens[i], &tokens[j]);
                let overlapping = !a.source_ids.is_disjoint(&b.source_ids);

                if same_text || (similarity >= threshold && overlapping) {
                    sets.union(i, j);
                } else if similarity >= lower {
                    debug!(
                        "Keeping {} and {} separate (similarity {:.2}, overlapping sources: {})",
                        a.finding_id, b.finding_id, similarity, overlapping
                    );
                    near_misses.push((i, j));
                }
            }
        }

        let ambiguous_pairs = near_misses
            .into_iter()
            .filter(|&(i, j)| sets.find(i) != sets.find(j))
            .count();

        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..findings.len() {
            by_root.entry(sets.find(i)).or_default().push(i);
        }

        let mut clusters: Vec<Vec<usize>> = by_root.into_values().collect();
        clusters.sort_by_key(|members| members[0]);

        (clusters, ambiguous_pairs)
    }
}

/// Merge a cluster of findings. The first member (in canonical order)
/// provides the identity and summary.
fn merge_cluster(findings: &[Finding], members: &[usize]) -> Finding {
    let representative = &findings[members[0]];

    let mut merged = Finding {
        finding_id: representative.finding_id,
        severity: representative.severity,
        source_ids: BTreeSet::new(),
        summary: representative.summary.clone(),
        evidence: String::new(),
        chunk_origin: representative.chunk_origin,
        occurrences: 0,
    };

    let mut evidence: Vec<&str> = Vec::new();

    for &index in members {
        let finding = &findings[index];
        merged.severity = merged.severity.max(finding.severity);
        merged.source_ids.extend(finding.source_ids.iter().cloned());
        merged.occurrences += finding.occurrences;

        let excerpt = finding.evidence.trim();
        if !excerpt.is_empty() && !evidence.contains(&excerpt) {
            evidence.push(excerpt);
        }
    }

    merged.evidence = evidence.join(EVIDENCE_SEPARATOR);
    merged
}

/// Rank findings: severity descending, then first-seen chunk, then id.
fn sort_by_rank(findings: &mut [Finding]) {
    findings.sort_by_key(|f| (Reverse(f.severity), f.chunk_origin, f.finding_id));
}

/// Fraction of known units referenced by a finding or reported healthy.
fn compute_coverage(unit_ids: &[String], findings: &[Finding], cleared: &BTreeSet<String>) -> f64 {
    if unit_ids.is_empty() {
        return 0.0;
    }

    let known: BTreeSet<&str> = unit_ids.iter().map(String::as_str).collect();
    let represented: BTreeSet<&str> = findings
        .iter()
        .flat_map(|f| f.source_ids.iter())
        .chain(cleared.iter())
        .map(String::as_str)
        .filter(|id| known.contains(id))
        .collect();

    represented.len() as f64 / known.len() as f64
}

/// Normalize a summary for comparison: lowercase, punctuation stripped,
/// numbers and hash-like tokens masked.
fn normalize_summary(summary: &str) -> String {
    let lowered: String = summary
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .map(|token| if is_volatile(token) { "<n>" } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counters, restart numbers, pod-template hashes and container ids.
fn is_volatile(token: &str) -> bool {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    token.len() >= 6
        && token.chars().all(|c| c.is_ascii_hexdigit())
        && token.chars().any(|c| c.is_ascii_digit())
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Union-find over finding indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller root wins so roots stay the earliest member.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[absorb] = keep;
        }
    }
}
