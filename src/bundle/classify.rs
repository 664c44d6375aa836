//! Source classification by path pattern.

use super::normalize::strip_gz_suffix;
use crate::config::IngestConfig;
use crate::models::SourceKind;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Classifies bundle entries into source kinds.
///
/// Rules are checked in priority order: event, describe, pod. Anything
/// else is `Other`.
#[derive(Debug, Clone)]
pub struct SourceClassifier {
    event: GlobSet,
    describe: GlobSet,
    pod: GlobSet,
}

impl SourceClassifier {
    /// Build a classifier from the configured glob patterns.
    pub fn from_config(config: &IngestConfig) -> Result<Self, globset::Error> {
        Ok(Self {
            event: build_globset(&config.event_patterns)?,
            describe: build_globset(&config.describe_patterns)?,
            pod: build_globset(&config.pod_patterns)?,
        })
    }

    /// Classify an entry by its bundle-relative path.
    pub fn classify(&self, source_id: &str) -> SourceKind {
        // Rotated, compressed logs classify like their uncompressed name.
        let trimmed = strip_gz_suffix(source_id).unwrap_or(source_id);
        let path = Path::new(trimmed);

        if self.event.is_match(path) {
            SourceKind::Event
        } else if self.describe.is_match(path) {
            SourceKind::Describe
        } else if self.pod.is_match(path) {
            SourceKind::Pod
        } else {
            SourceKind::Other
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let glob = GlobBuilder::new(pattern).case_insensitive(true).build()?;
        builder.add(glob);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SourceClassifier {
        SourceClassifier::from_config(&IngestConfig::default()).unwrap()
    }

    #[test]
    fn test_events_directory() {
        let c = classifier();
        assert_eq!(c.classify("events/default.txt"), SourceKind::Event);
        assert_eq!(c.classify("bundle/events/kube-system.json"), SourceKind::Event);
        assert_eq!(c.classify("cluster-events.log"), SourceKind::Event);
    }

    #[test]
    fn test_describe_output() {
        let c = classifier();
        assert_eq!(c.classify("describe/pod-payments.txt"), SourceKind::Describe);
        assert_eq!(c.classify("describe-nodes.txt"), SourceKind::Describe);
        assert_eq!(c.classify("payments-api.describe"), SourceKind::Describe);
    }

    #[test]
    fn test_pod_logs() {
        let c = classifier();
        assert_eq!(c.classify("pods/payments-api-7d9f/app.txt"), SourceKind::Pod);
        assert_eq!(c.classify("payments-api.log"), SourceKind::Pod);
        assert_eq!(c.classify("logs/app.log.1.gz"), SourceKind::Pod);
        assert_eq!(c.classify("PODS/Upper.TXT"), SourceKind::Pod);
    }

    #[test]
    fn test_compressed_suffix_any_case() {
        let c = classifier();
        assert_eq!(c.classify("pods/api.log.GZ"), SourceKind::Pod);
        assert_eq!(c.classify("events/ns.txt.Gz"), SourceKind::Event);
    }

    #[test]
    fn test_pod_named_like_event_stays_pod() {
        let c = classifier();
        assert_eq!(c.classify("pods/event-router.log"), SourceKind::Pod);
    }

    #[test]
    fn test_unrecognized_is_other() {
        let c = classifier();
        assert_eq!(c.classify("README.md"), SourceKind::Other);
        assert_eq!(c.classify("nodes/metrics.csv"), SourceKind::Other);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = IngestConfig {
            event_patterns: vec!["events/[".to_string()],
            ..IngestConfig::default()
        };
        assert!(SourceClassifier::from_config(&config).is_err());
    }
}
