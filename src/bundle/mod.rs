//! Bundle ingestion.
//!
//! Turns a directory, archive or single file of Kubernetes diagnostics
//! into an ordered sequence of classified [`LogUnit`]s.

pub mod archive;
pub mod classify;
pub mod normalize;

pub use classify::SourceClassifier;

use crate::error::IngestError;
use crate::models::{LogUnit, SkippedEntry};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A bundle entry before decoding.
#[derive(Debug)]
pub struct RawEntry {
    /// Bundle-relative, `/`-separated path.
    pub source_id: String,
    /// File content, or the reason it could not be read.
    pub bytes: Result<Vec<u8>, String>,
}

/// Result of ingesting a bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub root: PathBuf,
    /// Units in bundle order.
    pub units: Vec<LogUnit>,
    /// Entries that could not be read.
    pub skipped: Vec<SkippedEntry>,
}

impl Bundle {
    /// Source ids of all units, in order.
    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.source_id.clone()).collect()
    }
}

/// Reads bundles from the filesystem.
pub struct BundleIngestor {
    classifier: SourceClassifier,
}

impl BundleIngestor {
    pub fn new(classifier: SourceClassifier) -> Self {
        Self { classifier }
    }

    /// Ingest the bundle at `path`.
    pub fn ingest(&self, path: &Path) -> Result<Bundle, IngestError> {
        if !path.exists() {
            return Err(IngestError::unreadable(path, "bundle root does not exist"));
        }

        let entries = if path.is_dir() {
            read_directory(path)?
        } else if archive::is_archive(path) {
            archive::read_archive(path)?
        } else {
            read_single_file(path)
        };

        if entries.is_empty() {
            return Err(IngestError::unreadable(path, "bundle contains zero entries"));
        }

        let bundle = self.build_units(path, entries);

        if bundle.units.is_empty() {
            return Err(IngestError::unreadable(
                path,
                format!("none of the {} entries could be read", bundle.skipped.len()),
            ));
        }

        info!(
            "Ingested {} log units from {} ({} skipped)",
            bundle.units.len(),
            path.display(),
            bundle.skipped.len()
        );

        Ok(bundle)
    }

    fn build_units(&self, root: &Path, entries: Vec<RawEntry>) -> Bundle {
        let mut units = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for entry in entries {
            // Source ids must be unique across the bundle.
            if !seen.insert(entry.source_id.clone()) {
                warn!("Skipping duplicate entry {}", entry.source_id);
                skipped.push(SkippedEntry {
                    path: entry.source_id,
                    reason: "duplicate entry path; first occurrence kept".to_string(),
                });
                continue;
            }

            let decoded = entry
                .bytes
                .and_then(|bytes| normalize::maybe_decompress(&entry.source_id, bytes));

            match decoded {
                Ok(bytes) => {
                    let source_kind = self.classifier.classify(&entry.source_id);
                    debug!(
                        "Unit {} classified as {} ({} bytes)",
                        entry.source_id,
                        source_kind,
                        bytes.len()
                    );
                    units.push(LogUnit {
                        source_kind,
                        ordinal: units.len(),
                        raw_text: normalize::normalize_text(&bytes),
                        source_id: entry.source_id,
                    });
                }
                Err(reason) => {
                    warn!("Skipping unreadable entry {}: {}", entry.source_id, reason);
                    skipped.push(SkippedEntry {
                        path: entry.source_id,
                        reason,
                    });
                }
            }
        }

        Bundle {
            root: root.to_path_buf(),
            units,
            skipped,
        }
    }
}

/// Walk a directory bundle in sorted path order.
fn read_directory(root: &Path) -> Result<Vec<RawEntry>, IngestError> {
    fs::read_dir(root)
        .map_err(|e| IngestError::unreadable(root, format!("cannot list directory: {}", e)))?;

    let mut entries = Vec::new();

    for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        match item {
            Ok(item) => {
                if item.file_type().is_dir() {
                    continue;
                }
                let source_id = relative_source_id(root, item.path());
                let bytes = fs::read(item.path()).map_err(|e| e.to_string());
                entries.push(RawEntry { source_id, bytes });
            }
            Err(e) => {
                let source_id = e
                    .path()
                    .map(|p| relative_source_id(root, p))
                    .unwrap_or_else(|| "<unknown>".to_string());
                entries.push(RawEntry {
                    source_id,
                    bytes: Err(e.to_string()),
                });
            }
        }
    }

    Ok(entries)
}

fn read_single_file(path: &Path) -> Vec<RawEntry> {
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    vec![RawEntry {
        source_id,
        bytes: fs::read(path).map_err(|e| e.to_string()),
    }]
}

fn relative_source_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
