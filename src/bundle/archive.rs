//! Tar archive bundles (`.tar`, `.tar.gz`, `.tgz`).

use super::RawEntry;
use crate::error::IngestError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Returns true if the path names a supported archive.
pub fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn is_gzipped(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    name.ends_with(".gz") || name.ends_with(".tgz")
}

/// Read every regular file of an archive, in archive order.
pub fn read_archive(path: &Path) -> Result<Vec<RawEntry>, IngestError> {
    let file = File::open(path)
        .map_err(|e| IngestError::unreadable(path, format!("cannot open archive: {}", e)))?;

    let reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| IngestError::unreadable(path, format!("cannot read archive: {}", e)))?;

    let mut collected = Vec::new();

    for (index, entry) in entries.enumerate() {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) if collected.is_empty() => {
                return Err(IngestError::unreadable(
                    path,
                    format!("corrupt archive: {}", e),
                ));
            }
            Err(e) => {
                // The tar stream cannot be resumed after a broken header.
                warn!("Archive {} is truncated after entry {}: {}", path.display(), index, e);
                collected.push(RawEntry {
                    source_id: format!("<archive entry #{}>", index),
                    bytes: Err(format!("corrupt archive entry: {}", e)),
                });
                break;
            }
        };

        let source_id = match entry.path() {
            Ok(entry_path) => entry_source_id(&entry_path),
            Err(e) => {
                collected.push(RawEntry {
                    source_id: format!("<archive entry #{}>", index),
                    bytes: Err(format!("invalid entry path: {}", e)),
                });
                continue;
            }
        };

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        if !entry_type.is_file() {
            debug!("Skipping non-regular archive entry {}", source_id);
            collected.push(RawEntry {
                source_id,
                bytes: Err(format!("unsupported entry type {:?}", entry_type)),
            });
            continue;
        }

        let mut buf = Vec::new();
        let bytes = entry
            .read_to_end(&mut buf)
            .map(|_| buf)
            .map_err(|e| format!("failed to read entry: {}", e));

        collected.push(RawEntry { source_id, bytes });
    }

    Ok(collected)
}

fn entry_source_id(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn append(builder: &mut tar::Builder<impl std::io::Write>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("bundle.tar")));
        assert!(is_archive(Path::new("/tmp/Bundle.TAR.GZ")));
        assert!(is_archive(Path::new("bundle.tgz")));
        assert!(!is_archive(Path::new("app.log.gz")));
        assert!(!is_archive(Path::new("bundle")));
    }

    #[test]
    fn test_read_tar_gz_in_archive_order() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("bundle.tgz");

        let file = File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        append(&mut builder, "./bundle/pods/b.log", b"second\n");
        append(&mut builder, "bundle/events/ns.txt", b"first\n");
        builder.into_inner().unwrap().finish().unwrap();

        let entries = read_archive(&archive_path).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(ids, vec!["bundle/pods/b.log", "bundle/events/ns.txt"]);
        assert_eq!(entries[0].bytes.as_ref().unwrap(), b"second\n");
    }

    #[test]
    fn test_missing_archive_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let result = read_archive(&dir.path().join("missing.tar"));
        assert!(matches!(result, Err(IngestError::UnreadableBundle { .. })));
    }
}
