//! Text normalization for bundle entries.

use flate2::read::GzDecoder;
use std::io::Read;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

/// Decompress an individually gzipped entry (e.g. a rotated log).
///
/// Entries without a `.gz` suffix or without the gzip magic bytes are
/// returned unchanged.
pub fn maybe_decompress(name: &str, bytes: Vec<u8>) -> Result<Vec<u8>, String> {
    if strip_gz_suffix(name).is_none() || !bytes.starts_with(GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|e| format!("failed to decompress gzip entry: {}", e))?;
    Ok(decoded)
}

/// `name` without a trailing `.gz` (any case), or `None` if it has none.
pub fn strip_gz_suffix(name: &str) -> Option<&str> {
    let split = name.len().checked_sub(3)?;
    let (stem, ext) = (name.get(..split)?, name.get(split..)?);
    ext.eq_ignore_ascii_case(".gz").then_some(stem)
}

/// Decode raw bytes into text and normalize line endings.
pub fn normalize_text(bytes: &[u8]) -> String {
    normalize_line_endings(&decode(bytes))
}

fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(normalize_line_endings("plain\n"), "plain\n");
    }

    #[test]
    fn test_strips_utf8_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"hello\r\n");
        assert_eq!(normalize_text(&bytes), "hello\n");
    }

    #[test]
    fn test_decodes_utf16_le() {
        let mut bytes = UTF16_LE_BOM.to_vec();
        for unit in "ok\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(normalize_text(&bytes), "ok\n");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let text = normalize_text(&[b'a', 0xFF, b'b']);
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[test]
    fn test_strip_gz_suffix() {
        assert_eq!(strip_gz_suffix("pods/app.log.gz"), Some("pods/app.log"));
        assert_eq!(strip_gz_suffix("pods/app.log.GZ"), Some("pods/app.log"));
        assert_eq!(strip_gz_suffix("pods/app.log"), None);
        assert_eq!(strip_gz_suffix("gz"), None);
        assert_eq!(strip_gz_suffix("日志.gz"), Some("日志"));
    }

    #[test]
    fn test_decompress_gz_entry() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"rotated line\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = maybe_decompress("pods/app.log.1.gz", compressed).unwrap();
        assert_eq!(decoded, b"rotated line\n");
    }

    #[test]
    fn test_non_gzip_passthrough() {
        let bytes = b"not compressed".to_vec();
        assert_eq!(
            maybe_decompress("pods/app.log.gz", bytes.clone()).unwrap(),
            bytes
        );
        assert_eq!(maybe_decompress("pods/app.log", bytes.clone()).unwrap(), bytes);
    }
}
