//! Metrics file reading.
//!
//! The worker appends one block per processed image:
//!
//! ```text
//! Imagen: imagen_001.bmp
//! Bytes leídos: 921654
//! Bytes escritos: 5529924
//! ---------------------------
//! ```
//!
//! Counters are cumulative per writer, so only the last occurrence of each
//! label is meaningful. Earlier values are overwritten, never summed.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};
use crate::model::MetricsSnapshot;

const BYTES_PREFIX: &str = "bytes";
const READ_LABELS: &[&str] = &["leidos", "leídos"];
const WRITTEN_LABELS: &[&str] = &["escritos"];
const IMAGE_PREFIX: &str = "imagen";

/// Read the latest counters from the metrics file at `path`.
///
/// A missing or unreadable file is "no data yet": the result is all zeros and
/// nothing is propagated. A read error part-way through keeps whatever was
/// gathered before it.
pub fn read_latest_counters(path: &Path) -> MetricsSnapshot {
    match File::open(path) {
        Ok(file) => scan_counters(BufReader::new(file)),
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                debug!(path = %path.display(), "metrics file not present yet");
            } else {
                warn!(path = %path.display(), error = %e, "could not open metrics file");
            }
            MetricsSnapshot::default()
        }
    }
}

/// Like [`read_latest_counters`], but reports a file that cannot be opened.
pub fn try_read_latest_counters(path: &Path) -> io::Result<MetricsSnapshot> {
    let file = File::open(path)?;
    Ok(scan_counters(BufReader::new(file)))
}

/// Scan `reader` top to bottom, keeping the last value of each label.
pub fn scan_counters<R: BufRead>(reader: R) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::default();

    for raw in reader.split(b'\n') {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "metrics read interrupted; using values gathered so far");
                break;
            }
        };
        let line = String::from_utf8_lossy(&raw);

        if let Some(value) = match_counter(&line, READ_LABELS) {
            snapshot.bytes_read = value;
        } else if let Some(value) = match_counter(&line, WRITTEN_LABELS) {
            snapshot.bytes_written = value;
        } else if let Some(name) = match_image(&line) {
            snapshot.last_image = Some(name);
        }
    }

    snapshot
}

/// Match `<ws>Bytes<ws+><label>:<ws><digits>` case-insensitively.
fn match_counter(line: &str, labels: &[&str]) -> Option<u64> {
    let rest = strip_prefix_ignore_case(line.trim_start(), BYTES_PREFIX)?;
    let after_gap = rest.trim_start();
    if after_gap.len() == rest.len() {
        return None;
    }

    let rest = labels
        .iter()
        .find_map(|label| strip_prefix_ignore_case(after_gap, label))?;
    let value = rest.strip_prefix(':')?.trim_start();

    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

fn match_image(line: &str) -> Option<String> {
    let rest = strip_prefix_ignore_case(line.trim_start(), IMAGE_PREFIX)?;
    let name = rest.strip_prefix(':')?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// `prefix` must already be lowercase.
fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut consumed = 0;
    let mut chars = s.chars();
    for expected in prefix.chars() {
        let actual = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        consumed += actual.len_utf8();
    }
    Some(&s[consumed..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    fn scan(text: &str) -> MetricsSnapshot {
        scan_counters(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_last_record_of_each_kind_wins() {
        let snapshot = scan("Bytes leidos: 100\nBytes escritos: 50\nBytes leidos: 300\n");
        assert_eq!(snapshot.bytes_read, 300);
        assert_eq!(snapshot.bytes_written, 50);
    }

    #[test]
    fn test_missing_kind_stays_zero() {
        let snapshot = scan("Bytes escritos: 7\n");
        assert_eq!(snapshot.bytes_read, 0);
        assert_eq!(snapshot.bytes_written, 7);

        assert_eq!(scan(""), MetricsSnapshot::default());
    }

    #[test]
    fn test_matching_ignores_case_and_leading_whitespace() {
        let snapshot = scan("   BYTES   LEIDOS:   42\n\tbytes Escritos:9\n");
        assert_eq!(snapshot.bytes_read, 42);
        assert_eq!(snapshot.bytes_written, 9);
    }

    #[test]
    fn test_accented_label_written_by_worker_is_accepted() {
        let snapshot = scan(
            "Imagen: imagen_001.bmp\nBytes leídos: 921654\nBytes escritos: 5529924\n---\n\
             Imagen: imagen_002.bmp\nBytes LEÍDOS: 1843308\nBytes escritos: 11059848\n",
        );
        assert_eq!(snapshot.bytes_read, 1_843_308);
        assert_eq!(snapshot.bytes_written, 11_059_848);
        assert_eq!(snapshot.last_image.as_deref(), Some("imagen_002.bmp"));
    }

    #[test]
    fn test_label_must_start_the_line() {
        let snapshot = scan("total Bytes leidos: 5\nBytesleidos: 6\nBytes leidos 7\n");
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_trailing_text_after_digits_is_ignored() {
        let snapshot = scan("Bytes leidos: 12abc\nBytes escritos: \n");
        assert_eq!(snapshot.bytes_read, 12);
        assert_eq!(snapshot.bytes_written, 0);
    }

    #[test]
    fn test_missing_file_reads_as_zeros() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("metrics_rank.txt");

        assert_eq!(read_latest_counters(&path), MetricsSnapshot::default());
        assert!(try_read_latest_counters(&path).is_err());
    }

    #[test]
    fn test_reading_twice_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("metrics_rank.txt");
        fs::write(&path, "Bytes leidos: 10\nBytes escritos: 20\nBytes escritos: 30\n")
            .expect("Failed to write metrics");

        let first = read_latest_counters(&path);
        let second = read_latest_counters(&path);
        assert_eq!(first, second);
        assert_eq!(first.bytes_read, 10);
        assert_eq!(first.bytes_written, 30);
        assert_eq!(first.total_bytes(), 40);
    }

    #[test]
    fn test_invalid_utf8_lines_do_not_stop_the_scan() {
        let mut bytes = b"Bytes leidos: 1\n".to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE, b'\n']);
        bytes.extend_from_slice(b"Bytes leidos: 2\n");

        let snapshot = scan_counters(Cursor::new(bytes));
        assert_eq!(snapshot.bytes_read, 2);
    }
}
