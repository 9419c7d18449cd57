//! Worker stdout parsing.
//!
//! The worker prints one line per finished image, e.g.
//! `[MPI 3] Terminó imagen 007 con 123456 bytes escritos`, and a closing
//! `Tiempo total (distribución dinámica): 12.34 segundos` line from rank 0.
//! Only the occurrence of a completion line matters for progress; the image
//! number is parsed for logging but never used for counting.

/// Marker preceding the image number on a completion line.
pub const COMPLETION_KEYWORD: &str = "Terminó imagen";

const TOTAL_TIME_KEYWORD: &str = "Tiempo total";
const RANK_PREFIX: &str = "[MPI ";

/// A recognised line of worker output.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// One processing unit finished.
    ImageCompleted {
        rank: Option<u32>,
        /// None when the digit run does not fit in a u64
        image: Option<u64>,
    },
    /// Wall time reported by the worker itself.
    TotalTime { seconds: f64 },
}

/// True when `line` contains the completion keyword followed by whitespace
/// and at least one digit.
pub fn is_completion_event(line: &str) -> bool {
    completion_digits(line).is_some()
}

/// Classify one line of worker output.
pub fn parse_line(line: &str) -> Option<LogEvent> {
    if let Some(digits) = completion_digits(line) {
        return Some(LogEvent::ImageCompleted {
            rank: parse_rank(line),
            image: digits.parse().ok(),
        });
    }
    parse_total_time(line).map(|seconds| LogEvent::TotalTime { seconds })
}

/// Find the digit run after the first keyword occurrence that has one.
fn completion_digits(line: &str) -> Option<&str> {
    for (idx, _) in line.match_indices(COMPLETION_KEYWORD) {
        let rest = &line[idx + COMPLETION_KEYWORD.len()..];
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() {
            continue;
        }
        let digits = leading_digits(trimmed);
        if !digits.is_empty() {
            return Some(digits);
        }
    }
    None
}

fn parse_rank(line: &str) -> Option<u32> {
    let idx = line.find(RANK_PREFIX)?;
    let rest = &line[idx + RANK_PREFIX.len()..];
    let digits = leading_digits(rest);
    if digits.is_empty() || !rest[digits.len()..].starts_with(']') {
        return None;
    }
    digits.parse().ok()
}

fn parse_total_time(line: &str) -> Option<f64> {
    let idx = line.find(TOTAL_TIME_KEYWORD)?;
    let rest = &line[idx + TOTAL_TIME_KEYWORD.len()..];
    let after_colon = &rest[rest.find(':')? + 1..];
    let value = after_colon.trim_start();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// Splits a byte stream arriving in arbitrary chunks into complete lines.
///
/// An unterminated trailing line is held back until the next chunk (or
/// `finish`). Decoding happens per complete line, so a multi-byte character
/// split across two reads is not mangled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        // `complete` ends with '\n', so drop it before splitting
        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Flush the held-back partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
