//! Line protocol helpers
//!
//! Only the parts of a line the proxy needs to touch are understood here: the
//! measurement key at the front and the timestamp at the back. Everything in
//! between is passed through untouched.

use chrono::Utc;
use tracing::trace;

use crate::influxql::scanner::quoted_span_end;

/// Timestamp precision of an incoming write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl Precision {
    /// Look up a precision by its `precision=` query parameter value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "n" | "ns" => Some(Precision::Nanosecond),
            "u" => Some(Precision::Microsecond),
            "ms" => Some(Precision::Millisecond),
            "s" => Some(Precision::Second),
            "m" => Some(Precision::Minute),
            "h" => Some(Precision::Hour),
            _ => None,
        }
    }

    /// Nanoseconds per unit
    pub fn multiplier(self) -> u64 {
        match self {
            Precision::Nanosecond => 1,
            Precision::Microsecond => 1_000,
            Precision::Millisecond => 1_000_000,
            Precision::Second => 1_000_000_000,
            Precision::Minute => 60 * 1_000_000_000,
            Precision::Hour => 60 * 60 * 1_000_000_000,
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// Position of the separator in front of a trailing timestamp, if the line
/// ends with one
pub fn scan_time(line: &[u8]) -> Option<usize> {
    let digits = line.iter().rev().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits >= line.len() {
        return None;
    }

    let pos = line.len() - 1 - digits;
    (pos > 0 && matches!(line[pos], b' ' | b'\t' | 0)).then_some(pos)
}

/// Rewrite the timestamp of a single line to nanoseconds
///
/// Lines without a timestamp get the current time appended. Unknown
/// precisions leave the timestamp value as it is.
pub fn normalize_to_nanos(line: &[u8], precision: &str) -> Vec<u8> {
    let line = trim_line_end(line);

    let Some(pos) = scan_time(line) else {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        return [line, &b" "[..], now.to_string().as_bytes()].concat();
    };

    match precision {
        "ns" | "n" => line.to_vec(),
        "u" => [line, &b"000"[..]].concat(),
        "ms" => [line, &b"000000"[..]].concat(),
        "s" => [line, &b"000000000"[..]].concat(),
        other => {
            let multiplier = Precision::from_name(other).map_or(1, Precision::multiplier);
            let nanos = bytes_to_u64(&line[pos + 1..]).wrapping_mul(multiplier);
            [&line[..pos], &b" "[..], nanos.to_string().as_bytes()].concat()
        }
    }
}

/// Normalize every non-empty line of a write body, one point per output line
pub fn normalize_body(body: &[u8], precision: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 4);
    for line in body.split(|&b| b == b'\n') {
        if trim_line_end(line).is_empty() {
            continue;
        }
        out.extend_from_slice(&normalize_to_nanos(line, precision));
        out.push(b'\n');
    }
    out
}

/// Unsigned decimal parse of an all-digit slice
///
/// No sign handling and no overflow check: callers only pass timestamp
/// digits found by [`scan_time`].
fn bytes_to_u64(digits: &[u8]) -> u64 {
    digits
        .iter()
        .fold(0u64, |acc, &b| acc.wrapping_mul(10).wrapping_add(u64::from(b - b'0')))
}

/// Series key prefix of a line: the measurement, with `\` escapes resolved
///
/// Returns `None` for a line that ends before any tag or field section.
pub fn scan_key(line: &[u8]) -> Option<String> {
    let mut key = Vec::new();
    let mut bytes = line.iter();

    while let Some(&b) = bytes.next() {
        match b {
            b'\\' => key.push(*bytes.next()?),
            b' ' | b',' => return Some(String::from_utf8_lossy(&key).into_owned()),
            _ => key.push(b),
        }
    }
    None
}

/// Count the unescaped, unquoted whitespace runs of a line
///
/// A well-formed point has one (no timestamp) or two of them.
pub fn scan_space(line: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;

    while i < line.len() {
        match line[i] {
            b'\\' => i += 2,
            b'"' => match quoted_span_end(line, i, b'"') {
                Ok(end) => i = end,
                Err(e) => {
                    trace!("scan quote error: {e}");
                    return count;
                }
            },
            b' ' | b'\t' => {
                if i == 0 || !matches!(line[i - 1], b' ' | b'\t') {
                    count += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    count
}
