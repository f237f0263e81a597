//! Tokenizer for raw InfluxQL statements
//!
//! The scanner only knows enough about InfluxQL to keep routing-relevant
//! pieces together:
//!
//! - quoted identifiers and strings (`"..."`, `'...'`) with `\<quote>` escapes
//! - bracketed groups (`(...)`, `[...]`, `{...}`), without nesting
//! - runs of dots, so `db.rp.cpu` written with quoted parts splits into
//!   `"db"`, `.`, `"rp"`, `.`, `"cpu"`
//! - everything else up to the next space
//!
//! Tokens borrow from the query string unless an escape had to be removed.

use std::borrow::Cow;

use tracing::trace;

use super::error::{InfluxQlError, InfluxQlResult};

/// One token of a statement
///
/// Borrowed from the query unless a `\<quote>` escape was dropped.
pub type Token<'a> = Cow<'a, str>;

/// Scan a single token from the front of `data`
///
/// Returns the number of bytes consumed together with the token, or
/// `(0, None)` once only spaces (or nothing) remain.
pub fn scan_token(data: &str, at_eof: bool) -> InfluxQlResult<(usize, Option<Token<'_>>)> {
    if at_eof && data.is_empty() {
        return Ok((0, None));
    }

    let bytes = data.as_bytes();
    let Some(start) = bytes.iter().position(|&b| b != b' ') else {
        return Ok((0, None));
    };

    let advance = match bytes[start] {
        quote @ (b'"' | b'\'') => {
            let (end, token) = find_end_with_quote(data, start, quote).inspect_err(|e| {
                trace!("scan token error: {e}");
            })?;
            return Ok((end, Some(token)));
        }
        b'(' => find_closer(bytes, start, b')')?,
        b'[' => find_closer(bytes, start, b']')?,
        b'{' => find_closer(bytes, start, b'}')?,
        b'.' => start + 1 + bytes[start + 1..].iter().take_while(|&&b| b == b'.').count(),
        _ => bytes[start..]
            .iter()
            .position(|&b| b == b' ')
            .map_or(bytes.len(), |offset| start + offset),
    };

    Ok((advance, Some(Cow::Borrowed(&data[start..advance]))))
}

fn find_closer(bytes: &[u8], start: usize, closer: u8) -> InfluxQlResult<usize> {
    bytes[start..]
        .iter()
        .position(|&b| b == closer)
        .map(|offset| start + offset + 1)
        .ok_or_else(|| {
            trace!("scan token error: {}", InfluxQlError::Unclosed);
            InfluxQlError::Unclosed
        })
}

/// Find the byte offset just past the closing `quote` of a quoted span
/// opening at `start`
///
/// Inside the span only `\<quote>` is a valid escape.
pub(crate) fn quoted_span_end(bytes: &[u8], start: usize, quote: u8) -> InfluxQlResult<usize> {
    let mut end = start + 1;
    while end < bytes.len() {
        match bytes[end] {
            b if b == quote => return Ok(end + 1),
            b'\\' => match bytes.get(end + 1) {
                Some(&next) if next == quote => end += 2,
                Some(_) => return Err(InfluxQlError::WrongQuote),
                None => return Err(InfluxQlError::UnmatchedQuote),
            },
            _ => end += 1,
        }
    }
    Err(InfluxQlError::UnmatchedQuote)
}

/// Scan a quoted token, keeping the enclosing quotes but dropping the
/// backslash of every escaped quote
fn find_end_with_quote(data: &str, start: usize, quote: u8) -> InfluxQlResult<(usize, Token<'_>)> {
    let end = quoted_span_end(data.as_bytes(), start, quote)?;
    let raw = &data[start..end];

    // every backslash left in a valid span escapes the quote character
    let token = if raw.contains('\\') {
        let quote = char::from(quote);
        Cow::Owned(raw.replace(&format!("\\{quote}"), &quote.to_string()))
    } else {
        Cow::Borrowed(raw)
    };

    Ok((end, token))
}

/// Iterator driving [`scan_token`] over a whole statement
///
/// Stops at the first error, after yielding it.
pub struct Tokens<'a> {
    rest: &'a str,
    failed: bool,
}

impl<'a> Tokens<'a> {
    /// Trailing `;` and whitespace are trimmed before scanning
    pub fn new(query: &'a str) -> Self {
        Self {
            rest: query.trim().trim_end_matches([';', ' ']),
            failed: false,
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = InfluxQlResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match scan_token(self.rest, true) {
            Ok((advance, Some(token))) => {
                self.rest = &self.rest[advance..];
                Some(Ok(token))
            }
            Ok((_, None)) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Tokenize a statement, producing at most `limit` tokens (`0` means no limit)
pub fn tokenize(query: &str, limit: usize) -> InfluxQlResult<Vec<Token<'_>>> {
    let limit = if limit == 0 { usize::MAX } else { limit };
    Tokens::new(query).take(limit).collect()
}
