//! Error types for InfluxQL scanning and classification

use std::fmt;

/// Result type alias for InfluxQL operations
pub type InfluxQlResult<T> = Result<T, InfluxQlError>;

/// Errors raised while tokenizing or classifying a statement
///
/// All of them are terminal for the statement at hand: there is no partial
/// recovery, the caller has to reject the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfluxQlError {
    /// A backslash inside a quoted token escapes something other than the quote
    WrongQuote,

    /// A quoted token runs to the end of input without its closing quote
    UnmatchedQuote,

    /// A `(`, `[` or `{` group has no closing counterpart
    Unclosed,

    /// No routing keyword was found where one was required
    IllegalQuery,
}

impl fmt::Display for InfluxQlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfluxQlError::WrongQuote => write!(f, "wrong quote"),
            InfluxQlError::UnmatchedQuote => write!(f, "unmatched quote"),
            InfluxQlError::Unclosed => write!(f, "unclosed parenthesis"),
            InfluxQlError::IllegalQuery => write!(f, "illegal InfluxQL"),
        }
    }
}

impl std::error::Error for InfluxQlError {}
