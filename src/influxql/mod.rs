//! InfluxQL tokenizing and routing classification
//!
//! ## Pipeline
//!
//! ```text
//! raw query → scanner::tokenize → statement::classify → Statement { kind, tokens }
//!                                                         │
//!                                                         └─ database() / measurement()
//! ```
//!
//! Neither step validates full InfluxQL grammar. A statement that fails to
//! scan is rejected as a whole; the backend's own syntax error is what the
//! client should eventually see.

pub mod error;
pub mod scanner;
pub mod statement;

pub use error::{InfluxQlError, InfluxQlResult};
pub use scanner::{Token, Tokens, scan_token, tokenize};
pub use statement::{
    DatabaseStatement, Statement, StatementKind, SupportedCommands, classify,
    classify_database_statement, get_database_from_influxql, get_measurement_from_influxql,
    head_keywords, identifier_after_keyword, is_delete_or_drop_measurement, is_select_or_show,
};
