//! Shallow statement classification for routing
//!
//! Classification never builds an AST. It matches on the leading keywords of
//! a tokenized statement and pulls out the database / measurement identifiers
//! positionally, which is all the router needs to pick backends.

use std::collections::HashSet;

use super::error::{InfluxQlError, InfluxQlResult};
use super::scanner::{Token, tokenize};

/// Head phrases that require the statement to reach every holder of the data
const CONSISTENCY_COMMANDS: [&str; 3] = ["delete from", "drop measurement", "drop series from"];

/// Lowercase and join the first `n` tokens (all of them if `n` is `0`)
pub fn head_keywords(tokens: &[Token<'_>], n: usize) -> String {
    let n = if n == 0 || n > tokens.len() {
        tokens.len()
    } else {
        n
    };

    tokens[..n]
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

/// Find the first token matching one of `keywords` (case-insensitive) that is
/// followed by something, and run `extract` on everything after it
pub fn identifier_after_keyword<'t, 'a, F>(
    tokens: &'t [Token<'a>],
    keywords: &[&str],
    extract: F,
) -> InfluxQlResult<&'t str>
where
    F: Fn(&'t [Token<'a>]) -> &'t str,
{
    tokens
        .iter()
        .enumerate()
        .find(|(i, token)| {
            i + 1 < tokens.len() && keywords.iter().any(|k| token.eq_ignore_ascii_case(k))
        })
        .map(|(i, _)| extract(&tokens[i + 1..]))
        .ok_or(InfluxQlError::IllegalQuery)
}

/// Database named after `on` / `database`
pub fn get_database_from_tokens<'t>(tokens: &'t [Token<'_>]) -> InfluxQlResult<&'t str> {
    identifier_after_keyword(tokens, &["on", "database"], get_database)
}

/// Measurement named after `from` / `measurement`
pub fn get_measurement_from_tokens<'t>(tokens: &'t [Token<'_>]) -> InfluxQlResult<&'t str> {
    identifier_after_keyword(tokens, &["from", "measurement"], get_measurement)
}

pub fn get_database_from_influxql(query: &str) -> InfluxQlResult<String> {
    let tokens = tokenize(query, 0)?;
    get_database_from_tokens(&tokens).map(str::to_string)
}

pub fn get_measurement_from_influxql(query: &str) -> InfluxQlResult<String> {
    let tokens = tokenize(query, 0)?;
    get_measurement_from_tokens(&tokens).map(str::to_string)
}

fn is_quoted(s: &str) -> bool {
    s.starts_with(['"', '\''])
}

/// Strip the enclosing quotes of a quoted token
fn unquote(s: &str) -> &str {
    if !is_quoted(s) {
        return s;
    }
    let mut chars = s.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

/// Extract a database name: `"db"`, `db` or the `db` of `db.rp`
pub fn get_database<'t>(tokens: &'t [Token<'_>]) -> &'t str {
    let Some(first) = tokens.first() else {
        return "";
    };
    let m: &str = first;

    if is_quoted(m) {
        return unquote(m);
    }

    match m.find('.') {
        Some(index) => &m[..index],
        None => m,
    }
}

/// Extract a measurement name
///
/// Handles `db.rp.m` / `db..m` written as separate tokens, `db.m` as
/// separate tokens, regex measurements (returned with their slashes) and plain
/// or quoted identifiers with an optional `db.` prefix inside the token.
pub fn get_measurement<'t>(tokens: &'t [Token<'_>]) -> &'t str {
    let Some(first) = tokens.first() else {
        return "";
    };

    if tokens.len() >= 3 && (tokens[1] == "." || tokens[1] == "..") {
        let m: &str = if tokens.len() > 3 && tokens[1] == "." {
            if tokens.len() >= 5 && tokens[3] == "." {
                &tokens[4]
            } else {
                // a lone `db.m` followed by more clauses keeps the first part
                first
            }
        } else {
            &tokens[2]
        };
        return unquote(m);
    }

    let m: &str = first;
    if m.starts_with('/') {
        return m;
    }
    if is_quoted(m) {
        return unquote(m);
    }

    match m.find('.') {
        Some(index) => unquote(&m[index + 1..]),
        None => m,
    }
}

/// Set of head phrases (2 or 3 lowercased words) the proxy knows how to route
#[derive(Debug, Clone)]
pub struct SupportedCommands {
    commands: HashSet<String>,
}

impl SupportedCommands {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, head: &str) -> bool {
        self.commands.contains(head)
    }
}

impl Default for SupportedCommands {
    fn default() -> Self {
        Self::new([
            "show measurements",
            "show series",
            "show field keys",
            "show tag keys",
            "show tag values",
            "show retention policies",
            "show stats",
            "show databases",
            "create database",
            "drop database",
            "delete from",
            "drop measurement",
            "drop series from",
        ])
    }
}

/// What a statement is, as far as routing is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// `select ... from ...` without an `into` clause before the `from`
    Select,

    /// `show ... from ...`
    ShowFrom,

    /// A head phrase found in [`SupportedCommands`]
    Command(String),

    /// Nothing this layer can route (`select ... into`, unknown commands)
    Unroutable,
}

/// A tokenized statement together with its classification
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    tokens: Vec<Token<'a>>,
    kind: StatementKind,
}

impl<'a> Statement<'a> {
    pub fn tokens(&self) -> &[Token<'a>] {
        &self.tokens
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn is_routable(&self) -> bool {
        self.kind != StatementKind::Unroutable
    }

    /// Whether the statement has to be applied to / verified against every
    /// backend holding the data
    pub fn needs_consistency_check(&self) -> bool {
        match &self.kind {
            StatementKind::Select | StatementKind::ShowFrom => true,
            StatementKind::Command(head) => CONSISTENCY_COMMANDS.contains(&head.as_str()),
            StatementKind::Unroutable => false,
        }
    }

    pub fn database(&self) -> InfluxQlResult<&str> {
        get_database_from_tokens(&self.tokens)
    }

    pub fn measurement(&self) -> InfluxQlResult<&str> {
        get_measurement_from_tokens(&self.tokens)
    }

    pub fn database_statement(&self) -> Option<DatabaseStatement> {
        classify_database_statement(&self.tokens)
    }

    pub fn is_select_or_show(&self) -> bool {
        is_select_or_show(&self.tokens)
    }

    pub fn is_delete_or_drop_measurement(&self) -> bool {
        is_delete_or_drop_measurement(&self.tokens)
    }
}

/// Tokenize and classify a statement
///
/// Fails if the statement cannot be tokenized or is empty.
pub fn classify<'a>(query: &'a str, commands: &SupportedCommands) -> InfluxQlResult<Statement<'a>> {
    let tokens = tokenize(query, 0)?;
    let kind = classify_tokens(&tokens, commands)?;
    Ok(Statement { tokens, kind })
}

fn classify_tokens(tokens: &[Token<'_>], commands: &SupportedCommands) -> InfluxQlResult<StatementKind> {
    let head = tokens.first().ok_or(InfluxQlError::IllegalQuery)?;

    if head.eq_ignore_ascii_case("select") {
        for token in &tokens[1..] {
            if token.eq_ignore_ascii_case("into") {
                return Ok(StatementKind::Unroutable);
            }
            if token.eq_ignore_ascii_case("from") {
                return Ok(StatementKind::Select);
            }
        }
        return Ok(StatementKind::Unroutable);
    }

    if head.eq_ignore_ascii_case("show") && tokens[1..].iter().any(|t| t.eq_ignore_ascii_case("from")) {
        return Ok(StatementKind::ShowFrom);
    }

    for n in [2, 3] {
        let stmt = head_keywords(tokens, n);
        if commands.contains(&stmt) {
            return Ok(StatementKind::Command(stmt));
        }
    }

    Ok(StatementKind::Unroutable)
}

/// Database-level DDL statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatement {
    ShowDatabases,
    CreateDatabase(Option<String>),
    DropDatabase(Option<String>),
}

impl DatabaseStatement {
    pub fn is_show(&self) -> bool {
        matches!(self, DatabaseStatement::ShowDatabases)
    }

    /// The database being created or dropped, if one was named
    pub fn database(&self) -> Option<&str> {
        match self {
            DatabaseStatement::ShowDatabases => None,
            DatabaseStatement::CreateDatabase(db) | DatabaseStatement::DropDatabase(db) => {
                db.as_deref()
            }
        }
    }
}

/// Recognize `show databases`, `create database <db>` and `drop database <db>`
pub fn classify_database_statement(tokens: &[Token<'_>]) -> Option<DatabaseStatement> {
    let db = || (tokens.len() >= 3).then(|| get_database(&tokens[2..]).to_string());

    match head_keywords(tokens, 2).as_str() {
        "show databases" => Some(DatabaseStatement::ShowDatabases),
        "create database" => Some(DatabaseStatement::CreateDatabase(db())),
        "drop database" => Some(DatabaseStatement::DropDatabase(db())),
        _ => None,
    }
}

/// Whether the statement goes down the query path rather than being write-only
pub fn is_select_or_show(tokens: &[Token<'_>]) -> bool {
    tokens
        .first()
        .is_some_and(|t| t.eq_ignore_ascii_case("select") || t.eq_ignore_ascii_case("show"))
}

/// `delete from`, `drop measurement` and `drop series` heads
///
/// Only the two-word head is inspected here, unlike the command table which
/// knows `drop series from` as a three-word phrase.
pub fn is_delete_or_drop_measurement(tokens: &[Token<'_>]) -> bool {
    tokens.len() >= 3
        && matches!(
            head_keywords(tokens, 2).as_str(),
            "delete from" | "drop measurement" | "drop series"
        )
}
