//! Reply classification and server error lines

use crate::constants::{line, query_reply};
use crate::error::Error;

/// What a reply line is, judged by its first characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Empty reply: the command finished without output
    Prompt,
    /// `&1` table header
    Table,
    /// `&2` affected row count
    Update,
    /// `&3` schema change done
    Schema,
    /// `&4` auto-commit state change
    Transaction,
    /// `&5` prepared statement
    Prepare,
    /// `&6` further rows of an open table
    Block,
    /// `%` column header
    Header,
    /// `[` tuple
    Tuple,
    /// `=` single unsliced value
    Value,
    /// `!` error
    Error,
    /// `#` info
    Info,
    /// `^` redirect
    Redirect,
    /// Anything else
    Unknown,
}

impl ResponseKind {
    /// Classify one reply line
    pub fn classify(l: &str) -> Self {
        let bytes = l.as_bytes();
        match bytes.first() {
            None => ResponseKind::Prompt,
            Some(&line::QUERY) => match bytes.get(1) {
                Some(&query_reply::TABLE) => ResponseKind::Table,
                Some(&query_reply::UPDATE) => ResponseKind::Update,
                Some(&query_reply::SCHEMA) => ResponseKind::Schema,
                Some(&query_reply::TRANSACTION) => ResponseKind::Transaction,
                Some(&query_reply::PREPARE) => ResponseKind::Prepare,
                Some(&query_reply::BLOCK) => ResponseKind::Block,
                _ => ResponseKind::Unknown,
            },
            Some(&line::HEADER) => ResponseKind::Header,
            Some(&line::TUPLE) => ResponseKind::Tuple,
            Some(&line::VALUE) => ResponseKind::Value,
            Some(&line::ERROR) => ResponseKind::Error,
            Some(&line::INFO) => ResponseKind::Info,
            Some(&line::REDIRECT) => ResponseKind::Redirect,
            Some(_) => ResponseKind::Unknown,
        }
    }
}

/// Split an error line into SQLSTATE and message
///
/// `!42000!syntax error` gives `(Some("42000"), "syntax error")`; lines
/// without a five-character state give `(None, line)`.
pub fn parse_error_line(l: &str) -> (Option<String>, String) {
    let body = l.strip_prefix('!').unwrap_or(l);

    if let Some((code, message)) = body.split_once('!') {
        if code.len() == 5 && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return (Some(code.to_string()), message.to_string());
        }
    }
    (None, body.to_string())
}

/// Build one server error from all `!` lines of a reply
///
/// The first line with a SQLSTATE provides the code; messages are joined
/// with newlines.
pub fn server_error<'a>(lines: impl IntoIterator<Item = &'a str>) -> Error {
    let mut code = None;
    let mut messages = Vec::new();

    for l in lines {
        let (c, message) = parse_error_line(l);
        if code.is_none() {
            code = c;
        }
        messages.push(message);
    }

    Error::server(code, messages.join("\n"))
}
