//! Commands sent to the server and column metadata
//!
//! A [`Statement`] is either a SQL query (`s` prefix) or a control command
//! (`X` prefix) and knows how to encode itself as one MAPI message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{control, CONTROL_PREFIX, QUERY_PREFIX};
use crate::types::{MonetType, TypeModifier};

/// Statement type determined by the leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementType {
    /// Unknown or unparsed statement
    #[default]
    Unknown,
    /// SELECT, WITH, VALUES, EXPLAIN ...
    Query,
    /// DML: INSERT, UPDATE, DELETE, MERGE, COPY, TRUNCATE
    Dml,
    /// DDL: CREATE, ALTER, DROP, etc.
    Ddl,
    /// START TRANSACTION, COMMIT, ROLLBACK, SAVEPOINT, RELEASE
    Transaction,
}

impl StatementType {
    /// Classify SQL text by its first keyword, skipping comments
    pub fn detect(sql: &str) -> Self {
        let Some(keyword) = first_keyword(sql) else {
            return StatementType::Unknown;
        };

        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "VALUES" | "EXPLAIN" | "TRACE" | "PLAN" | "DEBUG" => {
                StatementType::Query
            }
            "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "COPY" | "TRUNCATE" => StatementType::Dml,
            "CREATE" | "ALTER" | "DROP" | "GRANT" | "REVOKE" | "COMMENT" | "DECLARE" => {
                StatementType::Ddl
            }
            "START" | "BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementType::Transaction
            }
            _ => StatementType::Unknown,
        }
    }
}

/// Find the first word of `sql` outside `--` and `/* */` comments
fn first_keyword(sql: &str) -> Option<&str> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            break;
        }
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Which channel a command goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// SQL text
    Query,
    /// Session control (`reply_size`, `export`, ...)
    Control,
}

/// A command ready to be sent
#[derive(Debug, Clone)]
pub struct Statement {
    kind: CommandKind,
    text: String,
    statement_type: StatementType,
}

impl Statement {
    /// A SQL query
    pub fn query(sql: impl Into<String>) -> Self {
        let text = sql.into();
        let statement_type = StatementType::detect(&text);
        Self {
            kind: CommandKind::Query,
            text,
            statement_type,
        }
    }

    /// A raw control command
    pub fn control(command: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Control,
            text: command.into(),
            statement_type: StatementType::Unknown,
        }
    }

    /// `reply_size N`
    pub fn reply_size(rows: u32) -> Self {
        Self::control(format!("{} {}", control::REPLY_SIZE, rows))
    }

    /// `auto_commit 0|1`
    pub fn auto_commit(enabled: bool) -> Self {
        Self::control(format!("{} {}", control::AUTO_COMMIT, u8::from(enabled)))
    }

    /// `sizeheader 1`
    pub fn size_header(enabled: bool) -> Self {
        Self::control(format!("{} {}", control::SIZE_HEADER, u8::from(enabled)))
    }

    /// `export <query_id> <offset> <count>`
    pub fn export(query_id: i64, offset: u64, count: u64) -> Self {
        Self::control(format!(
            "{} {} {} {}",
            control::EXPORT,
            query_id,
            offset,
            count
        ))
    }

    /// `close <query_id>`
    pub fn close(query_id: i64) -> Self {
        Self::control(format!("{} {}", control::CLOSE, query_id))
    }

    /// Command channel
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The SQL or control text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Detected statement type (always `Unknown` for control commands)
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Check if this is a query
    pub fn is_query(&self) -> bool {
        self.statement_type == StatementType::Query
    }

    /// Encode as one MAPI message
    ///
    /// Queries become `s<sql>\n;`, control commands `X<command>\n`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.text.len() + 3);
        match self.kind {
            CommandKind::Query => {
                buf.put_u8(QUERY_PREFIX);
                buf.put_slice(self.text.as_bytes());
                buf.put_slice(b"\n;");
            }
            CommandKind::Control => {
                buf.put_u8(CONTROL_PREFIX);
                buf.put_slice(self.text.as_bytes());
                buf.put_u8(b'\n');
            }
        }
        buf.freeze()
    }
}

/// Metadata for a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Table the column belongs to (may be empty for expressions)
    pub table: String,
    /// Wire type
    pub type_tag: MonetType,
    /// Packed precision and scale
    pub modifier: TypeModifier,
    /// Display length from the `length` header
    pub length: u32,
    /// Whether NULL values may appear (headers do not say, so always true)
    pub nullable: bool,
}

impl ColumnInfo {
    /// Create a new column with minimal info
    pub fn new(name: impl Into<String>, type_tag: MonetType) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            type_tag,
            modifier: TypeModifier::default(),
            length: 0,
            nullable: true,
        }
    }

    /// Set the packed precision and scale
    pub fn with_modifier(mut self, modifier: TypeModifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Decimal precision (or width for other types)
    pub fn precision(&self) -> u16 {
        self.modifier.precision()
    }

    /// Decimal scale
    pub fn scale(&self) -> u16 {
        self.modifier.scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_type_detection() {
        assert_eq!(StatementType::detect("SELECT 1"), StatementType::Query);
        assert_eq!(StatementType::detect("  with x as (select 1) select * from x"), StatementType::Query);
        assert_eq!(StatementType::detect("INSERT INTO t VALUES (1)"), StatementType::Dml);
        assert_eq!(StatementType::detect("copy into t from 'x'"), StatementType::Dml);
        assert_eq!(StatementType::detect("CREATE TABLE t (x INT)"), StatementType::Ddl);
        assert_eq!(StatementType::detect("START TRANSACTION"), StatementType::Transaction);
        assert_eq!(StatementType::detect("SAVEPOINT sp1"), StatementType::Transaction);
        assert_eq!(StatementType::detect(""), StatementType::Unknown);
        assert_eq!(StatementType::detect("CALL sys.foo()"), StatementType::Unknown);
    }

    #[test]
    fn test_detection_skips_comments() {
        assert_eq!(
            StatementType::detect("-- leading comment\n/* block */ SELECT 1"),
            StatementType::Query
        );
        assert_eq!(StatementType::detect("/* unterminated"), StatementType::Unknown);
    }

    #[test]
    fn test_encode_query() {
        let stmt = Statement::query("SELECT 1");
        assert_eq!(stmt.kind(), CommandKind::Query);
        assert!(stmt.is_query());
        assert_eq!(&stmt.encode()[..], b"sSELECT 1\n;");
    }

    #[test]
    fn test_encode_control() {
        assert_eq!(&Statement::reply_size(250).encode()[..], b"Xreply_size 250\n");
        assert_eq!(&Statement::auto_commit(false).encode()[..], b"Xauto_commit 0\n");
        assert_eq!(&Statement::size_header(true).encode()[..], b"Xsizeheader 1\n");
        assert_eq!(&Statement::export(3, 100, 50).encode()[..], b"Xexport 3 100 50\n");
        assert_eq!(&Statement::close(3).encode()[..], b"Xclose 3\n");
    }

    #[test]
    fn test_column_info() {
        let col = ColumnInfo::new("price", MonetType::Decimal).with_modifier(TypeModifier::new(10, 2));
        assert_eq!((col.precision(), col.scale()), (10, 2));
        assert!(col.nullable);
    }
}
