//! Query reply decoding and result sets
//!
//! A table reply looks like
//!
//! ```text
//! &1 2 3 2 3
//! % sys.t,\tsys.t # table_name
//! % id,\tname # name
//! % int,\tvarchar # type
//! % 1,\t5 # length
//! % 32 0,\t5 0 # typesizes
//! [ 1,\t"alpha"\t]
//! [ 2,\t"beta"\t]
//! [ 3,\tNULL\t]
//! ```
//!
//! The first reply carries at most `reply_size` rows; the rest are pulled
//! with `Xexport` and arrive as `&6` blocks.

use std::sync::Arc;

use crate::buffer::ReadBuffer;
use crate::constants::header;
use crate::error::{Error, Result};
use crate::messages::{server_error, ResponseKind};
use crate::packet::Frame;
use crate::row::{Row, RowDecoder};
use crate::statement::ColumnInfo;
use crate::types::{MonetType, TypeModifier};

/// What a command produced
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// A table of rows
    Rows(ResultSet),
    /// Rows affected by DML
    Update {
        /// Number of affected rows
        affected: i64,
        /// Last generated identity value, if any
        last_id: Option<i64>,
    },
    /// DDL completed
    Schema,
    /// Auto-commit mode changed (transaction started or ended)
    Transaction {
        /// Auto-commit state after the command
        auto_commit: bool,
    },
    /// A prepared statement description
    Prepared(ResultSet),
    /// The command produced no reply payload
    Empty,
}

impl QueryOutcome {
    /// Take the result set, if this outcome has one
    pub fn into_result_set(self) -> Option<ResultSet> {
        match self {
            QueryOutcome::Rows(rs) | QueryOutcome::Prepared(rs) => Some(rs),
            _ => None,
        }
    }

    /// Number of affected rows for DML outcomes
    pub fn affected_rows(&self) -> Option<i64> {
        match self {
            QueryOutcome::Update { affected, .. } => Some(*affected),
            _ => None,
        }
    }
}

/// Decoded output of one query
///
/// Rows keep the order the server sent them in. Rows beyond the first
/// reply are fetched with [`crate::Connection::fetch_more`]; the result set
/// becomes invalid once another command runs on its connection.
#[derive(Debug, Clone)]
pub struct ResultSet {
    query_id: i64,
    columns: Arc<[ColumnInfo]>,
    rows: Vec<Row>,
    total_rows: u64,
    fetched: u64,
    pub(crate) connection_id: u64,
    pub(crate) generation: u64,
}

impl ResultSet {
    /// Create a result set from already decoded parts
    pub fn new(query_id: i64, columns: Vec<ColumnInfo>, rows: Vec<Row>, total_rows: u64) -> Self {
        let fetched = rows.len() as u64;
        Self {
            query_id,
            columns: columns.into(),
            rows,
            total_rows,
            fetched,
            connection_id: 0,
            generation: 0,
        }
    }

    /// Column descriptors in result order
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Index of the column named `name` (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Rows received so far
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take the buffered rows, leaving the result set empty
    ///
    /// The fetch position is kept, so [`crate::Connection::fetch_more`]
    /// continues after the taken rows.
    pub fn take_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    /// Server-side id used by `export` and `close`
    pub fn query_id(&self) -> i64 {
        self.query_id
    }

    /// Total number of rows the query produced
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Rows received from the server so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Whether the server holds rows not yet fetched
    pub fn has_more(&self) -> bool {
        self.fetched < self.total_rows
    }

    /// Command generation this result belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn append_rows(&mut self, rows: Vec<Row>) {
        self.fetched += rows.len() as u64;
        self.rows.extend(rows);
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Parse the whitespace-separated numbers after a `&N` marker
fn parse_numbers(line: &str, expected: usize) -> Result<Vec<i64>> {
    let numbers: Vec<i64> = line[2..]
        .split_whitespace()
        .take(expected)
        .map(|n| n.parse())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::decode(format!("malformed reply line: {:?}", line)))?;
    if numbers.len() < expected {
        return Err(Error::decode(format!(
            "reply line has {} fields, expected {}: {:?}",
            numbers.len(),
            expected,
            line
        )));
    }
    Ok(numbers)
}

fn to_count(n: i64, what: &str) -> Result<u64> {
    u64::try_from(n).map_err(|_| Error::decode(format!("negative {}: {}", what, n)))
}

/// Split `% a,\tb # name` into `("name", ["a", "b"])`
fn parse_header_line(line: &str) -> Result<(&str, Vec<&str>)> {
    let body = line.strip_prefix('%').unwrap_or(line);
    let (values, name) = body
        .rsplit_once(" # ")
        .ok_or_else(|| Error::decode(format!("malformed header line: {:?}", line)))?;
    let values = values.strip_prefix(' ').unwrap_or(values);
    Ok((name.trim(), values.split(",\t").collect()))
}

/// Builds column descriptors from the `%` header lines
#[derive(Default)]
struct HeaderSet<'a> {
    table_names: Option<Vec<&'a str>>,
    names: Option<Vec<&'a str>>,
    types: Option<Vec<&'a str>>,
    lengths: Option<Vec<&'a str>>,
    typesizes: Option<Vec<&'a str>>,
}

impl<'a> HeaderSet<'a> {
    fn add(&mut self, line: &'a str, column_count: usize) -> Result<()> {
        let (name, values) = parse_header_line(line)?;
        if values.len() != column_count {
            return Err(Error::decode(format!(
                "header '{}' lists {} columns, expected {}",
                name,
                values.len(),
                column_count
            )));
        }

        match name {
            header::TABLE_NAME => self.table_names = Some(values),
            header::NAME => self.names = Some(values),
            header::TYPE => self.types = Some(values),
            header::LENGTH => self.lengths = Some(values),
            header::TYPESIZES => self.typesizes = Some(values),
            other => tracing::trace!(header = other, "ignoring header line"),
        }
        Ok(())
    }

    fn build(self, column_count: usize) -> Result<Vec<ColumnInfo>> {
        let names = self
            .names
            .ok_or_else(|| Error::decode("table reply without name header"))?;
        let types = self
            .types
            .ok_or_else(|| Error::decode("table reply without type header"))?;

        (0..column_count)
            .map(|i| {
                let type_tag = MonetType::parse(types[i])?;
                let modifier = match &self.typesizes {
                    Some(sizes) => TypeModifier::parse_typesize(sizes[i])?,
                    None => TypeModifier::default(),
                };
                let length = match &self.lengths {
                    Some(lengths) => lengths[i]
                        .trim()
                        .parse()
                        .map_err(|_| Error::decode(format!("invalid length: {:?}", lengths[i])))?,
                    None => 0,
                };
                Ok(ColumnInfo {
                    name: names[i].to_string(),
                    table: self
                        .table_names
                        .as_ref()
                        .map(|t| t[i].to_string())
                        .unwrap_or_default(),
                    type_tag,
                    modifier,
                    length,
                    nullable: true,
                })
            })
            .collect()
    }
}

/// Decoder for query replies
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultDecoder;

impl ResultDecoder {
    /// Decode the reply to a query or control command
    pub fn decode(frame: &Frame) -> Result<QueryOutcome> {
        let mut buf = ReadBuffer::new(frame.payload.clone());
        Self::check_errors(&buf)?;

        while let Some(line) = buf.read_line()?.map(str::to_string) {
            let line = line.as_str();
            match ResponseKind::classify(line) {
                ResponseKind::Prompt | ResponseKind::Info => continue,
                ResponseKind::Table => {
                    let (rs, _) = Self::decode_table(line, &mut buf)?;
                    return Ok(QueryOutcome::Rows(rs));
                }
                ResponseKind::Prepare => {
                    let (rs, _) = Self::decode_table(line, &mut buf)?;
                    return Ok(QueryOutcome::Prepared(rs));
                }
                ResponseKind::Update => {
                    let numbers = parse_numbers(line, 2)?;
                    return Ok(QueryOutcome::Update {
                        affected: numbers[0],
                        last_id: (numbers[1] >= 0).then_some(numbers[1]),
                    });
                }
                ResponseKind::Schema => return Ok(QueryOutcome::Schema),
                ResponseKind::Transaction => {
                    let auto_commit = match line[2..].trim() {
                        "t" => true,
                        "f" => false,
                        other => {
                            return Err(Error::decode(format!(
                                "invalid transaction flag: {:?}",
                                other
                            )))
                        }
                    };
                    return Ok(QueryOutcome::Transaction { auto_commit });
                }
                ResponseKind::Block => {
                    return Err(Error::UnexpectedResponse(
                        "continuation block without an open result".to_string(),
                    ))
                }
                _ => {
                    return Err(Error::decode(format!("unexpected reply line: {:?}", line)));
                }
            }
        }

        Ok(QueryOutcome::Empty)
    }

    /// Decode an `&6` reply and append its rows to `rs`
    ///
    /// Returns the number of rows added.
    pub fn decode_block(frame: &Frame, rs: &mut ResultSet) -> Result<usize> {
        let mut buf = ReadBuffer::new(frame.payload.clone());
        Self::check_errors(&buf)?;

        buf.skip_lines_with(b'#')?;
        let line = buf.expect_line("block header")?;
        if ResponseKind::classify(line) != ResponseKind::Block {
            return Err(Error::UnexpectedResponse(format!(
                "expected continuation block, got {:?}",
                line
            )));
        }

        // &6 query_id column_count row_count offset
        let numbers = parse_numbers(line, 4)?;
        let (query_id, column_count, row_count, offset) =
            (numbers[0], numbers[1], numbers[2], numbers[3]);

        if query_id != rs.query_id {
            return Err(Error::decode(format!(
                "block for query {} while reading query {}",
                query_id, rs.query_id
            )));
        }
        if to_count(column_count, "column count")? != rs.column_count() as u64 {
            return Err(Error::decode(format!(
                "block has {} columns, result has {}",
                column_count,
                rs.column_count()
            )));
        }
        if to_count(offset, "offset")? != rs.fetched {
            return Err(Error::decode(format!(
                "block starts at row {}, expected {}",
                offset, rs.fetched
            )));
        }

        let expected = to_count(row_count, "row count")? as usize;
        let rows = Self::decode_rows(&mut buf, &rs.columns, expected)?;
        let added = rows.len();
        rs.append_rows(rows);
        Ok(added)
    }

    /// Fail with a server error if the reply contains `!` lines
    fn check_errors(buf: &ReadBuffer) -> Result<()> {
        let text = std::str::from_utf8(buf.remaining_slice())
            .map_err(|e| Error::decode(format!("invalid UTF-8 in reply: {}", e)))?;
        let errors: Vec<&str> = text.lines().filter(|l| l.starts_with('!')).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(server_error(errors))
        }
    }

    /// Decode `&1`/`&5` and the header and tuple lines that follow
    fn decode_table(line: &str, buf: &mut ReadBuffer) -> Result<(ResultSet, usize)> {
        // &1 query_id row_count column_count tuple_count
        let numbers = parse_numbers(line, 4)?;
        let query_id = numbers[0];
        let total_rows = to_count(numbers[1], "row count")?;
        let column_count = to_count(numbers[2], "column count")? as usize;
        let tuple_count = to_count(numbers[3], "tuple count")? as usize;

        let mut headers = HeaderSet::default();
        let mut header_lines = Vec::new();
        while buf.peek_u8() == Some(b'%') {
            header_lines.push(buf.expect_line("header")?.to_string());
        }
        for l in &header_lines {
            headers.add(l, column_count)?;
        }
        let columns = headers.build(column_count)?;

        let rows = Self::decode_rows(buf, &columns, tuple_count)?;
        let received = rows.len();
        tracing::trace!(query_id, total_rows, columns = column_count, rows = received, "decoded table");

        Ok((ResultSet::new(query_id, columns, rows, total_rows), received))
    }

    /// Decode exactly `expected` tuple lines
    fn decode_rows(buf: &mut ReadBuffer, columns: &[ColumnInfo], expected: usize) -> Result<Vec<Row>> {
        let decoder = RowDecoder::new(columns);
        // the count comes off the wire; each tuple line takes at least two bytes
        let mut rows = Vec::with_capacity(expected.min(buf.remaining() / 2 + 1));

        while rows.len() < expected {
            let line = buf.expect_line("tuple")?;
            match ResponseKind::classify(line) {
                ResponseKind::Tuple => rows.push(decoder.decode_row(line)?),
                ResponseKind::Value => rows.push(decoder.decode_value_line(line)?),
                ResponseKind::Info => continue,
                _ => return Err(Error::decode(format!("expected tuple, got {:?}", line))),
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;
    use bytes::Bytes;

    fn frame(text: &str) -> Frame {
        Frame::new(Bytes::copy_from_slice(text.as_bytes()), 1)
    }

    const TABLE: &str = "&1 7 3 2 2\n\
        % sys.t,\tsys.t # table_name\n\
        % id,\tname # name\n\
        % int,\tvarchar # type\n\
        % 1,\t5 # length\n\
        % 32 0,\t5 0 # typesizes\n\
        [ 1,\t\"alpha\"\t]\n\
        [ NULL,\t\"beta\"\t]\n";

    #[test]
    fn test_decode_table() {
        let outcome = ResultDecoder::decode(&frame(TABLE)).unwrap();
        let QueryOutcome::Rows(rs) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(rs.query_id(), 7);
        assert_eq!(rs.column_count(), 2);
        assert_eq!(rs.columns()[0].name, "id");
        assert_eq!(rs.columns()[0].table, "sys.t");
        assert_eq!(rs.columns()[1].type_tag, MonetType::Varchar);
        assert_eq!(rs.columns()[1].length, 5);
        assert_eq!(rs.columns()[0].precision(), 32);
        assert_eq!(rs.total_rows(), 3);
        assert_eq!(rs.fetched(), 2);
        assert!(rs.has_more());
        assert_eq!(rs.rows()[0][0], Value::Int(1));
        assert_eq!(rs.rows()[1][0], Value::Null);
        assert_eq!(rs.rows()[1].get_string(1), Some("beta"));
    }

    #[test]
    fn test_decode_decimal_typesizes() {
        let text = "&1 1 1 1 1\n% t # table_name\n% price # name\n% decimal # type\n% 12 # length\n% 10 2 # typesizes\n[ 12.50\t]\n";
        let QueryOutcome::Rows(rs) = ResultDecoder::decode(&frame(text)).unwrap() else {
            panic!("expected rows");
        };
        let col = &rs.columns()[0];
        assert_eq!((col.precision(), col.scale()), (10, 2));
        assert_eq!(rs.rows()[0][0].to_string(), "12.50");
    }

    #[test]
    fn test_decode_block_appends() {
        let QueryOutcome::Rows(mut rs) = ResultDecoder::decode(&frame(TABLE)).unwrap() else {
            panic!("expected rows");
        };
        let added = ResultDecoder::decode_block(&frame("&6 7 2 1 2\n[ 3,\tNULL\t]\n"), &mut rs)
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(rs.fetched(), 3);
        assert!(!rs.has_more());
        let ids: Vec<_> = rs.rows().iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Null, Value::Int(3)]);
    }

    #[test]
    fn test_decode_block_rejects_wrong_offset() {
        let QueryOutcome::Rows(mut rs) = ResultDecoder::decode(&frame(TABLE)).unwrap() else {
            panic!("expected rows");
        };
        assert!(ResultDecoder::decode_block(&frame("&6 7 2 1 0\n[ 3,\tNULL\t]\n"), &mut rs).is_err());
        assert!(ResultDecoder::decode_block(&frame("&6 8 2 1 2\n[ 3,\tNULL\t]\n"), &mut rs).is_err());
    }

    #[test]
    fn test_decode_update() {
        let outcome = ResultDecoder::decode(&frame("&2 5 -1\n")).unwrap();
        assert_eq!(outcome.affected_rows(), Some(5));
        assert!(matches!(outcome, QueryOutcome::Update { last_id: None, .. }));

        let outcome = ResultDecoder::decode(&frame("&2 1 42 3 120\n")).unwrap();
        assert!(matches!(outcome, QueryOutcome::Update { affected: 1, last_id: Some(42) }));
    }

    #[test]
    fn test_decode_schema_and_transaction() {
        assert!(matches!(
            ResultDecoder::decode(&frame("&3 14 2\n")).unwrap(),
            QueryOutcome::Schema
        ));
        assert!(matches!(
            ResultDecoder::decode(&frame("&4 f\n")).unwrap(),
            QueryOutcome::Transaction { auto_commit: false }
        ));
        assert!(matches!(
            ResultDecoder::decode(&frame("")).unwrap(),
            QueryOutcome::Empty
        ));
    }

    #[test]
    fn test_decode_server_error() {
        let err = ResultDecoder::decode(&frame("!42000!syntax error, unexpected IDENT\n")).unwrap_err();
        assert!(matches!(err, Error::Server { ref code, .. } if code.as_deref() == Some("42000")));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_column_type() {
        let text = "&1 1 1 1 0\n% t # table_name\n% g # name\n% geometry # type\n% 0 # length\n";
        let err = ResultDecoder::decode(&frame(text)).unwrap_err();
        assert!(matches!(err, Error::UnknownType(ref t) if t == "geometry"));
    }

    #[test]
    fn test_header_count_mismatch() {
        let text = "&1 1 1 2 0\n% a # name\n% int,\tint # type\n";
        assert!(matches!(
            ResultDecoder::decode(&frame(text)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_huge_tuple_count_is_decode_error() {
        let text = "&1 1 1 1 9223372036854775807\n% a # name\n% int # type\n[ 1\t]\n";
        assert!(matches!(
            ResultDecoder::decode(&frame(text)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_huge_block_row_count_is_decode_error() {
        let QueryOutcome::Rows(mut rs) = ResultDecoder::decode(&frame(TABLE)).unwrap() else {
            panic!("expected rows");
        };
        let err = ResultDecoder::decode_block(
            &frame("&6 7 2 9223372036854775807 2\n[ 3,\tNULL\t]\n"),
            &mut rs,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {:?}", err);
        assert_eq!(rs.fetched(), 2);
    }

    #[test]
    fn test_missing_tuples() {
        let text = "&1 1 2 1 2\n% a # name\n% int # type\n[ 1\t]\n";
        assert!(ResultDecoder::decode(&frame(text)).is_err());
    }
}
