//! Row data handling for MonetDB query results
//!
//! This module provides types and functions for:
//! - Splitting tuple lines (`[ 1,\t"a",\tNULL\t]`) into fields
//! - Representing column values in a type-safe manner
//! - Converting the server's text forms to Rust types

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::constants::NULL_LITERAL;
use crate::error::{Error, Result};
use crate::statement::ColumnInfo;
use crate::types::{
    decode_blob, parse_date, parse_interval, parse_time, parse_time_tz, parse_timestamp,
    parse_timestamp_tz, Decimal, Inet, MonetType, TimeTz,
};

/// Represents a value from a MonetDB column.
///
/// SQL NULL is always [`Value::Null`], whatever the column type.
///
/// # Example
///
/// ```rust
/// use monetdb_rs::Value;
///
/// fn describe(value: &Value) -> String {
///     match value {
///         Value::Null => "NULL".to_string(),
///         Value::Text(s) => format!("text: {}", s),
///         Value::Int(i) => format!("int: {}", i),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// BOOLEAN
    Bool(bool),
    /// TINYINT, SMALLINT, INT, BIGINT, OID
    Int(i64),
    /// HUGEINT
    HugeInt(i128),
    /// REAL, DOUBLE
    Double(f64),
    /// DECIMAL
    Decimal(Decimal),
    /// CHAR, VARCHAR, CLOB
    Text(String),
    /// URL
    Url(String),
    /// BLOB
    Blob(Vec<u8>),
    /// DATE
    Date(NaiveDate),
    /// TIME
    Time(NaiveTime),
    /// TIME WITH TIME ZONE
    TimeTz(TimeTz),
    /// TIMESTAMP
    Timestamp(NaiveDateTime),
    /// TIMESTAMP WITH TIME ZONE
    TimestampTz(DateTime<FixedOffset>),
    /// Second and day intervals
    Interval(Duration),
    /// Month interval, in months
    MonthInterval(i32),
    /// UUID
    Uuid(Uuid),
    /// INET
    Inet(Inet),
    /// JSON
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::HugeInt(i) => i64::try_from(*i).ok(),
            Value::Decimal(d) => d.to_i128().and_then(|i| i64::try_from(i).ok()),
            _ => None,
        }
    }

    /// Try to get as a float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    /// Try to get as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to get as a decimal
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// Try to get as a timestamp
    pub fn as_timestamp(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    /// Try to get as a JSON value
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Try to get as a UUID
    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::HugeInt(i) => write!(f, "{}", i),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) | Value::Url(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::TimeTz(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::TimestampTz(ts) => write!(f, "{}", ts),
            Value::Interval(d) => write!(f, "{}", d),
            Value::MonthInterval(m) => write!(f, "{} months", m),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Inet(i) => write!(f, "{}", i),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row of data from a query result
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    names: Option<Arc<[String]>>,
}

impl Row {
    /// Create a new row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            names: None,
        }
    }

    /// Create a row whose values can be looked up by column name
    pub fn with_names(values: Vec<Value>, names: Arc<[String]>) -> Self {
        Self {
            values,
            names: Some(names),
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let names = self.names.as_ref()?;
        let index = names.iter().position(|n| n.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    /// All values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row and return its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Get a string value by index
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Get an integer value by index
    pub fn get_i64(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_i64)
    }

    /// Get a float value by index
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(Value::as_f64)
    }

    /// Check if the value at index is NULL
    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).map(Value::is_null).unwrap_or(true)
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

/// One field of a tuple line before type conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<'a> {
    /// The unquoted `NULL` literal
    Null,
    /// Unquoted text (numbers, dates, ...)
    Raw(&'a str),
    /// Quoted string with escapes resolved
    Quoted(String),
}

impl Field<'_> {
    fn text(&self) -> &str {
        match self {
            Field::Null => NULL_LITERAL,
            Field::Raw(s) => s,
            Field::Quoted(s) => s,
        }
    }
}

/// Split a tuple line into fields
///
/// Fields are separated by `,\t`; the line is wrapped in `[ ` and `\t]`.
pub fn split_tuple(line: &str) -> Result<Vec<Field<'_>>> {
    let body = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| Error::decode(format!("malformed tuple line: {:?}", truncate(line))))?;
    let body = body.strip_prefix(' ').unwrap_or(body);
    let body = body.strip_suffix('\t').unwrap_or(body);

    let mut fields = Vec::new();
    let mut rest = body;
    loop {
        let (field, after) = if rest.starts_with('"') {
            let (value, consumed) = unquote(rest)?;
            (Field::Quoted(value), &rest[consumed..])
        } else {
            let end = rest.find(",\t").unwrap_or(rest.len());
            let raw = &rest[..end];
            let field = if raw == NULL_LITERAL {
                Field::Null
            } else {
                Field::Raw(raw)
            };
            (field, &rest[end..])
        };
        fields.push(field);

        if after.is_empty() {
            break;
        }
        rest = after.strip_prefix(",\t").ok_or_else(|| {
            Error::decode(format!("missing field separator in tuple: {:?}", truncate(line)))
        })?;
    }

    Ok(fields)
}

/// Parse a quoted string starting at `s[0] == '"'`
///
/// Returns the unescaped value and the number of bytes consumed, including
/// both quotes.
fn unquote(s: &str) -> Result<(String, usize)> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::new();
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let value = String::from_utf8(out)
                    .map_err(|e| Error::decode(format!("invalid UTF-8 in string value: {}", e)))?;
                return Ok((value, i + 1));
            }
            b'\\' => {
                let escaped = *bytes
                    .get(i + 1)
                    .ok_or_else(|| Error::decode("dangling escape in string value"))?;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'f' => out.push(0x0c),
                    b'0'..=b'7' => {
                        let digits = bytes
                            .get(i + 1..i + 4)
                            .filter(|d| d.iter().all(|b| (b'0'..=b'7').contains(b)))
                            .ok_or_else(|| Error::decode("malformed octal escape in string value"))?;
                        let code = digits
                            .iter()
                            .fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                        let byte = u8::try_from(code)
                            .map_err(|_| Error::decode("octal escape out of range"))?;
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                    other => out.push(other),
                }
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Err(Error::decode("unterminated string value"))
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(80) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Convert one field to a value of the column's type
pub fn decode_field(field: &Field<'_>, column: &ColumnInfo) -> Result<Value> {
    if matches!(field, Field::Null) {
        return Ok(Value::Null);
    }

    let text = field.text();
    let conversion_error = || Error::DataConversion {
        value: text.to_string(),
        type_name: column.type_tag.to_string(),
    };

    let value = match column.type_tag {
        MonetType::Boolean => match text {
            "true" | "t" | "1" => Value::Bool(true),
            "false" | "f" | "0" => Value::Bool(false),
            _ => return Err(conversion_error()),
        },
        MonetType::TinyInt | MonetType::SmallInt | MonetType::Int | MonetType::BigInt => {
            Value::Int(text.parse().map_err(|_| conversion_error())?)
        }
        // oids print as `42@0`
        MonetType::Oid => {
            let digits = text.split_once('@').map(|(n, _)| n).unwrap_or(text);
            Value::Int(digits.parse().map_err(|_| conversion_error())?)
        }
        MonetType::HugeInt => Value::HugeInt(text.parse().map_err(|_| conversion_error())?),
        MonetType::Real | MonetType::Double => {
            Value::Double(text.parse().map_err(|_| conversion_error())?)
        }
        MonetType::Decimal => {
            let d: Decimal = text.parse()?;
            let scale = column.scale();
            Value::Decimal(if scale > 0 { d.rescale(scale).unwrap_or(d) } else { d })
        }
        MonetType::Char | MonetType::Varchar | MonetType::Clob => Value::Text(text.to_string()),
        MonetType::Url => Value::Url(text.to_string()),
        MonetType::Json => {
            Value::Json(serde_json::from_str(text).map_err(|_| conversion_error())?)
        }
        MonetType::Blob => Value::Blob(decode_blob(text)?),
        MonetType::Date => Value::Date(parse_date(text)?),
        MonetType::Time => Value::Time(parse_time(text)?),
        MonetType::TimeTz => Value::TimeTz(parse_time_tz(text)?),
        MonetType::Timestamp => Value::Timestamp(parse_timestamp(text)?),
        MonetType::TimestampTz => Value::TimestampTz(parse_timestamp_tz(text)?),
        MonetType::SecInterval | MonetType::DayInterval => Value::Interval(parse_interval(text)?),
        MonetType::MonthInterval => {
            Value::MonthInterval(text.parse().map_err(|_| conversion_error())?)
        }
        MonetType::Uuid => Value::Uuid(Uuid::parse_str(text).map_err(|_| conversion_error())?),
        MonetType::Inet => Value::Inet(text.parse()?),
    };

    Ok(value)
}

/// Decodes tuple lines against a fixed column list
pub struct RowDecoder<'a> {
    columns: &'a [ColumnInfo],
    names: Arc<[String]>,
}

impl<'a> RowDecoder<'a> {
    /// Create a decoder for `columns`
    pub fn new(columns: &'a [ColumnInfo]) -> Self {
        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
        Self { columns, names }
    }

    /// Decode one `[ ... ]` tuple line
    ///
    /// The row must have exactly one value per column.
    pub fn decode_row(&self, line: &str) -> Result<Row> {
        let fields = split_tuple(line)?;
        if fields.len() != self.columns.len() {
            return Err(Error::decode(format!(
                "row has {} values but result has {} columns",
                fields.len(),
                self.columns.len()
            )));
        }

        let values = fields
            .iter()
            .zip(self.columns)
            .map(|(field, column)| decode_field(field, column))
            .collect::<Result<Vec<_>>>()?;

        Ok(Row::with_names(values, Arc::clone(&self.names)))
    }

    /// Decode a single unsliced `=value` line into a one-column row
    pub fn decode_value_line(&self, line: &str) -> Result<Row> {
        let [column] = self.columns else {
            return Err(Error::decode(format!(
                "single value line for a result with {} columns",
                self.columns.len()
            )));
        };
        let raw = line.strip_prefix('=').unwrap_or(line);
        let field = if raw == NULL_LITERAL {
            Field::Null
        } else if raw.starts_with('"') {
            Field::Quoted(unquote(raw)?.0)
        } else {
            Field::Raw(raw)
        };
        let value = decode_field(&field, column)?;
        Ok(Row::with_names(vec![value], Arc::clone(&self.names)))
    }
}
