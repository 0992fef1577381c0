//! MonetDB column types and text value parsing
//!
//! Result headers name each column's SQL type as a lowercase tag
//! (`int`, `decimal`, `timestamptz`, ...). [`MonetType`] is the closed set
//! of tags this driver can decode; the submodules parse the text form the
//! server uses for values of those types.

mod binary;
mod decimal;
mod inet;
mod temporal;

pub use binary::{decode_blob, encode_blob};
pub use decimal::Decimal;
pub use inet::Inet;
pub use temporal::{
    parse_date, parse_interval, parse_time, parse_time_tz, parse_timestamp, parse_timestamp_tz,
    TimeTz,
};

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Column type as reported in the `type` header line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MonetType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    HugeInt,
    Oid,
    Real,
    Double,
    Decimal,
    Char,
    Varchar,
    Clob,
    Blob,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    SecInterval,
    DayInterval,
    MonthInterval,
    Uuid,
    Inet,
    Url,
    Json,
}

impl MonetType {
    /// Look up a wire type tag
    ///
    /// Unknown tags are an error; they are never treated as strings.
    pub fn parse(tag: &str) -> Result<Self> {
        let ty = match tag.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => MonetType::Boolean,
            "tinyint" => MonetType::TinyInt,
            "smallint" => MonetType::SmallInt,
            "int" | "integer" | "mediumint" => MonetType::Int,
            "bigint" | "serial" | "bigserial" => MonetType::BigInt,
            "hugeint" => MonetType::HugeInt,
            "oid" | "wrd" => MonetType::Oid,
            "real" => MonetType::Real,
            "double" | "float" => MonetType::Double,
            "decimal" | "numeric" => MonetType::Decimal,
            "char" | "character" => MonetType::Char,
            "varchar" => MonetType::Varchar,
            "clob" | "text" | "string" | "str" => MonetType::Clob,
            "blob" => MonetType::Blob,
            "date" => MonetType::Date,
            "time" => MonetType::Time,
            "timetz" => MonetType::TimeTz,
            "timestamp" => MonetType::Timestamp,
            "timestamptz" => MonetType::TimestampTz,
            "sec_interval" => MonetType::SecInterval,
            "day_interval" => MonetType::DayInterval,
            "month_interval" => MonetType::MonthInterval,
            "uuid" => MonetType::Uuid,
            "inet" => MonetType::Inet,
            "url" => MonetType::Url,
            "json" => MonetType::Json,
            _ => return Err(Error::UnknownType(tag.to_string())),
        };
        Ok(ty)
    }

    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            MonetType::Boolean => "boolean",
            MonetType::TinyInt => "tinyint",
            MonetType::SmallInt => "smallint",
            MonetType::Int => "int",
            MonetType::BigInt => "bigint",
            MonetType::HugeInt => "hugeint",
            MonetType::Oid => "oid",
            MonetType::Real => "real",
            MonetType::Double => "double",
            MonetType::Decimal => "decimal",
            MonetType::Char => "char",
            MonetType::Varchar => "varchar",
            MonetType::Clob => "clob",
            MonetType::Blob => "blob",
            MonetType::Date => "date",
            MonetType::Time => "time",
            MonetType::TimeTz => "timetz",
            MonetType::Timestamp => "timestamp",
            MonetType::TimestampTz => "timestamptz",
            MonetType::SecInterval => "sec_interval",
            MonetType::DayInterval => "day_interval",
            MonetType::MonthInterval => "month_interval",
            MonetType::Uuid => "uuid",
            MonetType::Inet => "inet",
            MonetType::Url => "url",
            MonetType::Json => "json",
        }
    }

    /// Storage width in bytes for integer types
    pub fn integer_width(&self) -> Option<u8> {
        match self {
            MonetType::TinyInt => Some(1),
            MonetType::SmallInt => Some(2),
            MonetType::Int => Some(4),
            MonetType::BigInt | MonetType::Oid => Some(8),
            MonetType::HugeInt => Some(16),
            _ => None,
        }
    }

    /// Whether values are sent as quoted, escaped strings
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            MonetType::Char | MonetType::Varchar | MonetType::Clob | MonetType::Url | MonetType::Json
        )
    }
}

impl fmt::Display for MonetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MonetType::parse(s)
    }
}

/// Packed precision and scale of a column
///
/// Layout: bits 0-15 hold the scale, bits 16-31 the precision (digits for
/// decimals, display width for other types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeModifier(u32);

impl TypeModifier {
    /// Pack a precision and scale
    pub fn new(precision: u16, scale: u16) -> Self {
        TypeModifier(((precision as u32) << 16) | scale as u32)
    }

    /// Wrap an already packed value
    pub fn from_raw(raw: u32) -> Self {
        TypeModifier(raw)
    }

    /// Packed value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Digits (or width)
    pub fn precision(&self) -> u16 {
        ((self.0 >> 16) & 0xffff) as u16
    }

    /// Digits after the decimal point
    pub fn scale(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Parse one `typesizes` entry (`"digits scale"`)
    pub fn parse_typesize(entry: &str) -> Result<Self> {
        let mut parts = entry.split_whitespace();
        let precision = parse_u16(parts.next(), entry)?;
        let scale = parse_u16(parts.next(), entry)?;
        if parts.next().is_some() {
            return Err(Error::decode(format!("malformed typesizes entry: {:?}", entry)));
        }
        Ok(TypeModifier::new(precision, scale))
    }
}

fn parse_u16(part: Option<&str>, entry: &str) -> Result<u16> {
    part.and_then(|p| p.parse().ok())
        .ok_or_else(|| Error::decode(format!("malformed typesizes entry: {:?}", entry)))
}
