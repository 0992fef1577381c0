//! Date, time and interval values
//!
//! Text forms used by the server:
//!
//! | Type | Example |
//! |------|---------|
//! | date | `2024-01-15` |
//! | time | `13:45:30.250000` |
//! | timetz | `13:45:30.000000+01:00` |
//! | timestamp | `2024-01-15 13:45:30.000000` |
//! | timestamptz | `2024-01-15 13:45:30.000000+01:00` |
//! | sec_interval, day_interval | `3600.500` (seconds) |

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

use super::decimal::Decimal;

/// Time of day with a UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTz {
    /// Local time
    pub time: NaiveTime,
    /// Offset from UTC
    pub offset: FixedOffset,
}

impl fmt::Display for TimeTz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.time, self.offset)
    }
}

fn conversion_error(value: &str, type_name: &str) -> Error {
    Error::DataConversion {
        value: value.to_string(),
        type_name: type_name.to_string(),
    }
}

/// Parse a `date` value
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| conversion_error(s, "date"))
}

/// Parse a `time` value
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| conversion_error(s, "time"))
}

/// Parse a `timetz` value
pub fn parse_time_tz(s: &str) -> Result<TimeTz> {
    let split = s
        .rfind(['+', '-'])
        .filter(|&i| i > 0)
        .ok_or_else(|| conversion_error(s, "timetz"))?;
    let (time, offset) = s.split_at(split);

    Ok(TimeTz {
        time: parse_time(time).map_err(|_| conversion_error(s, "timetz"))?,
        offset: parse_offset(offset).ok_or_else(|| conversion_error(s, "timetz"))?,
    })
}

/// Parse a `timestamp` value
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|_| conversion_error(s, "timestamp"))
}

/// Parse a `timestamptz` value
pub fn parse_timestamp_tz(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z")
        .map_err(|_| conversion_error(s, "timestamptz"))
}

/// Parse a `sec_interval` or `day_interval` value (seconds, millisecond precision)
pub fn parse_interval(s: &str) -> Result<Duration> {
    let seconds: Decimal = s.parse().map_err(|_| conversion_error(s, "interval"))?;
    let millis = seconds
        .rescale(3)
        .and_then(|d| i64::try_from(d.unscaled()).ok())
        .ok_or_else(|| conversion_error(s, "interval"))?;
    Duration::try_milliseconds(millis).ok_or_else(|| conversion_error(s, "interval"))
}

/// Parse `+HH:MM`, `+HHMM` or `+HH`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_date() {
        let d = parse_date("2024-01-15").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));
        assert!(parse_date("2024-13-01").is_err());
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("13:45:30.250000").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (13, 45, 30));
        assert_eq!(t.nanosecond(), 250_000_000);
        assert!(parse_time("13:45:30").is_ok());
    }

    #[test]
    fn test_parse_time_tz() {
        let t = parse_time_tz("13:45:30.000000+01:00").unwrap();
        assert_eq!(t.offset.local_minus_utc(), 3600);
        let t = parse_time_tz("08:00:00-05:30").unwrap();
        assert_eq!(t.offset.local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(parse_time_tz("13:45:30").is_err());
    }

    #[test]
    fn test_parse_timestamps() {
        let ts = parse_timestamp("2024-01-15 13:45:30.000000").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        let tz = parse_timestamp_tz("2024-01-15 13:45:30.000000+02:00").unwrap();
        assert_eq!(tz.offset().local_minus_utc(), 7200);
        assert_eq!(tz.naive_utc().hour(), 11);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("3600.500").unwrap(), Duration::milliseconds(3_600_500));
        assert_eq!(parse_interval("-1.000").unwrap(), Duration::milliseconds(-1000));
        assert_eq!(parse_interval("86400").unwrap(), Duration::days(1));
        assert!(parse_interval("1.0005").is_err());
    }
}
