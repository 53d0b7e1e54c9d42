//! Deterministic name mapping and SQL literal formatting.
//!
//! This module is the single place that renders SQL literals. The write and
//! search engines compose statements out of identifiers produced by the
//! naming functions and values rendered by [`SqlValue::to_literal`]; nothing
//! else in the crate quotes or escapes by hand.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Timelike, Utc};

use crate::error::{StoreError, StoreResult};

/// The SQL dialect of the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded file database (rusqlite).
    Sqlite,
    /// Networked PostgreSQL.
    Postgres,
}

/// Physical table for a resource type: `Patient` -> `PatientTable`.
pub fn table_name(resource_type: &str) -> String {
    format!("{resource_type}Table")
}

/// Primary key column for a resource type: `Patient` -> `PATIENTTABLE_ID`.
pub fn primary_key(resource_type: &str) -> String {
    format!("{}TABLE_ID", resource_type.to_uppercase())
}

/// Column name for a search parameter: `general-practitioner` -> `GENERAL_PRACTITIONER`.
pub fn column_name(param: &str) -> String {
    param.replace('-', "_").to_uppercase()
}

/// Inverse of [`column_name`]: `GENERAL_PRACTITIONER` -> `general-practitioner`.
pub fn param_name(column: &str) -> String {
    column.replace('_', "-").to_lowercase()
}

/// Quotes a text value as a SQL string literal with `''` escaping.
pub fn quote_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders a byte blob as a dialect-specific binary literal.
pub fn binary_literal(dialect: Dialect, bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{b:02x}");
    }
    match dialect {
        Dialect::Sqlite => format!("X'{hex}'"),
        Dialect::Postgres => format!("decode('{hex}', 'hex')"),
    }
}

/// ISO-8601 instant with millisecond precision, used for `meta.lastUpdated`.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a timestamp as the backends hand it back (space- or T-separated,
/// optional fractional seconds, optional offset).
pub fn parse_db_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// A value on its way into a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Bool(bool),
    Int(i64),
    Number(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Renders the value as a SQL literal for the given dialect.
    ///
    /// Timestamps are clamped to millisecond precision with seconds held in
    /// `[00.000, 59.999]`. Non-finite numbers cannot be represented and fail
    /// with a format error.
    pub fn to_literal(&self, dialect: Dialect) -> StoreResult<String> {
        match self {
            SqlValue::Null => Ok("NULL".to_string()),
            SqlValue::Text(s) => Ok(quote_text(s)),
            SqlValue::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            SqlValue::Int(i) => Ok(i.to_string()),
            SqlValue::Number(n) => {
                if n.is_finite() {
                    Ok(n.to_string())
                } else {
                    Err(StoreError::format(format!(
                        "non-finite number cannot be stored: {n}"
                    )))
                }
            }
            SqlValue::Date(d) => Ok(format!("'{}'", d.format("%Y-%m-%d"))),
            SqlValue::Timestamp(ts) => Ok(timestamp_literal(ts)),
            SqlValue::Bytes(b) => Ok(binary_literal(dialect, b)),
        }
    }

    /// True when the value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    let seconds = ts.second().min(59);
    let millis = (ts.nanosecond() / 1_000_000).min(999);
    format!(
        "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}'",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        seconds,
        millis
    )
}

/// Parses a FHIR partial date (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`, or a full
/// datetime) into a date or timestamp value.
pub fn parse_partial_date(text: &str) -> StoreResult<SqlValue> {
    let bad = || StoreError::format(format!("unparseable date value: {text}"));

    match text.len() {
        4 => {
            let year: i32 = text.parse().map_err(|_| bad())?;
            let date = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(bad)?;
            Ok(SqlValue::Date(date))
        }
        7 => {
            let date =
                NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").map_err(|_| bad())?;
            Ok(SqlValue::Date(date))
        }
        10 => {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| bad())?;
            Ok(SqlValue::Date(date))
        }
        _ => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Ok(SqlValue::Timestamp(dt.with_timezone(&Utc)));
            }
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(SqlValue::Timestamp(naive.and_utc()));
            }
            Err(bad())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn table_and_key_names() {
        assert_eq!(table_name("Patient"), "PatientTable");
        assert_eq!(primary_key("Patient"), "PATIENTTABLE_ID");
        assert_eq!(primary_key("SearchParameter"), "SEARCHPARAMETERTABLE_ID");
    }

    #[test]
    fn column_param_roundtrip() {
        assert_eq!(column_name("general-practitioner"), "GENERAL_PRACTITIONER");
        assert_eq!(param_name("GENERAL_PRACTITIONER"), "general-practitioner");
        assert_eq!(column_name("birthdate"), "BIRTHDATE");
    }

    #[test]
    fn text_literal_escapes_quotes() {
        let lit = SqlValue::Text("O'Brien".to_string())
            .to_literal(Dialect::Sqlite)
            .unwrap();
        assert_eq!(lit, "'O''Brien'");
    }

    #[test]
    fn scalar_literals() {
        assert_eq!(SqlValue::Null.to_literal(Dialect::Sqlite).unwrap(), "NULL");
        assert_eq!(
            SqlValue::Bool(true).to_literal(Dialect::Sqlite).unwrap(),
            "TRUE"
        );
        assert_eq!(SqlValue::Int(42).to_literal(Dialect::Sqlite).unwrap(), "42");
        assert_eq!(
            SqlValue::Number(1.5).to_literal(Dialect::Sqlite).unwrap(),
            "1.5"
        );
    }

    #[test]
    fn non_finite_number_is_a_format_error() {
        let err = SqlValue::Number(f64::NAN)
            .to_literal(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[test]
    fn timestamp_literal_clamps_to_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 15).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let lit = SqlValue::Timestamp(ts).to_literal(Dialect::Sqlite).unwrap();
        assert_eq!(lit, "'2024-03-01 10:30:15.123'");
    }

    #[test]
    fn binary_literals_per_dialect() {
        assert_eq!(binary_literal(Dialect::Sqlite, &[0xab, 0x01]), "X'ab01'");
        assert_eq!(
            binary_literal(Dialect::Postgres, &[0xab, 0x01]),
            "decode('ab01', 'hex')"
        );
    }

    #[test]
    fn partial_dates() {
        assert_eq!(
            parse_partial_date("1980").unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(1980, 1, 1).unwrap())
        );
        assert_eq!(
            parse_partial_date("1980-06").unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(1980, 6, 1).unwrap())
        );
        assert_eq!(
            parse_partial_date("1980-06-15").unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(1980, 6, 15).unwrap())
        );
        assert!(matches!(
            parse_partial_date("2024-01-15T10:00:00Z").unwrap(),
            SqlValue::Timestamp(_)
        ));
        assert!(parse_partial_date("not-a-date").is_err());
    }

    #[test]
    fn db_timestamp_roundtrip() {
        let parsed = parse_db_timestamp("2024-03-01 10:30:15.123").unwrap();
        assert_eq!(format_instant(&parsed), "2024-03-01T10:30:15.123Z");
    }
}
