//! Column type inference.
//!
//! Evaluates every candidate SQL type against a sample of raw string
//! values and picks the most reliable one. Reliability is the ratio of
//! values matching a candidate over the non-empty sampled values; each
//! candidate carries its own acceptance threshold. When nothing reaches
//! its threshold, a concrete candidate at 50%+ that at least matches the
//! text candidate is still preferred over plain text.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Maximum length stored for a sized `nvarchar` column.
pub const NVARCHAR_DEFAULT_LEN: u32 = 255;

const BIT_THRESHOLD: f64 = 0.90;
const NUMERIC_THRESHOLD: f64 = 0.80;
const TEXT_THRESHOLD: f64 = 0.90;
const FALLBACK_FLOOR: f64 = 0.50;

const TRUE_LITERALS: [&str; 4] = ["true", "1", "sim", "yes"];
const FALSE_LITERALS: [&str; 4] = ["false", "0", "não", "no"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// SQL Server type names the inferencer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlTypeName {
    Bit,
    Int,
    BigInt,
    Decimal,
    Date,
    DateTime,
    NVarChar,
}

impl SqlTypeName {
    /// Tie-break priority: concrete types before text, narrower first.
    fn priority(self) -> u8 {
        match self {
            SqlTypeName::Bit => 1,
            SqlTypeName::Int => 2,
            SqlTypeName::BigInt => 3,
            SqlTypeName::Decimal => 4,
            SqlTypeName::Date => 5,
            SqlTypeName::DateTime => 6,
            SqlTypeName::NVarChar => 99,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SqlTypeName::Bit => "bit",
            SqlTypeName::Int => "int",
            SqlTypeName::BigInt => "bigint",
            SqlTypeName::Decimal => "decimal",
            SqlTypeName::Date => "date",
            SqlTypeName::DateTime => "datetime",
            SqlTypeName::NVarChar => "nvarchar",
        }
    }
}

impl std::fmt::Display for SqlTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inferred column type, serializable to a SQL definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlColumnType {
    pub type_name: SqlTypeName,
    /// Decimal precision or nvarchar length; `None` means `nvarchar(max)`
    /// for text columns and is unused otherwise.
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// Whether the winning candidate cleared its acceptance threshold.
    pub reliable: bool,
}

impl SqlColumnType {
    pub fn simple(type_name: SqlTypeName, reliable: bool) -> Self {
        Self {
            type_name,
            precision: None,
            scale: None,
            reliable,
        }
    }

    /// The default text column: `nvarchar(255)`, not reliable.
    pub fn fallback_text() -> Self {
        Self {
            type_name: SqlTypeName::NVarChar,
            precision: Some(NVARCHAR_DEFAULT_LEN),
            scale: None,
            reliable: false,
        }
    }

    /// Render the SQL type definition, e.g. `decimal(12,3)` or
    /// `nvarchar(max)`.
    pub fn to_sql_definition(&self) -> String {
        match self.type_name {
            SqlTypeName::Decimal => {
                let precision = self.precision.unwrap_or(18);
                let scale = self.scale.unwrap_or(0);
                format!("decimal({},{})", precision, scale)
            }
            SqlTypeName::NVarChar => match self.precision {
                Some(len) => format!("nvarchar({})", len),
                None => "nvarchar(max)".to_string(),
            },
            other => other.as_str().to_string(),
        }
    }
}

/// Parse a boolean literal the loader and inferencer agree on.
pub fn parse_bit(value: &str) -> Option<bool> {
    let v = value.trim().to_lowercase();
    if TRUE_LITERALS.contains(&v.as_str()) {
        Some(true)
    } else if FALSE_LITERALS.contains(&v.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a calendar date in one of the accepted exact formats.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(v, fmt).ok())
}

/// Parse a timestamp; a time component is required.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let v = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(v) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(v, fmt).ok())
}

/// Digit accounting for a decimal literal, used to size the column.
fn decimal_digits(value: &str) -> (u32, u32) {
    let unsigned = value.trim().trim_start_matches(['-', '+']);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    let int_digits = int_part.trim_start_matches('0').len().saturating_sub(1) as u32;
    (int_digits, frac_part.len() as u32)
}

#[derive(Default)]
struct SampleStats {
    non_empty: usize,
    bit: usize,
    int: usize,
    bigint: usize,
    bigint_beyond_int: bool,
    decimal: usize,
    max_integer_digits: u32,
    max_fraction_digits: u32,
    date: usize,
    datetime: usize,
    text_only: usize,
    max_len: usize,
}

impl SampleStats {
    fn observe(&mut self, value: &str) {
        let v = value.trim();
        if v.is_empty() {
            return;
        }
        self.non_empty += 1;
        self.max_len = self.max_len.max(v.chars().count());

        let bit = parse_bit(v).is_some();
        let int = v.parse::<i32>().is_ok();
        let bigint = v.parse::<i64>().is_ok();
        if bigint && !int {
            self.bigint_beyond_int = true;
        }
        let decimal = Decimal::from_str(v).is_ok();
        let date = parse_date(v).is_some();
        let datetime = parse_datetime(v).is_some();

        if bit {
            self.bit += 1;
        }
        if int {
            self.int += 1;
        }
        if bigint {
            self.bigint += 1;
        }
        if decimal {
            self.decimal += 1;
            let (i, f) = decimal_digits(v);
            self.max_integer_digits = self.max_integer_digits.max(i);
            self.max_fraction_digits = self.max_fraction_digits.max(f);
        }
        if date {
            self.date += 1;
        }
        if datetime {
            self.datetime += 1;
        }
        if !(bit || int || bigint || decimal || date || datetime) {
            self.text_only += 1;
        }
    }

    fn reliability(&self, count: usize) -> f64 {
        count as f64 / self.non_empty as f64
    }
}

/// Infer the SQL type of one column from its sampled values.
///
/// `values` should already be capped at the sampling limit; every value
/// is considered, with empty/whitespace values excluded from the
/// reliability denominator.
pub fn infer_column_type<I, S>(values: I, column_name: &str) -> SqlColumnType
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stats = SampleStats::default();
    for value in values {
        stats.observe(value.as_ref());
    }

    if stats.non_empty == 0 {
        debug!(column = column_name, "No non-empty samples, defaulting to text");
        return SqlColumnType::fallback_text();
    }

    let text_len = if stats.max_len > NVARCHAR_DEFAULT_LEN as usize {
        None
    } else {
        Some(NVARCHAR_DEFAULT_LEN)
    };

    // (candidate, reliability, threshold); bigint drops out entirely when
    // every sampled value also fits in int.
    let mut candidates: Vec<(SqlTypeName, f64, f64)> = vec![
        (SqlTypeName::Bit, stats.reliability(stats.bit), BIT_THRESHOLD),
        (SqlTypeName::Int, stats.reliability(stats.int), NUMERIC_THRESHOLD),
        (
            SqlTypeName::Decimal,
            stats.reliability(stats.decimal),
            NUMERIC_THRESHOLD,
        ),
        (SqlTypeName::Date, stats.reliability(stats.date), NUMERIC_THRESHOLD),
        (
            SqlTypeName::DateTime,
            stats.reliability(stats.datetime),
            NUMERIC_THRESHOLD,
        ),
        (
            SqlTypeName::NVarChar,
            stats.reliability(stats.text_only),
            TEXT_THRESHOLD,
        ),
    ];
    if stats.bigint_beyond_int {
        candidates.push((
            SqlTypeName::BigInt,
            stats.reliability(stats.bigint),
            NUMERIC_THRESHOLD,
        ));
    }

    let mut qualifying: Vec<(SqlTypeName, f64)> = candidates
        .iter()
        .filter(|(_, rel, threshold)| rel >= threshold)
        .map(|(name, rel, _)| (*name, *rel))
        .collect();
    sort_by_reliability(&mut qualifying);

    if let Some(&(winner, rel)) = qualifying.first() {
        debug!(column = column_name, sql_type = %winner, reliability = rel, "Column type accepted");
        return build(winner, true, &stats, text_len);
    }

    // Rescue pass: a concrete (non-bit, non-text) candidate at 50%+ that
    // matches at least as many values as the text candidate.
    let text_reliability = stats.reliability(stats.text_only);
    let mut rescued: Vec<(SqlTypeName, f64)> = candidates
        .iter()
        .filter(|(name, rel, _)| {
            !matches!(name, SqlTypeName::Bit | SqlTypeName::NVarChar)
                && *rel >= FALLBACK_FLOOR
                && *rel >= text_reliability
        })
        .map(|(name, rel, _)| (*name, *rel))
        .collect();
    sort_by_reliability(&mut rescued);

    if let Some(&(winner, rel)) = rescued.first() {
        debug!(column = column_name, sql_type = %winner, reliability = rel, "Column type rescued below threshold");
        return build(winner, false, &stats, text_len);
    }

    debug!(column = column_name, "No candidate qualified, defaulting to text");
    SqlColumnType::fallback_text()
}

fn sort_by_reliability(candidates: &mut [(SqlTypeName, f64)]) {
    candidates.sort_by(|(a_name, a_rel), (b_name, b_rel)| {
        b_rel
            .partial_cmp(a_rel)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a_name.priority().cmp(&b_name.priority()))
    });
}

fn build(
    winner: SqlTypeName,
    reliable: bool,
    stats: &SampleStats,
    text_len: Option<u32>,
) -> SqlColumnType {
    match winner {
        SqlTypeName::Decimal => {
            let precision = (stats.max_integer_digits + stats.max_fraction_digits).max(1);
            let scale = stats.max_fraction_digits.min(precision);
            SqlColumnType {
                type_name: SqlTypeName::Decimal,
                precision: Some(precision),
                scale: Some(scale),
                reliable,
            }
        }
        SqlTypeName::NVarChar => SqlColumnType {
            type_name: SqlTypeName::NVarChar,
            precision: text_len,
            scale: None,
            reliable,
        },
        other => SqlColumnType::simple(other, reliable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(values: &[&str]) -> SqlColumnType {
        infer_column_type(values.iter(), "col")
    }

    #[test]
    fn test_all_empty_defaults_to_text() {
        let t = infer(&["", "  ", ""]);
        assert_eq!(t, SqlColumnType::fallback_text());
    }

    #[test]
    fn test_clean_int_column() {
        let t = infer(&["1", "2", "42"]);
        assert_eq!(t.type_name, SqlTypeName::Int);
        assert!(t.reliable);
    }

    #[test]
    fn test_empties_excluded_from_reliability() {
        // 85% valid ints over non-empty values once empties are dropped.
        let values: Vec<&str> = vec!["1", "2", "3", "4", "5", "6", "x", "", "", ""];
        let t = infer_column_type(values, "age");
        assert_eq!(t.type_name, SqlTypeName::Int);
        assert!(t.reliable);
    }

    #[test]
    fn test_one_out_of_range_value_promotes_bigint() {
        let mut values: Vec<String> = (0..99).map(|i| i.to_string()).collect();
        values.push("91474836470".to_string());
        let t = infer_column_type(values.iter(), "big");
        assert_eq!(t.type_name, SqlTypeName::BigInt);
        assert!(t.reliable);
    }

    #[test]
    fn test_bigint_rejected_when_all_fit_int() {
        let t = infer(&["1", "2", "3"]);
        assert_eq!(t.type_name, SqlTypeName::Int);
    }

    #[test]
    fn test_zero_one_column_prefers_bit() {
        let t = infer(&["0", "1", "1", "0"]);
        assert_eq!(t.type_name, SqlTypeName::Bit);
        assert!(t.reliable);
    }

    #[test]
    fn test_bit_below_threshold_is_not_rescued() {
        // 4/5 = 0.80 < 0.90; ends as nvarchar(255), not reliable.
        let t = infer(&["true", "0", "sim", "maybe", "1"]);
        assert_eq!(t, SqlColumnType::fallback_text());
    }

    #[test]
    fn test_mixed_date_formats_rescued_as_date() {
        let t = infer(&["2024-01-02", "2024/02/03"]);
        assert_eq!(t.type_name, SqlTypeName::Date);
        assert!(!t.reliable);
    }

    #[test]
    fn test_decimal_with_noise_rescued_with_sizing() {
        let t = infer(&["10.50", "x"]);
        assert_eq!(t.type_name, SqlTypeName::Decimal);
        assert_eq!(t.precision, Some(3));
        assert_eq!(t.scale, Some(2));
        assert!(!t.reliable);
    }

    #[test]
    fn test_text_column() {
        let t = infer(&["Alice", "Bob"]);
        assert_eq!(t.type_name, SqlTypeName::NVarChar);
        assert_eq!(t.precision, Some(255));
        assert!(t.reliable);
    }

    #[test]
    fn test_long_text_becomes_max() {
        let long = "x".repeat(300);
        let t = infer(&[long.as_str(), "short"]);
        assert_eq!(t.type_name, SqlTypeName::NVarChar);
        assert_eq!(t.precision, None);
        assert_eq!(t.to_sql_definition(), "nvarchar(max)");
    }

    #[test]
    fn test_datetime_column() {
        let t = infer(&["2024-01-02 10:30:00", "03/04/2024 08:15:00"]);
        assert_eq!(t.type_name, SqlTypeName::DateTime);
        assert!(t.reliable);
    }

    #[test]
    fn test_date_only_values_are_not_datetime() {
        assert!(parse_datetime("2024-01-02").is_none());
        assert!(parse_date("2024-01-02").is_some());
    }

    #[test]
    fn test_bit_literals() {
        for v in ["true", "1", "sim", "yes", "TRUE", " Yes "] {
            assert_eq!(parse_bit(v), Some(true), "{v}");
        }
        for v in ["false", "0", "não", "no", "No"] {
            assert_eq!(parse_bit(v), Some(false), "{v}");
        }
        assert_eq!(parse_bit("maybe"), None);
    }

    #[test]
    fn test_decimal_digit_accounting() {
        assert_eq!(decimal_digits("10.50"), (1, 2));
        assert_eq!(decimal_digits("-10.50"), (1, 2));
        assert_eq!(decimal_digits("0.5"), (0, 1));
        assert_eq!(decimal_digits("7"), (0, 0));
    }

    #[test]
    fn test_sql_definitions() {
        assert_eq!(
            SqlColumnType::simple(SqlTypeName::Int, true).to_sql_definition(),
            "int"
        );
        assert_eq!(
            SqlColumnType {
                type_name: SqlTypeName::Decimal,
                precision: Some(12),
                scale: Some(3),
                reliable: true,
            }
            .to_sql_definition(),
            "decimal(12,3)"
        );
        assert_eq!(SqlColumnType::fallback_text().to_sql_definition(), "nvarchar(255)");
    }
}
