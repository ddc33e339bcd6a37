//! Type/field mapper.
//!
//! Maps the canonical search types onto column definitions and converts raw
//! item values into what gets stored. Conversions never fail: values that
//! cannot be represented become NULL, and anything lossy (truncation,
//! unparsable input) is reported as a warning alongside the result.
//!
//! | Type | Column | Stored as |
//! |------|--------|-----------|
//! | text | `VARCHAR(30)` | preview in the index table, words in the text table |
//! | string, uri | `VARCHAR(255)` | verbatim, truncated |
//! | integer, duration | `BIGINT` | integer |
//! | date | `BIGINT` | Unix timestamp |
//! | decimal | `FLOAT` | float |
//! | boolean | `SMALLINT` | 0/1 |

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use dbsearch_core::util::ids::truncate_chars;
use dbsearch_core::{FieldType, RawValue, TextToken};
use dbsearch_storage::{ColumnSpec, ColumnType, SqlValue};

/// Length of the text preview kept in the index table.
pub const TEXT_PREVIEW_LENGTH: usize = 30;

/// Longest word stored in the text table.
pub const WORD_MAX_LENGTH: usize = 50;

/// Longest string stored in a string/uri column.
pub const STRING_MAX_LENGTH: usize = 255;

/// Scores are stored as integers scaled by this factor.
pub const SCORE_MULTIPLIER: f64 = 1000.0;

/// Largest storable score (unsigned 32-bit column).
pub const MAX_SCORE: u64 = 4_294_967_295;

/// Column used for a field of the given type.
pub fn column_spec(field_type: FieldType) -> ColumnSpec {
    let column_type = match field_type {
        FieldType::Text => ColumnType::Varchar(TEXT_PREVIEW_LENGTH as u32),
        FieldType::String | FieldType::Uri => ColumnType::Varchar(STRING_MAX_LENGTH as u32),
        FieldType::Integer | FieldType::Duration | FieldType::Date => ColumnType::BigInt,
        FieldType::Decimal => ColumnType::Float,
        FieldType::Boolean => ColumnType::SmallInt,
    };
    ColumnSpec::nullable(column_type)
}

/// Canonical base form of a word or value, used for deduplication and
/// keyword matching: lowercase with diacritics removed.
pub fn canonical(value: &str) -> String {
    value
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Splits text on non-letter/non-digit boundaries.
pub fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Whether a word is a number, optionally signed or fractional.
pub fn is_numeric(word: &str) -> bool {
    !word.is_empty() && word.parse::<f64>().is_ok_and(f64::is_finite)
}

/// A converted value.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    /// A scalar column value.
    Scalar(SqlValue),
    /// Scored words of a fulltext value.
    Tokens(Vec<TextToken>),
}

impl StorageValue {
    /// Turns the stored value back into raw input.
    pub fn to_raw(&self) -> RawValue {
        match self {
            StorageValue::Scalar(SqlValue::Null) => RawValue::Null,
            StorageValue::Scalar(SqlValue::Integer(v)) => RawValue::Integer(*v),
            StorageValue::Scalar(SqlValue::Real(v)) => RawValue::Decimal(*v),
            StorageValue::Scalar(SqlValue::Text(s)) => RawValue::String(s.clone()),
            StorageValue::Tokens(tokens) => RawValue::Tokens(tokens.clone()),
        }
    }

    /// The scalar value, or NULL for tokens.
    pub fn into_scalar(self) -> SqlValue {
        match self {
            StorageValue::Scalar(v) => v,
            StorageValue::Tokens(_) => SqlValue::Null,
        }
    }
}

/// Result of a conversion plus any warnings it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    /// Converted value.
    pub value: StorageValue,
    /// Human-readable warnings.
    pub warnings: Vec<String>,
}

impl Converted {
    fn scalar(value: SqlValue) -> Self {
        Self {
            value: StorageValue::Scalar(value),
            warnings: Vec::new(),
        }
    }

    fn null_with_warning(warning: String) -> Self {
        log::warn!("{warning}");
        Self {
            value: StorageValue::Scalar(SqlValue::Null),
            warnings: vec![warning],
        }
    }
}

/// Converts a raw value for storage as `target`.
///
/// `source` is the type the value had before extraction; only a date source
/// changes the result (dates indexed as text are rendered as calendar words).
/// `field` names the field in warnings.
pub fn convert_value(
    raw: &RawValue,
    target: FieldType,
    source: Option<FieldType>,
    field: &str,
) -> Converted {
    match target {
        FieldType::Text => convert_text(raw, source, field),
        FieldType::String | FieldType::Uri => convert_string(raw, field),
        FieldType::Integer | FieldType::Duration => convert_integer(raw, field),
        FieldType::Date => convert_date(raw, field),
        FieldType::Decimal => convert_decimal(raw, field),
        FieldType::Boolean => Converted::scalar(convert_boolean(raw)),
    }
}

fn render_scalar(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Null => None,
        RawValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
        RawValue::Integer(v) => Some(v.to_string()),
        RawValue::Decimal(v) => Some(v.to_string()),
        RawValue::String(s) => Some(s.clone()),
        RawValue::Tokens(tokens) => Some(
            tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

fn truncate_word(word: &str, field: &str, warnings: &mut Vec<String>) -> String {
    let (word_out, cut) = truncate_chars(word, WORD_MAX_LENGTH);
    if cut {
        let warning = format!(
            "Word '{word_out}…' in field '{field}' is longer than {WORD_MAX_LENGTH} characters and was truncated"
        );
        log::warn!("{warning}");
        warnings.push(warning);
    }
    word_out
}

fn convert_text(raw: &RawValue, source: Option<FieldType>, field: &str) -> Converted {
    let mut warnings = Vec::new();
    let tokens = match raw {
        RawValue::Null => Vec::new(),
        RawValue::Tokens(tokens) => tokens
            .iter()
            .filter(|t| !t.text.is_empty())
            .map(|t| TextToken {
                text: truncate_word(&t.text, field, &mut warnings),
                boost: t.boost,
            })
            .collect(),
        other => {
            let text = match (source, other) {
                (Some(FieldType::Date), RawValue::Integer(ts)) => calendar_words(*ts),
                (Some(FieldType::Date), RawValue::String(s)) => {
                    parse_date(s).map_or_else(|| s.clone(), calendar_words)
                }
                _ => render_scalar(other).unwrap_or_default(),
            };
            split_words(&text)
                .map(|w| TextToken::new(truncate_word(w, field, &mut warnings)))
                .collect()
        }
    };
    Converted {
        value: StorageValue::Tokens(tokens),
        warnings,
    }
}

/// Renders a timestamp as searchable calendar words.
///
/// Year (long and short), month name (long and short), month number, day
/// number, weekday name (long and short), and time.
fn calendar_words(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt
            .format("%Y %y %B %b %-m %m %-d %d %A %a %H:%M:%S")
            .to_string(),
        None => timestamp.to_string(),
    }
}

fn convert_string(raw: &RawValue, field: &str) -> Converted {
    let Some(value) = render_scalar(raw) else {
        return Converted::scalar(SqlValue::Null);
    };
    let (value, cut) = truncate_chars(&value, STRING_MAX_LENGTH);
    let mut converted = Converted::scalar(SqlValue::Text(value));
    if cut {
        let warning = format!(
            "Value of field '{field}' is longer than {STRING_MAX_LENGTH} characters and was truncated"
        );
        log::warn!("{warning}");
        converted.warnings.push(warning);
    }
    converted
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn convert_integer(raw: &RawValue, field: &str) -> Converted {
    match raw {
        RawValue::Null => Converted::scalar(SqlValue::Null),
        RawValue::Integer(v) => Converted::scalar(SqlValue::Integer(*v)),
        RawValue::Decimal(v) => Converted::scalar(SqlValue::Integer(*v as i64)),
        RawValue::Boolean(b) => Converted::scalar(SqlValue::Integer(i64::from(*b))),
        other => {
            let text = render_scalar(other).unwrap_or_default();
            match parse_integer(&text) {
                Some(v) => Converted::scalar(SqlValue::Integer(v)),
                None => Converted::null_with_warning(format!(
                    "Value '{text}' of field '{field}' is not an integer"
                )),
            }
        }
    }
}

/// Parses a date string into a Unix timestamp.
///
/// Accepts integer timestamps, RFC 3339, `YYYY-MM-DD HH:MM:SS`, and
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<i64>() {
        return Some(ts);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn convert_date(raw: &RawValue, field: &str) -> Converted {
    match raw {
        RawValue::Null => Converted::scalar(SqlValue::Null),
        RawValue::Integer(v) => Converted::scalar(SqlValue::Integer(*v)),
        RawValue::Decimal(v) => Converted::scalar(SqlValue::Integer(*v as i64)),
        other => {
            let text = render_scalar(other).unwrap_or_default();
            match parse_date(&text) {
                Some(ts) => Converted::scalar(SqlValue::Integer(ts)),
                None => Converted::null_with_warning(format!(
                    "Value '{text}' of field '{field}' is not a date"
                )),
            }
        }
    }
}

fn convert_decimal(raw: &RawValue, field: &str) -> Converted {
    match raw {
        RawValue::Null => Converted::scalar(SqlValue::Null),
        RawValue::Integer(v) => Converted::scalar(SqlValue::Real(*v as f64)),
        RawValue::Decimal(v) => Converted::scalar(SqlValue::Real(*v)),
        RawValue::Boolean(b) => Converted::scalar(SqlValue::Real(if *b { 1.0 } else { 0.0 })),
        other => {
            let text = render_scalar(other).unwrap_or_default();
            match text.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Converted::scalar(SqlValue::Real(v)),
                _ => Converted::null_with_warning(format!(
                    "Value '{text}' of field '{field}' is not a number"
                )),
            }
        }
    }
}

fn convert_boolean(raw: &RawValue) -> SqlValue {
    let truthy = match raw {
        RawValue::Null => return SqlValue::Null,
        RawValue::Boolean(b) => *b,
        RawValue::Integer(v) => *v != 0,
        RawValue::Decimal(v) => *v != 0.0,
        RawValue::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        RawValue::Tokens(tokens) => !tokens.is_empty(),
    };
    SqlValue::Integer(i64::from(truthy))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scalar(raw: RawValue, target: FieldType) -> SqlValue {
        convert_value(&raw, target, None, "f").value.into_scalar()
    }

    fn words(converted: &Converted) -> Vec<&str> {
        match &converted.value {
            StorageValue::Tokens(tokens) => tokens.iter().map(|t| t.text.as_str()).collect(),
            StorageValue::Scalar(_) => Vec::new(),
        }
    }

    // ========================================================================
    // column_spec tests
    // ========================================================================

    #[test]
    fn test_column_spec_mapping() {
        assert_eq!(
            column_spec(FieldType::Text).column_type,
            ColumnType::Varchar(30)
        );
        assert_eq!(
            column_spec(FieldType::Uri).column_type,
            ColumnType::Varchar(255)
        );
        assert_eq!(column_spec(FieldType::Date).column_type, ColumnType::BigInt);
        assert_eq!(
            column_spec(FieldType::Duration),
            column_spec(FieldType::Integer)
        );
        assert_eq!(
            column_spec(FieldType::Boolean).column_type,
            ColumnType::SmallInt
        );
        assert_eq!(column_spec(FieldType::Decimal).column_type, ColumnType::Float);
    }

    // ========================================================================
    // text conversion tests
    // ========================================================================

    #[test]
    fn test_text_splits_on_non_alphanumeric() {
        let c = convert_value(&"Héllo, wörld! foo-bar".into(), FieldType::Text, None, "body");
        assert_eq!(words(&c), vec!["Héllo", "wörld", "foo", "bar"]);
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_text_truncates_long_words_with_warning() {
        let long = "x".repeat(60);
        let c = convert_value(&long.as_str().into(), FieldType::Text, None, "body");
        assert_eq!(words(&c), vec!["x".repeat(50).as_str()]);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_text_keeps_pretokenized_boosts() {
        let raw = RawValue::Tokens(vec![
            TextToken {
                text: "alpha".into(),
                boost: 2.0,
            },
            TextToken::new(""),
        ]);
        let c = convert_value(&raw, FieldType::Text, None, "body");
        let StorageValue::Tokens(tokens) = c.value else {
            unreachable!("Expected tokens");
        };
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].boost, 2.0);
    }

    #[test]
    fn test_text_from_date_source() {
        // 2024-01-05 is a Friday.
        let c = convert_value(
            &"2024-01-05".into(),
            FieldType::Text,
            Some(FieldType::Date),
            "created",
        );
        let w = words(&c);
        assert!(w.contains(&"2024"));
        assert!(w.contains(&"January"));
        assert!(w.contains(&"Friday"));
    }

    // ========================================================================
    // scalar conversion tests
    // ========================================================================

    #[test]
    fn test_string_truncates_to_exact_length() {
        let long = "é".repeat(300);
        let c = convert_value(&long.as_str().into(), FieldType::String, None, "name");
        let SqlValue::Text(s) = c.value.into_scalar() else {
            unreachable!("Expected text");
        };
        assert_eq!(s.chars().count(), 255);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(scalar(2.9f64.into(), FieldType::Integer), SqlValue::Integer(2));
        assert_eq!(scalar(true.into(), FieldType::Integer), SqlValue::Integer(1));
        assert_eq!(scalar("17".into(), FieldType::Duration), SqlValue::Integer(17));
        assert_eq!(scalar("abc".into(), FieldType::Integer), SqlValue::Null);
    }

    #[test]
    fn test_date_conversions() {
        assert_eq!(
            scalar("2024-01-05".into(), FieldType::Date),
            SqlValue::Integer(1_704_412_800)
        );
        assert_eq!(
            scalar("2024-01-05T00:00:00+00:00".into(), FieldType::Date),
            SqlValue::Integer(1_704_412_800)
        );
        assert_eq!(scalar(5i64.into(), FieldType::Date), SqlValue::Integer(5));
        let c = convert_value(&"yesterday".into(), FieldType::Date, None, "d");
        assert_eq!(c.value.into_scalar(), SqlValue::Null);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_boolean_conversions() {
        assert_eq!(scalar("false".into(), FieldType::Boolean), SqlValue::Integer(0));
        assert_eq!(scalar("".into(), FieldType::Boolean), SqlValue::Integer(0));
        assert_eq!(scalar("yes".into(), FieldType::Boolean), SqlValue::Integer(1));
        assert_eq!(scalar(0i64.into(), FieldType::Boolean), SqlValue::Integer(0));
        assert_eq!(scalar(RawValue::Null, FieldType::Boolean), SqlValue::Null);
    }

    #[test]
    fn test_decimal_conversions() {
        assert_eq!(scalar(3i64.into(), FieldType::Decimal), SqlValue::Real(3.0));
        assert_eq!(scalar(" 2.5 ".into(), FieldType::Decimal), SqlValue::Real(2.5));
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("42"));
        assert!(is_numeric("-0.5"));
        assert!(!is_numeric("4a"));
        assert!(!is_numeric(""));
    }

    #[test]
    fn test_canonical_folds_case_and_diacritics() {
        assert_eq!(canonical("ÉCOLE"), "ecole");
        assert_eq!(canonical("Café"), canonical("cafe"));
        assert_eq!(canonical("Straße"), "straße");
        assert_eq!(canonical("İstanbul"), "istanbul");
    }
}
