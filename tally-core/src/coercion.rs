//! Best-effort recovery of typed values from untyped archive and CSV cells.
//!
//! Neither a JSON dump nor a CSV row carries a schema, so every string value
//! goes through the same ordered heuristic (first match wins):
//!
//! 1. `""`, `"null"` or a missing value become null.
//! 2. Strings starting with `{` or `[` that parse as JSON become that JSON.
//! 3. ISO-8601 date-times (`YYYY-MM-DDTHH:mm:ss[.sss][Z]`) become dates.
//! 4. Numeric strings become numbers, unless the key is code-like (the
//!    identity field, `id`, `code`, or a `Code`/`_code` suffix).
//! 5. Anything else is kept as the original string.
//!
//! The heuristic can misclassify free text that looks like a number or a
//! date. The restore pipeline therefore decodes the raw row first and only
//! coerces rows the typed model rejects, keeping text columns verbatim.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

static ISO_DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z?$").expect("valid date regex")
});

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("valid number regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Json(Value),
    Date(DateTime<Utc>),
    Number(Number),
    Text(String),
}

impl CoercedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CoercedValue::Null)
    }

    /// JSON form suitable for decoding into a typed model. Dates are
    /// rendered as RFC 3339 in UTC.
    pub fn into_json(self) -> Value {
        match self {
            CoercedValue::Null => Value::Null,
            CoercedValue::Json(value) => value,
            CoercedValue::Date(date) => {
                Value::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CoercedValue::Number(number) => Value::Number(number),
            CoercedValue::Text(text) => Value::String(text),
        }
    }
}

/// Keys whose values are identifiers and must never become numbers.
pub fn is_code_like(key: &str, identity_field: &str) -> bool {
    key == identity_field
        || key == "id"
        || key == "code"
        || key.ends_with("Code")
        || key.ends_with("_code")
}

/// Coerces one value. Non-string JSON values are already typed and pass
/// through unchanged.
pub fn coerce(key: &str, raw: Option<&Value>, identity_field: &str) -> CoercedValue {
    match raw {
        None | Some(Value::Null) => CoercedValue::Null,
        Some(Value::String(text)) => coerce_str(key, text, identity_field),
        Some(other) => CoercedValue::Json(other.clone()),
    }
}

pub fn coerce_str(key: &str, raw: &str, identity_field: &str) -> CoercedValue {
    if raw.is_empty() || raw == "null" {
        return CoercedValue::Null;
    }

    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            return CoercedValue::Json(parsed);
        }
    }

    if ISO_DATE_TIME.is_match(raw) {
        if let Some(date) = parse_iso_date_time(raw) {
            return CoercedValue::Date(date);
        }
    }

    if !is_code_like(key, identity_field) {
        if let Some(number) = parse_number(raw) {
            return CoercedValue::Number(number);
        }
    }

    CoercedValue::Text(raw.to_string())
}

/// Applies [`coerce`] to every value of a row.
pub fn coerce_row(row: &Map<String, Value>, identity_field: &str) -> Map<String, Value> {
    row.iter()
        .map(|(key, value)| {
            (
                key.clone(),
                coerce(key, Some(value), identity_field).into_json(),
            )
        })
        .collect()
}

fn parse_iso_date_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.ends_with('Z') {
        return DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|date| date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if !NUMERIC.is_match(trimmed) {
        return None;
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Number::from(integer));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn empty_and_null_literals_become_null() {
        assert_eq!(coerce_str("note", "", "id"), CoercedValue::Null);
        assert_eq!(coerce_str("note", "null", "id"), CoercedValue::Null);
        assert_eq!(coerce("note", None, "id"), CoercedValue::Null);
        assert_eq!(coerce("note", Some(&Value::Null), "id"), CoercedValue::Null);
    }

    #[test]
    fn json_looking_strings_are_parsed() {
        assert_eq!(
            coerce_str("extra", r#"{"a":1}"#, "id"),
            CoercedValue::Json(json!({"a": 1}))
        );
        assert_eq!(
            coerce_str("files", r#"["f1","f2"]"#, "id"),
            CoercedValue::Json(json!(["f1", "f2"]))
        );
        // Broken JSON falls through to the plain string
        assert_eq!(
            coerce_str("note", "{not json", "id"),
            CoercedValue::Text("{not json".to_string())
        );
    }

    #[test]
    fn iso_date_times_become_dates() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(
            coerce_str("issued_at", "2024-01-05T00:00:00.000Z", "id"),
            CoercedValue::Date(expected)
        );
        assert_eq!(
            coerce_str("issued_at", "2024-01-05T00:00:00", "id"),
            CoercedValue::Date(expected)
        );
        assert_eq!(
            coerce_str("issued_at", "2024-01-05T00:00:00.000Z", "id").into_json(),
            json!("2024-01-05T00:00:00Z")
        );
    }

    #[test]
    fn numbers_are_coerced_except_for_code_like_keys() {
        assert_eq!(
            coerce_str("total", "42", "id"),
            CoercedValue::Number(Number::from(42))
        );
        assert_eq!(coerce_str("total", "5.5", "id").into_json(), json!(5.5));
        assert_eq!(
            coerce_str("categoryCode", "42", "id"),
            CoercedValue::Text("42".to_string())
        );
        assert_eq!(
            coerce_str("category_code", "42", "id"),
            CoercedValue::Text("42".to_string())
        );
        assert_eq!(
            coerce_str("id", "42", "id"),
            CoercedValue::Text("42".to_string())
        );
        assert_eq!(
            coerce_str("code", "42", "code"),
            CoercedValue::Text("42".to_string())
        );
    }

    #[test]
    fn non_numeric_text_is_kept_verbatim() {
        assert_eq!(
            coerce_str("name", "NaN", "id"),
            CoercedValue::Text("NaN".to_string())
        );
        assert_eq!(
            coerce_str("name", "inf", "id"),
            CoercedValue::Text("inf".to_string())
        );
        assert_eq!(
            coerce_str("name", "Coffee 42", "id"),
            CoercedValue::Text("Coffee 42".to_string())
        );
    }

    #[test]
    fn typed_json_values_pass_through() {
        assert_eq!(
            coerce("total", Some(&json!(550)), "id"),
            CoercedValue::Json(json!(550))
        );
        assert_eq!(
            coerce("is_extra", Some(&json!(true)), "code"),
            CoercedValue::Json(json!(true))
        );
    }

    #[test]
    fn coerce_row_applies_per_key() {
        let row = json!({
            "id": "123",
            "name": "",
            "total": "550",
            "category_code": "007",
        });
        let coerced = coerce_row(row.as_object().unwrap(), "id");
        assert_eq!(coerced["id"], json!("123"));
        assert_eq!(coerced["name"], Value::Null);
        assert_eq!(coerced["total"], json!(550));
        assert_eq!(coerced["category_code"], json!("007"));
    }
}
