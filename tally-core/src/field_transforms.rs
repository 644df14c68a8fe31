//! Per-field CSV transforms for transactions.
//!
//! Each standard field code maps onto a transaction column and may carry an
//! export transform (stored value to CSV cell) and an import transform (CSV
//! cell to stored value). Fields without a transform pass through. Codes not
//! listed here are extra fields and live in the transaction's `extra` bag.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::coercion::{coerce_str, CoercedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValueType {
    String,
    Number,
    Date,
}

impl FieldValueType {
    /// Parses the `type` column of a field definition; unknown kinds are
    /// treated as strings.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "number" => FieldValueType::Number,
            "date" => FieldValueType::Date,
            _ => FieldValueType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTransform {
    /// Integer minor units to a decimal amount
    MinorUnits,
    /// Timestamp to `YYYY-MM-DD`
    Date,
    CategoryName,
    ProjectName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTransform {
    MinorUnits,
    Date,
    Lowercase,
    Uppercase,
    /// Category name to category code, creating the category if needed
    CategoryReference,
    ProjectReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTransformDescriptor {
    pub code: &'static str,
    /// Transaction column holding the value
    pub column: &'static str,
    pub value_type: FieldValueType,
    pub export: Option<ExportTransform>,
    pub import: Option<ImportTransform>,
}

const fn field(
    code: &'static str,
    column: &'static str,
    value_type: FieldValueType,
    export: Option<ExportTransform>,
    import: Option<ImportTransform>,
) -> FieldTransformDescriptor {
    FieldTransformDescriptor {
        code,
        column,
        value_type,
        export,
        import,
    }
}

pub const TRANSACTION_FIELDS: &[FieldTransformDescriptor] = &[
    field("name", "name", FieldValueType::String, None, None),
    field("merchant", "merchant", FieldValueType::String, None, None),
    field("description", "description", FieldValueType::String, None, None),
    field("note", "note", FieldValueType::String, None, None),
    field("text", "text", FieldValueType::String, None, None),
    field(
        "type",
        "type",
        FieldValueType::String,
        None,
        Some(ImportTransform::Lowercase),
    ),
    field(
        "total",
        "total",
        FieldValueType::Number,
        Some(ExportTransform::MinorUnits),
        Some(ImportTransform::MinorUnits),
    ),
    field(
        "currencyCode",
        "currency_code",
        FieldValueType::String,
        None,
        Some(ImportTransform::Uppercase),
    ),
    field(
        "convertedTotal",
        "converted_total",
        FieldValueType::Number,
        Some(ExportTransform::MinorUnits),
        Some(ImportTransform::MinorUnits),
    ),
    field(
        "convertedCurrencyCode",
        "converted_currency_code",
        FieldValueType::String,
        None,
        Some(ImportTransform::Uppercase),
    ),
    field(
        "issuedAt",
        "issued_at",
        FieldValueType::Date,
        Some(ExportTransform::Date),
        Some(ImportTransform::Date),
    ),
    field(
        "categoryCode",
        "category_code",
        FieldValueType::String,
        Some(ExportTransform::CategoryName),
        Some(ImportTransform::CategoryReference),
    ),
    field(
        "projectCode",
        "project_code",
        FieldValueType::String,
        Some(ExportTransform::ProjectName),
        Some(ImportTransform::ProjectReference),
    ),
];

pub fn transaction_field(code: &str) -> Option<&'static FieldTransformDescriptor> {
    TRANSACTION_FIELDS.iter().find(|field| field.code == code)
}

/// Code-to-name tables for one export call.
#[derive(Debug, Clone, Default)]
pub struct ExportLookups {
    pub categories: HashMap<String, String>,
    pub projects: HashMap<String, String>,
}

impl ExportTransform {
    pub fn apply(&self, value: &Value, lookups: &ExportLookups) -> Value {
        match self {
            ExportTransform::MinorUnits => match value {
                Value::Number(number) => minor_units_to_amount(number),
                other => other.clone(),
            },
            ExportTransform::Date => match value.as_str().and_then(parse_date) {
                Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
                None => value.clone(),
            },
            ExportTransform::CategoryName => lookup_name(value, &lookups.categories),
            ExportTransform::ProjectName => lookup_name(value, &lookups.projects),
        }
    }
}

fn minor_units_to_amount(number: &Number) -> Value {
    if let Some(minor) = number.as_i64() {
        if minor % 100 == 0 {
            return Value::Number(Number::from(minor / 100));
        }
        return Number::from_f64(minor as f64 / 100.0)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    number
        .as_f64()
        .and_then(|value| Number::from_f64(value / 100.0))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn lookup_name(value: &Value, names: &HashMap<String, String>) -> Value {
    match value.as_str() {
        Some(code) => Value::String(names.get(code).cloned().unwrap_or_else(|| code.to_string())),
        None => value.clone(),
    }
}

/// Parses a decimal amount into minor units, accepting a comma as the
/// decimal separator when no dot is present.
pub fn parse_minor_units(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };
    let amount = normalized.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((amount * 100.0).round() as i64)
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Converts a CSV cell for a field without an import transform. The cell is
/// coerced and then held to the field's declared type, so free text stays
/// text even when it looks like a number.
pub fn coerce_cell(code: &str, raw: &str, value_type: FieldValueType) -> Value {
    match (value_type, coerce_str(code, raw, "id")) {
        (_, CoercedValue::Null) => Value::Null,
        (FieldValueType::String, CoercedValue::Text(text)) => Value::String(text),
        (FieldValueType::String, _) => Value::String(raw.to_string()),
        (FieldValueType::Date, CoercedValue::Text(text)) => parse_date(&text)
            .map(|date| CoercedValue::Date(date).into_json())
            .unwrap_or(Value::String(text)),
        (_, other) => other.into_json(),
    }
}

/// CSV cell text for a JSON value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minor_units_export() {
        let lookups = ExportLookups::default();
        let apply = |v: Value| cell_text(&ExportTransform::MinorUnits.apply(&v, &lookups));
        assert_eq!(apply(json!(550)), "5.5");
        assert_eq!(apply(json!(500)), "5");
        assert_eq!(apply(json!(-1999)), "-19.99");
        assert_eq!(apply(Value::Null), "");
    }

    #[test]
    fn test_date_and_name_exports() {
        let mut lookups = ExportLookups::default();
        lookups
            .categories
            .insert("food".to_string(), "Food & Drinks".to_string());

        assert_eq!(
            ExportTransform::Date.apply(&json!("2024-01-05T13:45:00Z"), &lookups),
            json!("2024-01-05")
        );
        assert_eq!(
            ExportTransform::CategoryName.apply(&json!("food"), &lookups),
            json!("Food & Drinks")
        );
        assert_eq!(
            ExportTransform::CategoryName.apply(&json!("gone"), &lookups),
            json!("gone")
        );
        assert_eq!(
            ExportTransform::ProjectName.apply(&Value::Null, &lookups),
            Value::Null
        );
    }

    #[test]
    fn test_parse_minor_units() {
        assert_eq!(parse_minor_units("5.5"), Some(550));
        assert_eq!(parse_minor_units("12,34"), Some(1234));
        assert_eq!(parse_minor_units("1,234.50"), Some(123450));
        assert_eq!(parse_minor_units(" -0.01 "), Some(-1));
        assert_eq!(parse_minor_units("abc"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = "2024-01-05T00:00:00+00:00";
        for raw in ["2024-01-05", "05.01.2024", "05/01/2024", "2024-01-05T00:00:00Z"] {
            assert_eq!(parse_date(raw).unwrap().to_rfc3339(), expected, "{}", raw);
        }
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_coerce_cell_respects_declared_type() {
        assert_eq!(
            coerce_cell("note", "12345", FieldValueType::String),
            json!("12345")
        );
        assert_eq!(coerce_cell("vat", "19", FieldValueType::Number), json!(19));
        assert_eq!(coerce_cell("note", "", FieldValueType::String), Value::Null);
        assert_eq!(
            coerce_cell("due", "2024-02-01", FieldValueType::Date),
            json!("2024-02-01T00:00:00Z")
        );
    }

    #[test]
    fn every_standard_field_is_registered_once() {
        let mut codes: Vec<&str> = TRANSACTION_FIELDS.iter().map(|f| f.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), TRANSACTION_FIELDS.len());
        assert_eq!(transaction_field("issuedAt").unwrap().column, "issued_at");
        assert!(transaction_field("vat").is_none());
    }
}
