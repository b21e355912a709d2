//! Locale-aware numeric and date normalization.
//!
//! Models echo values the way the document prints them ("$1,234.56",
//! "1.234,56 €", "15/01/2024"). Normalization happens here, once, so the
//! scorer and rule inferencer see canonical forms.

use chrono::NaiveDate;

use super::types::{FieldType, FieldValue};

/// Normalize a raw model-reported value to a typed [`FieldValue`].
/// Falls back to `String` when the declared type cannot be honored.
pub fn normalize_value(raw: &serde_json::Value, declared: FieldType) -> Option<FieldValue> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        serde_json::Value::Number(n) => {
            let f = n.as_f64()?;
            Some(FieldValue::Number(f))
        }
        serde_json::Value::String(s) => normalize_text(s, declared),
        serde_json::Value::Array(items) => {
            let values = items
                .iter()
                .filter_map(|v| normalize_value(v, FieldType::String))
                .collect();
            Some(FieldValue::Array(values))
        }
        serde_json::Value::Object(map) => Some(FieldValue::Object(map.clone())),
    }
}

fn normalize_text(s: &str, declared: FieldType) -> Option<FieldValue> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match declared {
        FieldType::Number => parse_number(trimmed)
            .map(FieldValue::Number)
            .or_else(|| Some(FieldValue::String(trimmed.to_string()))),
        FieldType::Date => parse_date(trimmed)
            .map(FieldValue::Date)
            .or_else(|| Some(FieldValue::String(trimmed.to_string()))),
        FieldType::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "yes" | "y" | "checked" | "1" => Some(FieldValue::Boolean(true)),
            "false" | "no" | "n" | "unchecked" | "0" => Some(FieldValue::Boolean(false)),
            _ => Some(FieldValue::String(trimmed.to_string())),
        },
        _ => Some(FieldValue::String(trimmed.to_string())),
    }
}

/// Parse a number out of text with currency symbols and either thousands
/// convention. "1,234.56" and "1.234,56" both yield 1234.56.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        // Both present: the rightmost separator is the decimal point.
        (Some(d), Some(c)) if d > c => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        // Comma only: decimal if followed by 1-2 digits, thousands otherwise.
        (None, Some(c)) => {
            let frac_len = cleaned.len() - c - 1;
            if frac_len == 3 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        _ => cleaned,
    };

    canonical.parse::<f64>().ok()
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a date in any supported layout and render it ISO (YYYY-MM-DD).
/// Format order is significant for ambiguous numeric dates: day-first
/// conventions are tried before month-first.
pub fn parse_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_with_us_thousands() {
        assert_eq!(parse_number("$1,234.56"), Some(1234.56));
        assert_eq!(parse_number("$150.00"), Some(150.0));
    }

    #[test]
    fn currency_with_european_thousands() {
        assert_eq!(parse_number("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_number("150,00"), Some(150.0));
    }

    #[test]
    fn comma_as_thousands_without_decimals() {
        assert_eq!(parse_number("12,000"), Some(12000.0));
    }

    #[test]
    fn negative_amounts() {
        assert_eq!(parse_number("-42.5"), Some(-42.5));
    }

    #[test]
    fn garbage_is_not_a_number() {
        assert_eq!(parse_number("N/A"), None);
    }

    #[test]
    fn dates_normalize_to_iso() {
        assert_eq!(parse_date("2024-01-15"), Some("2024-01-15".into()));
        assert_eq!(parse_date("15/01/2024"), Some("2024-01-15".into()));
        assert_eq!(parse_date("15.01.2024"), Some("2024-01-15".into()));
        assert_eq!(parse_date("January 15, 2024"), Some("2024-01-15".into()));
    }

    #[test]
    fn unparseable_dates_return_none() {
        assert_eq!(parse_date("sometime last week"), None);
    }

    #[test]
    fn declared_number_normalizes_string_amounts() {
        let value = normalize_value(&serde_json::json!("$150.00"), FieldType::Number).unwrap();
        assert_eq!(value, FieldValue::Number(150.0));
    }

    #[test]
    fn declared_date_keeps_unparseable_text_as_string() {
        let value = normalize_value(&serde_json::json!("circa 1990"), FieldType::Date).unwrap();
        assert_eq!(value, FieldValue::String("circa 1990".into()));
    }

    #[test]
    fn boolean_spellings() {
        let value = normalize_value(&serde_json::json!("yes"), FieldType::Boolean).unwrap();
        assert_eq!(value, FieldValue::Boolean(true));
    }

    #[test]
    fn null_drops_the_value() {
        assert_eq!(
            normalize_value(&serde_json::Value::Null, FieldType::String),
            None
        );
    }
}
