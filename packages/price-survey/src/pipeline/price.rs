//! Price and interest normalization.
//!
//! Values arrive as structured numbers, formatted currency strings, or only
//! inside free text. Nothing is rounded here.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Currency symbol, digits, optional two-digit fraction.
static TEXT_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$£€]\s?(\d[\d,]*(?:\.\d{2})?)").expect("static pattern")
});

/// First number in a formatted string.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("static pattern"));

/// Parse a formatted currency string such as `$1,299.00` or `12.50 USD`.
pub fn parse_currency(formatted: &str) -> Option<f64> {
    let number = NUMBER.find(formatted)?;
    parse_number(number.as_str())
}

/// First currency amount found in free text.
pub fn price_from_text(text: &str) -> Option<f64> {
    let captures = TEXT_PRICE.captures(text)?;
    parse_number(captures.get(1)?.as_str())
}

fn parse_number(digits: &str) -> Option<f64> {
    digits
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// A structured API value: number, or a string holding one.
pub fn structured_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_currency(s),
        _ => None,
    }
}

/// Where a result's price may be found, in order of preference.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceSources<'a> {
    pub structured: Option<&'a Value>,
    pub formatted: Option<&'a str>,
    pub title: Option<&'a str>,
    pub snippet: Option<&'a str>,
}

impl<'a> PriceSources<'a> {
    /// Normalized price, or `None` when no encoding yields one.
    pub fn extract(&self) -> Option<f64> {
        if let Some(value) = self.structured.and_then(structured_value) {
            return Some(value);
        }
        if let Some(value) = self.formatted.and_then(parse_currency) {
            return Some(value);
        }
        self.title
            .and_then(price_from_text)
            .or_else(|| self.snippet.and_then(price_from_text))
    }
}

/// Interest value of one time-series point.
///
/// Prefers the numeric `extracted_value`; `"<1"` style strings are read as
/// their bound.
pub fn interest_value(point: &Value) -> Option<f64> {
    let first = point.get("values")?.as_array()?.first()?;
    if let Some(value) = first.get("extracted_value").and_then(Value::as_f64) {
        return Some(value);
    }
    first
        .get("value")
        .and_then(Value::as_str)
        .map(|s| s.trim().trim_start_matches('<').trim())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// One entry per timeline point, oldest first. A point without a readable
/// value stays in place as `None` so later weeks keep their column.
pub fn interest_series(payload: &Value) -> Vec<Option<f64>> {
    payload
        .pointer("/interest_over_time/timeline_data")
        .and_then(Value::as_array)
        .map(|points| points.iter().map(interest_value).collect())
        .unwrap_or_default()
}
