//! Built-in scorers.
//!
//! A scorer compares one declared output field of the gold example with the
//! same field of the prediction. The field comes from the task signature, so
//! multi-output tasks score the field they declare first rather than whatever
//! key happens to sort first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::{value_to_string, Example, Prediction};

/// Per-run scorer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerOptions {
    /// Output field to compare
    pub field: String,
    /// Relative tolerance for numeric comparison
    pub tolerance: f64,
}

impl ScorerOptions {
    pub fn new(field: impl Into<String>) -> Self {
        ScorerOptions {
            field: field.into(),
            tolerance: 1e-6,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

fn field_pair<'a>(
    example: &'a Example,
    prediction: &'a Prediction,
    options: &ScorerOptions,
) -> Option<(&'a Value, &'a Value)> {
    if example.is_input(&options.field) {
        return None;
    }
    Some((example.get(&options.field)?, prediction.get(&options.field)?))
}

/// Case-sensitive string equality of the scored field.
pub fn exact_match(example: &Example, prediction: &Prediction, options: &ScorerOptions) -> bool {
    match field_pair(example, prediction, options) {
        Some((expected, predicted)) => value_to_string(expected) == value_to_string(predicted),
        None => false,
    }
}

/// Numeric closeness of the scored field within `options.tolerance`.
///
/// Both sides go through [`parse_numeric`], so `"1,234.56"`, `"€ 1.234,56"`
/// and `1234.56` all compare equal. Anything unparsable scores false.
pub fn numeric(example: &Example, prediction: &Prediction, options: &ScorerOptions) -> bool {
    let Some((expected, predicted)) = field_pair(example, prediction, options) else {
        return false;
    };
    match (parse_numeric(expected), parse_numeric(predicted)) {
        (Some(a), Some(b)) => is_close(a, b, options.tolerance),
        _ => false,
    }
}

/// `|a - b| <= tol * max(|a|, |b|)`
pub fn is_close(a: f64, b: f64, rel_tol: f64) -> bool {
    a == b || (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d,.\-]").unwrap());

/// Parse a number written with either decimal convention.
///
/// - numbers pass through
/// - currency symbols and spaces are dropped
/// - with both `,` and `.`, the later one is the decimal separator
/// - a lone `.` always marks decimals (`12.345` is 12.345)
/// - a lone `,` followed by exactly three digits groups thousands (`1,234`
///   is 1234) unless the integer part is zero (`0,125` is 0.125)
/// - a repeated separator always groups thousands
pub fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(raw.trim(), "");
    let s = cleaned.as_ref();

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => normalize_single_separator(s, ','),
        (None, Some(_)) => normalize_single_separator(s, '.'),
        (None, None) => s.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn normalize_single_separator(s: &str, sep: char) -> String {
    let count = s.matches(sep).count();
    let (integer, fraction) = s.rsplit_once(sep).unwrap_or((s, ""));
    let leading_zero = matches!(integer, "" | "-" | "0" | "-0");
    let grouped = count > 1 || (sep == ',' && fraction.len() == 3 && !leading_zero);
    if grouped {
        s.replace(sep, "")
    } else {
        s.replace(sep, ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(expected: Value, predicted: Value) -> (Example, Prediction) {
        let example = Example::from_pairs([("file", json!("a.pdf")), ("amount", expected)])
            .with_inputs(["file"]);
        let outputs = [("amount".to_string(), predicted)].into_iter().collect();
        let prediction = Prediction::new(outputs, None);
        (example, prediction)
    }

    fn opts() -> ScorerOptions {
        ScorerOptions::new("amount")
    }

    #[test]
    fn test_exact_match() {
        let (ex, pred) = pair(json!("Paris"), json!("Paris"));
        assert!(exact_match(&ex, &pred, &opts()));

        let (ex, pred) = pair(json!("Paris"), json!("paris"));
        assert!(!exact_match(&ex, &pred, &opts()));
    }

    #[test]
    fn test_exact_match_compares_string_forms() {
        let (ex, pred) = pair(json!(42), json!("42"));
        assert!(exact_match(&ex, &pred, &opts()));
    }

    #[test]
    fn test_missing_field_scores_false() {
        let (ex, _) = pair(json!(1.0), json!(1.0));
        let empty = Prediction::default();
        assert!(!exact_match(&ex, &empty, &opts()));
        assert!(!numeric(&ex, &empty, &opts()));
        // input fields are never scored
        assert!(!exact_match(&ex, &empty, &ScorerOptions::new("file")));
    }

    #[test]
    fn test_numeric_thousands_separator() {
        let (ex, pred) = pair(json!(1234.56), json!("1,234.56"));
        assert!(numeric(&ex, &pred, &opts().with_tolerance(1e-6)));
    }

    #[test]
    fn test_numeric_tolerance() {
        let (ex, pred) = pair(json!(100.0), json!(100.00001));
        assert!(numeric(&ex, &pred, &opts()));

        let (ex, pred) = pair(json!(100.0), json!(100.1));
        assert!(!numeric(&ex, &pred, &opts()));
        assert!(numeric(&ex, &pred, &opts().with_tolerance(0.01)));
    }

    #[test]
    fn test_numeric_unparsable_is_false() {
        let (ex, pred) = pair(json!(10.0), json!("ten euros"));
        assert!(!numeric(&ex, &pred, &opts()));
    }

    #[test]
    fn test_parse_numeric_formats() {
        let cases = [
            ("1,234.56", 1234.56),
            ("€ 1.234,56", 1234.56),
            ("12,5", 12.5),
            ("1,234", 1234.0),
            ("0.125", 0.125),
            ("12.345", 12.345),
            ("0,125", 0.125),
            ("-0,125", -0.125),
            ("1.234.567", 1234567.0),
            ("-80.00", -80.0),
            ("  99 ", 99.0),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_numeric(&json!(input)), Some(expected), "parsing {:?}", input);
        }
        assert_eq!(parse_numeric(&json!(3)), Some(3.0));
        assert_eq!(parse_numeric(&json!(null)), None);
        assert_eq!(parse_numeric(&json!("")), None);
    }

    #[test]
    fn test_numeric_three_decimal_point() {
        let (ex, pred) = pair(json!(12345), json!("12.345"));
        assert!(!numeric(&ex, &pred, &opts()));

        let (ex, pred) = pair(json!(0.125), json!("0.125"));
        assert!(numeric(&ex, &pred, &opts()));
    }

    #[test]
    fn test_is_close_zero() {
        assert!(is_close(0.0, 0.0, 1e-6));
        assert!(!is_close(0.0, 1e-9, 1e-6));
    }
}
