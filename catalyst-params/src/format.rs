//! Leaf formatting shared by the schema-driven and structural encoders.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use catalyst_core::Value;

/// Fixed-width UTC timestamp: `YYYYMMDDHHmmssSSS`.
const DATE_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const DATE_WIDTH: usize = 17;

/// `None` for years outside `0..=9999`, which do not fit four digits.
pub fn format_date(date: &DateTime<Utc>) -> Option<String> {
    (0..=9999)
        .contains(&date.year())
        .then(|| date.format(DATE_FORMAT).to_string())
}

/// Parses a fixed-width timestamp. Anything else yields `None`.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != DATE_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
    let year = s[0..4].parse::<i32>().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_milli_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
        field(14..17)?,
    )?;
    Some(naive.and_utc())
}

/// Renders a number the way `Number#toString` does for everyday values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // Covers -0.
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Inverse of [`format_number`].
pub fn parse_number(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        // Rust also accepts "inf" and "infinity"; JavaScript does not.
        _ if s.is_empty() || s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            None
        }
        _ => s.parse().ok(),
    }
}

/// String form of a scalar, or `None` for containers, instances and
/// `undefined`.
pub fn scalar_string(value: &Value) -> Option<String> {
    Some(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Date(d) => format_date(d)?,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_fixed_width() {
        let date = DateTime::parse_from_rfc3339("2025-03-13T00:52:22.213Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_date(&date).as_deref(), Some("20250313005222213"));
        assert_eq!(parse_date("20250313005222213"), Some(date));
    }

    #[test]
    fn date_outside_four_digit_years_has_no_form() {
        let far = NaiveDate::from_ymd_opt(10000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(format_date(&far), None);
        assert_eq!(scalar_string(&Value::Date(far)), None);

        let before = NaiveDate::from_ymd_opt(-1, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(format_date(&before), None);

        let first = NaiveDate::from_ymd_opt(0, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(format_date(&first).as_deref(), Some("00000101000000000"));
    }

    #[test]
    fn date_rejects_malformed() {
        assert_eq!(parse_date("2025031300522221"), None);
        assert_eq!(parse_date("2025-03-13T00:52"), None);
        assert_eq!(parse_date("20251313005222213"), None);
    }

    #[test]
    fn numbers_match_javascript_rendering() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn number_parsing() {
        assert_eq!(parse_number("3"), Some(3.0));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("-Infinity"), Some(f64::NEG_INFINITY));
        assert!(parse_number("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
    }
}
