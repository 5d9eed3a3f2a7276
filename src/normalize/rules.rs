//! Reduction rules that turn a multi-valued or encoded attribute into one scalar.
//!
//! Every rule is total: malformed input produces a missing value (`None`,
//! `NaN` or `false`), never an error. Applying a rule to a value it already
//! produced returns the same value.

use crate::types::tag_value::{GeometryValue, Scalar, TagValue};
use wkt::ToWkt;

/// Runs of ASCII digits, in order. `"ab12-3c"` gives `["12", "3"]`.
fn digit_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
}

/// Decimal numbers embedded in `text`, units and separators stripped.
fn numeric_tokens(text: &str) -> impl Iterator<Item = f64> + '_ {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NAN, f64::max)
}

fn scalar_max(value: &Scalar) -> f64 {
    match value {
        Scalar::Bool(flag) => f64::from(u8::from(*flag)),
        Scalar::Int(number) => *number as f64,
        Scalar::Float(number) => *number,
        Scalar::Text(text) => max_of(numeric_tokens(text)),
    }
}

fn scalar_int(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Bool(flag) => Some(i64::from(*flag)),
        Scalar::Int(number) => Some(*number),
        Scalar::Float(number) if number.is_finite() => Some(number.trunc() as i64),
        Scalar::Float(_) => None,
        Scalar::Text(text) => digit_tokens(text).next().and_then(|t| t.parse().ok()),
    }
}

fn text_is_true(text: &str) -> bool {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_digit() && !c.is_whitespace())
        .collect();
    stripped.eq_ignore_ascii_case("true")
}

/// Largest numeric value held by `value`, `NaN` when there is none.
///
/// `["2", "3"]` gives `3.0`, `"50 mph"` gives `50.0`.
pub fn keep_max(value: &TagValue) -> f64 {
    match value {
        TagValue::Missing => f64::NAN,
        TagValue::Scalar(scalar) => scalar_max(scalar),
        TagValue::List(items) => max_of(items.iter().map(scalar_max)),
        TagValue::Delimited(text) => max_of(numeric_tokens(text)),
    }
}

/// First element of a list, or the first digit run of an encoded string.
/// Scalars pass through.
pub fn keep_first(value: &TagValue) -> Option<Scalar> {
    match value {
        TagValue::Missing => None,
        TagValue::Scalar(scalar) => Some(scalar.clone()),
        TagValue::List(items) => items.first().cloned(),
        TagValue::Delimited(text) => digit_tokens(text).next().map(Scalar::from),
    }
}

/// Like [`keep_first`] but coerced to an integer; `None` stands for NaN.
pub fn keep_first_int(value: &TagValue) -> Option<i64> {
    match value {
        TagValue::Missing => None,
        TagValue::Scalar(scalar) => scalar_int(scalar),
        TagValue::List(items) => items.first().and_then(scalar_int),
        TagValue::Delimited(text) => digit_tokens(text).next().and_then(|t| t.parse().ok()),
    }
}

/// True when any element is true. Strings are compared with `"true"` ignoring
/// case, digits and whitespace.
pub fn keep_any_true(value: &TagValue) -> bool {
    match value {
        TagValue::Missing => false,
        TagValue::Scalar(Scalar::Text(text)) | TagValue::Delimited(text) => text_is_true(text),
        TagValue::Scalar(scalar) => scalar.is_truthy(),
        TagValue::List(items) => items.iter().any(Scalar::is_truthy),
    }
}

/// Well-known text for a geometry. Text and missing cells pass through.
pub fn geometry_to_text(value: &GeometryValue) -> Option<String> {
    match value {
        GeometryValue::Shape(geometry) => Some(geometry.wkt_string()),
        GeometryValue::Wkt(text) => Some(text.clone()),
        GeometryValue::Missing => None,
    }
}

impl Scalar {
    /// String form used when a scalar lands in a text column.
    pub fn into_text(self) -> String {
        match self {
            Scalar::Bool(flag) => flag.to_string(),
            Scalar::Int(number) => number.to_string(),
            Scalar::Float(number) => number.to_string(),
            Scalar::Text(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, Geometry};

    const MALFORMED: &[&str] = &[
        "", " ", "abc", ";;;", "--", "[]", "[, ]", "nan", "NaN", "∞", "é", "1e400",
        "99999999999999999999999", ".", "..5..", "\u{0}", "true", "[None]",
    ];

    #[test]
    fn test_keep_max_takes_largest_numeric_token() {
        let lanes = TagValue::List(vec![Scalar::from("2"), Scalar::from("3"), Scalar::from("1")]);
        assert_eq!(keep_max(&lanes), 3.0);
        assert_eq!(keep_max(&TagValue::from("50 mph")), 50.0);
        assert_eq!(keep_max(&TagValue::from("2;4")), 4.0);
        assert_eq!(keep_max(&TagValue::from("7.5 m")), 7.5);
        assert_eq!(keep_max(&TagValue::from(Scalar::Int(4))), 4.0);
        assert!(keep_max(&TagValue::from("none")).is_nan());
        assert!(keep_max(&TagValue::Missing).is_nan());
    }

    #[test]
    fn test_keep_max_is_idempotent() {
        let once = keep_max(&TagValue::List(vec![Scalar::from("2"), Scalar::from("5")]));
        assert_eq!(keep_max(&TagValue::from(Scalar::Float(once))), once);
    }

    #[test]
    fn test_keep_first_of_list_and_encoded_string() {
        let names = TagValue::List(vec![Scalar::from("Gran Via"), Scalar::from("Calle Mayor")]);
        assert_eq!(keep_first(&names), Some(Scalar::from("Gran Via")));
        assert_eq!(
            keep_first(&TagValue::Delimited("[4312, 4313]".to_string())),
            Some(Scalar::from("4312"))
        );
        assert_eq!(keep_first(&TagValue::List(vec![])), None);
        assert_eq!(keep_first(&TagValue::Delimited("[]".to_string())), None);
    }

    #[test]
    fn test_keep_first_passes_scalars_through() {
        let name = TagValue::from("Calle de Alcalá");
        assert_eq!(keep_first(&name), Some(Scalar::from("Calle de Alcalá")));
        let again = TagValue::from(keep_first(&name));
        assert_eq!(keep_first(&again), keep_first(&name));
    }

    #[test]
    fn test_keep_first_int() {
        assert_eq!(
            keep_first_int(&TagValue::List(vec![Scalar::Int(27), Scalar::Int(28)])),
            Some(27)
        );
        assert_eq!(keep_first_int(&TagValue::Delimited("[981, 982]".to_string())), Some(981));
        assert_eq!(keep_first_int(&TagValue::from("way/123")), Some(123));
        assert_eq!(keep_first_int(&TagValue::from(Scalar::Int(5))), Some(5));
        assert_eq!(keep_first_int(&TagValue::from(Scalar::Float(f64::NAN))), None);
        assert_eq!(keep_first_int(&TagValue::from("no digits")), None);
    }

    #[test]
    fn test_first_rules_never_fail_on_malformed_strings() {
        for raw in MALFORMED {
            for value in [
                TagValue::Delimited(raw.to_string()),
                TagValue::from(*raw),
                TagValue::List(vec![Scalar::from(*raw)]),
            ] {
                let _ = keep_first(&value);
                let _ = keep_first_int(&value);
                let _ = keep_max(&value);
                let _ = keep_any_true(&value);
            }
        }
        assert_eq!(keep_first_int(&TagValue::Delimited("99999999999999999999999".into())), None);
    }

    #[test]
    fn test_keep_any_true() {
        assert!(keep_any_true(&TagValue::List(vec![Scalar::Bool(false), Scalar::Bool(true)])));
        assert!(!keep_any_true(&TagValue::List(vec![Scalar::Bool(false), Scalar::Bool(false)])));
        assert!(keep_any_true(&TagValue::from("True")));
        assert!(keep_any_true(&TagValue::Delimited(" TRUE1 ".to_string())));
        assert!(!keep_any_true(&TagValue::from("False")));
        assert!(!keep_any_true(&TagValue::Missing));
        assert!(keep_any_true(&TagValue::from(Scalar::Bool(true))));
    }

    #[test]
    fn test_geometry_to_text() {
        let point = GeometryValue::Shape(Geometry::Point(point!(x: 1.0, y: 2.0)));
        assert_eq!(geometry_to_text(&point).as_deref(), Some("POINT(1 2)"));

        let line = GeometryValue::Shape(Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]));
        let text = geometry_to_text(&line).unwrap();
        assert!(text.starts_with("LINESTRING"));
        assert_eq!(geometry_to_text(&GeometryValue::Wkt(text.clone())), Some(text));
        assert_eq!(geometry_to_text(&GeometryValue::Missing), None);
    }
}
