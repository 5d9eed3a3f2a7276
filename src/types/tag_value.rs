//! Loosely-typed attribute values as they arrive from map sources, before the
//! normalization rules in [`crate::normalize`] reduce them to one typed scalar.

use geo_types::Geometry;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Interprets the value as a boolean. Numbers are true when non-zero and
    /// text when it reads `true` regardless of case.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Bool(value) => *value,
            Scalar::Int(value) => *value != 0,
            Scalar::Float(value) => *value != 0.0 && !value.is_nan(),
            Scalar::Text(value) => value.trim().eq_ignore_ascii_case("true"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// An attribute that may hold one value, several values, or a string that
/// encodes several values.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Missing,
    Scalar(Scalar),
    /// Values merged from several source elements, e.g. the ids of the ways
    /// that were joined into one road edge.
    List(Vec<Scalar>),
    /// A stringified collection such as `"[4312, 4313]"`.
    Delimited(String),
}

impl TagValue {
    /// Builds a value from an OpenStreetMap tag, where `;` separates multiple values.
    pub fn from_osm_tag(raw: &str) -> Self {
        if raw.contains(';') {
            TagValue::List(
                raw.split(';')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(Scalar::from)
                    .collect(),
            )
        } else {
            TagValue::Scalar(Scalar::from(raw))
        }
    }

    /// Builds a value from text that may hold a bracketed list.
    pub fn parse_encoded(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            TagValue::Delimited(trimmed.to_string())
        } else {
            TagValue::Scalar(Scalar::from(raw))
        }
    }
}

impl From<Scalar> for TagValue {
    fn from(value: Scalar) -> Self {
        TagValue::Scalar(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Scalar(Scalar::from(value))
    }
}

impl From<Option<Scalar>> for TagValue {
    fn from(value: Option<Scalar>) -> Self {
        value.map_or(TagValue::Missing, TagValue::Scalar)
    }
}

/// A geometry column cell.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryValue {
    Shape(Geometry<f64>),
    /// Already converted to well-known text.
    Wkt(String),
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_tag_splits_on_semicolon() {
        assert_eq!(
            TagValue::from_osm_tag("primary;secondary"),
            TagValue::List(vec![Scalar::from("primary"), Scalar::from("secondary")])
        );
        assert_eq!(
            TagValue::from_osm_tag("Gran Via"),
            TagValue::Scalar(Scalar::from("Gran Via"))
        );
    }

    #[test]
    fn test_encoded_list_is_delimited() {
        assert_eq!(
            TagValue::parse_encoded("[4312, 4313]"),
            TagValue::Delimited("[4312, 4313]".to_string())
        );
        assert_eq!(TagValue::parse_encoded("4312"), TagValue::from("4312"));
    }

    #[test]
    fn test_truthiness() {
        assert!(Scalar::from("True").is_truthy());
        assert!(!Scalar::from("no").is_truthy());
        assert!(Scalar::Int(1).is_truthy());
        assert!(!Scalar::Float(f64::NAN).is_truthy());
    }
}
