//! Flattening of chunk downloads into the persisted building and road tables.

use crate::normalize::rules::{
    geometry_to_text, keep_any_true, keep_first, keep_first_int, keep_max,
};
use crate::spatial::source::{Feature, RawEdge};
use crate::types::tag_value::{Scalar, TagValue};
use polars::prelude::*;

/// Edge attributes that are not persisted.
pub const DROPPED_ROAD_ATTRIBUTES: &[&str] = &[
    "width", "service", "access", "bridge", "maxspeed", "tunnel", "junction", "oneway",
];

/// One row of the roads table.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadRow {
    pub u: i64,
    pub v: i64,
    pub key: u32,
    pub osmid: Option<i64>,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub highway: Option<String>,
    pub lanes: Option<f64>,
    pub reversed: bool,
    pub length: Option<f64>,
    pub geometry: Option<String>,
}

fn first_text(attrs: &std::collections::BTreeMap<String, TagValue>, name: &str) -> Option<String> {
    attrs.get(name).and_then(keep_first).map(Scalar::into_text)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Collapses the multi-valued attributes of an edge into one value each.
pub fn fix_road(mut edge: RawEdge) -> RoadRow {
    for dropped in DROPPED_ROAD_ATTRIBUTES {
        edge.attrs.remove(*dropped);
    }
    let attrs = &edge.attrs;
    RoadRow {
        u: edge.u,
        v: edge.v,
        key: edge.key,
        osmid: attrs.get("osmid").and_then(keep_first_int),
        name: first_text(attrs, "name"),
        reference: first_text(attrs, "ref"),
        highway: first_text(attrs, "highway"),
        lanes: attrs.get("lanes").map(keep_max).and_then(finite),
        reversed: attrs.get("reversed").is_some_and(keep_any_true),
        length: attrs.get("length").map(keep_max).and_then(finite),
        geometry: geometry_to_text(&edge.geometry),
    }
}

pub fn roads_frame(rows: &[RoadRow]) -> PolarsResult<DataFrame> {
    df! {
        "u" => rows.iter().map(|r| r.u).collect::<Vec<_>>(),
        "v" => rows.iter().map(|r| r.v).collect::<Vec<_>>(),
        "key" => rows.iter().map(|r| r.key).collect::<Vec<_>>(),
        "osmid" => rows.iter().map(|r| r.osmid).collect::<Vec<_>>(),
        "name" => rows.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
        "ref" => rows.iter().map(|r| r.reference.clone()).collect::<Vec<_>>(),
        "highway" => rows.iter().map(|r| r.highway.clone()).collect::<Vec<_>>(),
        "lanes" => rows.iter().map(|r| r.lanes).collect::<Vec<_>>(),
        "reversed" => rows.iter().map(|r| r.reversed).collect::<Vec<_>>(),
        "length" => rows.iter().map(|r| r.length).collect::<Vec<_>>(),
        "geometry" => rows.iter().map(|r| r.geometry.clone()).collect::<Vec<_>>(),
    }
}

pub fn buildings_frame(features: &[Feature]) -> PolarsResult<DataFrame> {
    let tag = |name: &str| -> Vec<Option<String>> {
        features.iter().map(|f| f.tags.get(name).cloned()).collect()
    };
    df! {
        "element_type" => features.iter().map(|f| f.element_type.clone()).collect::<Vec<_>>(),
        "osmid" => features.iter().map(|f| f.osmid).collect::<Vec<_>>(),
        "building" => tag("building"),
        "name" => tag("name"),
        "geometry" => features.iter().map(|f| geometry_to_text(&f.geometry)).collect::<Vec<_>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tag_value::GeometryValue;
    use geo_types::{line_string, Geometry};
    use std::collections::BTreeMap;

    fn edge(attrs: Vec<(&str, TagValue)>) -> RawEdge {
        RawEdge {
            u: 1,
            v: 2,
            key: 0,
            attrs: attrs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            geometry: GeometryValue::Shape(Geometry::LineString(line_string![
                (x: -3.0, y: 40.0),
                (x: -3.0, y: 40.1),
            ])),
        }
    }

    #[test]
    fn test_fix_road_collapses_lists() {
        let row = fix_road(edge(vec![
            ("osmid", TagValue::List(vec![Scalar::Int(27), Scalar::Int(28)])),
            ("name", TagValue::List(vec![Scalar::from("Gran Via"), Scalar::from("Calle Mayor")])),
            ("ref", TagValue::from("M-30")),
            ("highway", TagValue::from_osm_tag("primary;secondary")),
            ("lanes", TagValue::from_osm_tag("2;4")),
            ("reversed", TagValue::List(vec![Scalar::Bool(false), Scalar::Bool(true)])),
            ("length", Scalar::Float(12.5).into()),
            ("maxspeed", TagValue::from("50")),
        ]));

        assert_eq!(row.osmid, Some(27));
        assert_eq!(row.name.as_deref(), Some("Gran Via"));
        assert_eq!(row.reference.as_deref(), Some("M-30"));
        assert_eq!(row.highway.as_deref(), Some("primary"));
        assert_eq!(row.lanes, Some(4.0));
        assert!(row.reversed);
        assert_eq!(row.length, Some(12.5));
        assert!(row.geometry.unwrap().starts_with("LINESTRING"));
    }

    #[test]
    fn test_fix_road_with_missing_attributes() {
        let row = fix_road(edge(vec![("lanes", TagValue::from("unknown"))]));
        assert_eq!(row.osmid, None);
        assert_eq!(row.name, None);
        assert_eq!(row.lanes, None);
        assert!(!row.reversed);
    }

    #[test]
    fn test_frames_have_fixed_columns() -> PolarsResult<()> {
        let rows = vec![fix_road(edge(vec![("osmid", Scalar::Int(9).into())]))];
        let roads = roads_frame(&rows)?;
        let names: Vec<&str> = roads.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["u", "v", "key", "osmid", "name", "ref", "highway", "lanes", "reversed", "length", "geometry"]
        );
        assert_eq!(roads.column("reversed")?.dtype(), &DataType::Boolean);

        let features = vec![Feature {
            element_type: "way".to_string(),
            osmid: 7,
            tags: BTreeMap::from([("building".to_string(), "yes".to_string())]),
            geometry: GeometryValue::Missing,
        }];
        let buildings = buildings_frame(&features)?;
        assert_eq!(buildings.shape(), (1, 5));
        assert_eq!(buildings.column("name")?.null_count(), 1);
        Ok(())
    }
}
