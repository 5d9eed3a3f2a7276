//! OpenStreetMap upstream: Nominatim for place lookup, the Overpass API for
//! building footprints and the road network.

use crate::spatial::error::SpatialError;
use crate::spatial::source::{Feature, NetworkType, RawEdge, SpatialSource};
use crate::types::bbox::BoundingBox;
use crate::types::tag_value::{GeometryValue, Scalar, TagValue};
use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use haversine::{distance, Location as HaversineLocation, Units};
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const QUERY_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    /// `[south, north, west, east]` as strings.
    boundingbox: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    nodes: Vec<i64>,
    #[serde(default)]
    geometry: Vec<LatLon>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl From<LatLon> for Coord<f64> {
    fn from(point: LatLon) -> Self {
        Coord {
            x: point.lon,
            y: point.lat,
        }
    }
}

/// Overpass bounding boxes are `south,west,north,east`.
fn overpass_bbox(bbox: &BoundingBox) -> String {
    format!("{},{},{},{}", bbox.min_y, bbox.min_x, bbox.max_y, bbox.max_x)
}

fn buildings_query(bbox: &BoundingBox) -> String {
    let area = overpass_bbox(bbox);
    format!(
        "[out:json][timeout:{QUERY_TIMEOUT_SECS}];(node[\"building\"]({area});way[\"building\"]({area}););out tags geom;"
    )
}

fn roads_query(bbox: &BoundingBox) -> String {
    format!(
        "[out:json][timeout:{QUERY_TIMEOUT_SECS}];way[\"highway\"]({});out body geom;",
        overpass_bbox(bbox)
    )
}

fn length_metres(points: &[LatLon]) -> f64 {
    points
        .windows(2)
        .map(|pair| {
            distance(
                HaversineLocation {
                    latitude: pair[0].lat,
                    longitude: pair[0].lon,
                },
                HaversineLocation {
                    latitude: pair[1].lat,
                    longitude: pair[1].lon,
                },
                Units::Kilometers,
            ) * 1000.0
        })
        .sum()
}

fn building_geometry(element: &OverpassElement) -> GeometryValue {
    match element.kind.as_str() {
        "node" => match (element.lon, element.lat) {
            (Some(x), Some(y)) => GeometryValue::Shape(Geometry::Point(Point::new(x, y))),
            _ => GeometryValue::Missing,
        },
        _ if element.geometry.is_empty() => GeometryValue::Missing,
        _ => {
            let ring: LineString<f64> = element.geometry.iter().copied().map(Coord::from).collect();
            if element.geometry.len() >= 4 && ring.is_closed() {
                GeometryValue::Shape(Geometry::Polygon(Polygon::new(ring, vec![])))
            } else {
                GeometryValue::Shape(Geometry::LineString(ring))
            }
        }
    }
}

fn features_from_response(
    response: OverpassResponse,
    bbox: &BoundingBox,
) -> Result<Vec<Feature>, SpatialError> {
    let features: Vec<Feature> = response
        .elements
        .into_iter()
        .filter(|element| element.kind == "node" || element.kind == "way")
        .map(|element| Feature {
            geometry: building_geometry(&element),
            element_type: element.kind,
            osmid: element.id,
            tags: element.tags,
        })
        .collect();
    if features.is_empty() {
        return Err(SpatialError::NoMatchingFeatures(bbox.to_string()));
    }
    Ok(features)
}

/// `Some(true)` for a way drawn in travel direction, `Some(false)` for one
/// drawn against it, `None` for two-way traffic.
fn oneway_direction(tags: &BTreeMap<String, String>) -> Option<bool> {
    match tags.get("oneway").map(String::as_str) {
        Some("yes" | "true" | "1") => Some(true),
        Some("-1" | "reverse") => Some(false),
        Some(_) => None,
        None if tags.get("junction").map(String::as_str) == Some("roundabout")
            || tags.get("highway").map(String::as_str) == Some("motorway") =>
        {
            Some(true)
        }
        None => None,
    }
}

fn edges_from_response(
    response: OverpassResponse,
    bbox: &BoundingBox,
    network: NetworkType,
) -> Result<Vec<RawEdge>, SpatialError> {
    let excluded = network.excluded_highways();
    let mut keys: HashMap<(i64, i64), u32> = HashMap::new();
    let mut edges = Vec::new();

    for way in response.elements {
        if way.kind != "way" || way.nodes.len() < 2 || way.geometry.len() < 2 {
            continue;
        }
        let Some(highway) = way.tags.get("highway") else {
            continue;
        };
        if excluded.contains(&highway.as_str()) || way.tags.get("area").map(String::as_str) == Some("yes") {
            continue;
        }

        let oneway = if network.respects_oneway() {
            oneway_direction(&way.tags)
        } else {
            None
        };
        let mut points = way.geometry.clone();
        let (mut first, mut last) = (way.nodes[0], way.nodes[way.nodes.len() - 1]);
        if oneway == Some(false) {
            points.reverse();
            std::mem::swap(&mut first, &mut last);
        }
        let length = length_metres(&points);

        let mut attrs: BTreeMap<String, TagValue> = way
            .tags
            .iter()
            .map(|(name, raw)| (name.clone(), TagValue::from_osm_tag(raw)))
            .collect();
        attrs.insert("osmid".to_string(), Scalar::Int(way.id).into());
        attrs.insert("length".to_string(), Scalar::Float(length).into());

        let mut directions = vec![(first, last, false)];
        if oneway.is_none() {
            directions.push((last, first, true));
        }
        for (u, v, reversed) in directions {
            let key = keys.entry((u, v)).or_insert(0);
            let mut coords: Vec<Coord<f64>> = points.iter().copied().map(Coord::from).collect();
            if reversed {
                coords.reverse();
            }
            let mut edge_attrs = attrs.clone();
            edge_attrs.insert("reversed".to_string(), Scalar::Bool(reversed).into());
            edges.push(RawEdge {
                u,
                v,
                key: *key,
                attrs: edge_attrs,
                geometry: GeometryValue::Shape(Geometry::LineString(LineString::new(coords))),
            });
            *key += 1;
        }
    }

    if edges.is_empty() {
        return Err(SpatialError::NoGraphNodes(bbox.to_string()));
    }
    Ok(edges)
}

#[derive(Debug, Clone)]
pub struct OverpassSource {
    client: Client,
    overpass_url: String,
    nominatim_url: String,
}

impl OverpassSource {
    pub fn new(
        overpass_url: impl Into<String>,
        nominatim_url: impl Into<String>,
    ) -> Result<Self, SpatialError> {
        let overpass_url = overpass_url.into();
        let client = Client::builder()
            .user_agent(format!("vizdata/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(QUERY_TIMEOUT_SECS + 30))
            .build()
            .map_err(|e| SpatialError::Request(overpass_url.clone(), e))?;
        Ok(Self {
            client,
            overpass_url,
            nominatim_url: nominatim_url.into(),
        })
    }

    async fn read_json<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, SpatialError> {
        let status = response.status();
        if !status.is_success() {
            return Err(SpatialError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SpatialError::Request(url.to_string(), e))?;
        serde_json::from_slice(&body)
            .map_err(|e| SpatialError::InvalidResponse(url.to_string(), e.to_string()))
    }

    async fn overpass(&self, query: String) -> Result<OverpassResponse, SpatialError> {
        debug!("Overpass query: {}", query);
        let response = self
            .client
            .post(&self.overpass_url)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|e| SpatialError::Request(self.overpass_url.clone(), e))?;
        Self::read_json(&self.overpass_url, response).await
    }
}

impl SpatialSource for OverpassSource {
    async fn area_bbox(&self, place: &str) -> Result<BoundingBox, SpatialError> {
        let url = format!("{}/search", self.nominatim_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SpatialError::Request(url.clone(), e))?;
        let places: Vec<NominatimPlace> = Self::read_json(&url, response).await?;
        let place_match = places
            .into_iter()
            .next()
            .ok_or_else(|| SpatialError::PlaceNotFound(place.to_string()))?;

        let bounds = place_match
            .boundingbox
            .iter()
            .map(|value| value.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SpatialError::InvalidResponse(url.clone(), e.to_string()))?;
        let [south, north, west, east] = bounds[..] else {
            return Err(SpatialError::InvalidResponse(
                url,
                format!("expected 4 bounding box values, got {}", bounds.len()),
            ));
        };
        let bbox = BoundingBox::new(west, south, east, north);
        info!("Bounding box for {}: {}", place, bbox);
        Ok(bbox)
    }

    async fn features(&self, bbox: &BoundingBox) -> Result<Vec<Feature>, SpatialError> {
        let response = self.overpass(buildings_query(bbox)).await?;
        features_from_response(response, bbox)
    }

    async fn graph(
        &self,
        bbox: &BoundingBox,
        network: NetworkType,
    ) -> Result<Vec<RawEdge>, SpatialError> {
        let response = self.overpass(roads_query(bbox)).await?;
        edges_from_response(response, bbox, network)
    }
}
