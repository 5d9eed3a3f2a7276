use crate::spatial::error::SpatialError;
use crate::types::bbox::BoundingBox;
use crate::types::tag_value::{GeometryValue, TagValue};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// An area feature (a building footprint, say) with its raw tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub element_type: String,
    pub osmid: i64,
    pub tags: BTreeMap<String, String>,
    pub geometry: GeometryValue,
}

/// One directed edge of a road graph, attributes not yet normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub u: i64,
    pub v: i64,
    pub key: u32,
    pub attrs: BTreeMap<String, TagValue>,
    pub geometry: GeometryValue,
}

/// Which ways make up the road graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkType {
    #[default]
    All,
    Drive,
    Walk,
    Bike,
}

impl NetworkType {
    /// Highway classes excluded from the network.
    pub(crate) fn excluded_highways(&self) -> &'static [&'static str] {
        match self {
            NetworkType::All => &["proposed", "construction", "abandoned", "platform", "raceway"],
            NetworkType::Drive => &[
                "abandoned", "bridleway", "bus_guideway", "construction", "corridor", "cycleway",
                "elevator", "escalator", "footway", "path", "pedestrian", "planned", "platform",
                "proposed", "raceway", "service", "steps", "track",
            ],
            NetworkType::Walk => &[
                "abandoned", "bus_guideway", "construction", "cycleway", "motor", "motorway",
                "motorway_link", "planned", "platform", "proposed", "raceway",
            ],
            NetworkType::Bike => &[
                "abandoned", "bus_guideway", "construction", "corridor", "elevator", "escalator",
                "footway", "motor", "motorway", "motorway_link", "planned", "platform", "proposed",
                "raceway", "steps",
            ],
        }
    }

    /// Walking ignores one-way restrictions.
    pub(crate) fn respects_oneway(&self) -> bool {
        !matches!(self, NetworkType::Walk)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkType::All => "all",
            NetworkType::Drive => "drive",
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(NetworkType::All),
            "drive" => Ok(NetworkType::Drive),
            "walk" => Ok(NetworkType::Walk),
            "bike" => Ok(NetworkType::Bike),
            other => Err(format!("unknown network type '{}'", other)),
        }
    }
}

/// Upstream provider of map geometry for the chunked downloader.
///
/// Empty regions must be reported as [`SpatialError::NoMatchingFeatures`] or
/// [`SpatialError::NoGraphNodes`]; every other error aborts the download.
pub trait SpatialSource: Send + Sync {
    /// Bounding box of a named place.
    fn area_bbox(
        &self,
        place: &str,
    ) -> impl Future<Output = Result<BoundingBox, SpatialError>> + Send;

    /// Building footprints inside `bbox`.
    fn features(
        &self,
        bbox: &BoundingBox,
    ) -> impl Future<Output = Result<Vec<Feature>, SpatialError>> + Send;

    /// Road graph edges inside `bbox`.
    fn graph(
        &self,
        bbox: &BoundingBox,
        network: NetworkType,
    ) -> impl Future<Output = Result<Vec<RawEdge>, SpatialError>> + Send;
}
