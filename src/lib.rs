mod archive;
mod cache;
mod config;
mod error;
mod fetch;
mod loaders;
mod merge;
mod normalize;
mod spatial;
mod types;
mod utils;
mod vizdata;

pub use error::{ErrorKind, VizDataError};
pub use vizdata::*;

pub use config::*;
pub use loaders::osm::OsmDataType;
pub use loaders::world::CountryShape;
pub use loaders::LoadedData;

pub use archive::extractor::{extract, ArchiveExtractor, Members, Selection};
pub use archive::geopackage::read_geopackage;
pub use cache::lock::{LockFile, LockGuard, TokioWaiter, Waiter};
pub use cache::memo::{CacheManager, LoadCache};
pub use fetch::fetcher::{ArchiveFetcher, FetchOptions};
pub use merge::country_codes::{reconcile, CountryCodeMapping, MANUAL_OVERRIDES};
pub use merge::merger::merge;
pub use normalize::csv::{read_csv, CsvLayout};
pub use normalize::rules::*;
pub use spatial::downloader::{ChunkedDownloader, DownloadOptions, DownloadSummary};
pub use spatial::overpass::OverpassSource;
pub use spatial::roads::{buildings_frame, fix_road, roads_frame, RoadRow};
pub use spatial::source::{Feature, NetworkType, RawEdge, SpatialSource};

pub use types::bbox::{BBoxChunk, BoundingBox, PartitionError, MAX_CHUNKS};
pub use types::raw_member::{MemberFormat, RawMember};
pub use types::source::{ArchiveFormat, DatasetKind, DedupKey, MemberFilter, SourceDescriptor};
pub use types::tag_value::{GeometryValue, Scalar, TagValue};

pub use archive::error::{ArchiveError, GeoPackageError};
pub use cache::error::LockError;
pub use fetch::error::FetchError;
pub use merge::error::MergeError;
pub use normalize::error::NormalizeError;
pub use spatial::error::SpatialError;
