//! Defines the dataset kinds served by the crate and the immutable descriptors
//! that tell the fetcher and extractor where a dataset lives and which archive
//! members belong to it.

use std::fmt;
use std::path::PathBuf;

/// The datasets the loaders know how to acquire and normalize.
///
/// Each kind owns a default on-disk file name (overridable through
/// [`crate::DataConfig`]) and, where one exists, a default remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// OpenFlights extended airport list, stored as a gzip-compressed CSV.
    Airports,
    /// NOAA GHCN daily summaries, a gzip tar archive with one CSV per station.
    Ghcn,
    /// HISDAC settlement data, a zip archive of GeoPackage and CSV files.
    Hisdac,
    /// OpenStreetMap buildings and roads, downloaded in bounding-box chunks.
    Osm,
    /// World socioeconomic indicators, a zip of zips plus Natural Earth countries.
    World,
}

impl DatasetKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            DatasetKind::Airports => "airports",
            DatasetKind::Ghcn => "ghcn",
            DatasetKind::Hisdac => "hisdac",
            DatasetKind::Osm => "osm",
            DatasetKind::World => "world",
        }
    }

    pub(crate) fn default_file_name(&self) -> &'static str {
        match self {
            DatasetKind::Airports => "airports-extended.csv.gz",
            DatasetKind::Ghcn => "ghcnd-data.tar.gz",
            DatasetKind::Hisdac => "hisdac-data.zip",
            DatasetKind::Osm => "osm_chunks",
            DatasetKind::World => "world_data.zip",
        }
    }

    pub(crate) fn default_url(&self) -> Option<&'static str> {
        match self {
            DatasetKind::Airports => Some(
                "https://raw.githubusercontent.com/jpatokal/openflights/master/data/airports-extended.dat",
            ),
            DatasetKind::Ghcn => Some(
                "https://www.ncei.noaa.gov/data/global-historical-climatology-network-daily/archive/daily-summaries-latest.tar.gz",
            ),
            DatasetKind::Hisdac => Some("https://figshare.com/ndownloader/files/42033807"),
            DatasetKind::Osm | DatasetKind::World => None,
        }
    }

    /// Environment variable that overrides [`DatasetKind::default_file_name`].
    pub(crate) fn file_env_var(&self) -> &'static str {
        match self {
            DatasetKind::Airports => "AIRPORTS_FILE",
            DatasetKind::Ghcn => "GHCN_FILE",
            DatasetKind::Hisdac => "HISDAC_FILE",
            DatasetKind::Osm => "OSM_CHUNKS_DIR",
            DatasetKind::World => "WORLD_DATA_FILE",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The container shape of a downloaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// A single CSV file compressed with gzip.
    GzipCsv,
    /// A gzip-compressed tar archive.
    TarGz,
    /// A plain zip archive.
    Zip,
    /// A zip archive whose selected entries are themselves zip archives.
    ZipOfZips,
    /// A directory of parquet chunk files written by the spatial downloader.
    ParquetChunks,
}

/// Name-based selection of archive members.
///
/// A member is selected iff its file name ends with `suffix` (when set), starts
/// with `prefix` (when set) and contains `contains` (when set).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MemberFilter {
    pub suffix: Option<String>,
    pub prefix: Option<String>,
    pub contains: Option<String>,
}

impl MemberFilter {
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: Some(suffix.into()),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_contains(mut self, contains: Option<String>) -> Self {
        self.contains = contains;
        self
    }

    /// Checks a member name against the filter. Only the last path component
    /// of `name` takes part in the match.
    pub fn matches(&self, name: &str) -> bool {
        let file_name = file_name_of(name);
        self.suffix
            .as_deref()
            .map_or(true, |suffix| file_name.ends_with(suffix))
            && self
                .prefix
                .as_deref()
                .map_or(true, |prefix| file_name.starts_with(prefix))
            && self
                .contains
                .as_deref()
                .map_or(true, |needle| file_name.contains(needle))
    }
}

/// How members that describe the same logical source are collapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Every selected member is yielded.
    #[default]
    None,
    /// Only the first member for each distinct `n`-character file name prefix is yielded.
    Prefix(usize),
}

impl DedupKey {
    pub(crate) fn key_for(&self, name: &str) -> Option<String> {
        match self {
            DedupKey::None => None,
            DedupKey::Prefix(len) => Some(file_name_of(name).chars().take(*len).collect()),
        }
    }
}

/// Everything needed to fetch and unpack one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub kind: DatasetKind,
    /// Remote location; `None` for datasets that must be provided locally.
    pub url: Option<String>,
    /// Where the downloaded archive lives on disk.
    pub cache_path: PathBuf,
    pub format: ArchiveFormat,
    pub filter: MemberFilter,
    pub dedup: DedupKey,
    /// Maximum number of distinct logical sources to read.
    pub limit: Option<usize>,
}

pub(crate) fn file_name_of(name: &str) -> &str {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(name)
}
