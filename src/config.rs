//! Environment-driven settings shared by every loader.

use crate::cache::lock::{LockFile, DEFAULT_POLL_INTERVAL, LOCK_FILE_NAME};
use crate::spatial::downloader::{DownloadOptions, DEFAULT_CHUNK_SIZE_DEGREES, DEFAULT_WORKERS};
use crate::spatial::overpass::{DEFAULT_NOMINATIM_URL, DEFAULT_OVERPASS_URL};
use crate::spatial::source::NetworkType;
use crate::types::source::{ArchiveFormat, DatasetKind, DedupKey, MemberFilter, SourceDescriptor};
use bon::Builder;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_FILE_SUFFIX: &str = ".csv";
/// Station files read from the GHCN archive when no limit is configured.
pub const DEFAULT_GHCN_LIMIT: usize = 1;
/// Files of each kind read from the HISDAC archive when no limit is configured.
pub const DEFAULT_HISDAC_LIMIT: usize = 10;
/// Only files whose name contains this are read from the HISDAC archive.
pub const HISDAC_MEMBER_MARKER: &str = "wideformat";

/// Where datasets live and how they are downloaded.
///
/// Build one with [`DataConfig::from_env`] or, for full control, with
/// [`DataConfig::builder`]. Every field has a default.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct DataConfig {
    /// Root directory for archives, chunk files and the lock file (`DATA_DIR`).
    #[builder(default = PathBuf::from(DEFAULT_DATA_DIR), into)]
    pub data_dir: PathBuf,
    #[builder(default = DatasetKind::Airports.default_file_name().to_string(), into)]
    pub airports_file: String,
    #[builder(default = DatasetKind::Ghcn.default_file_name().to_string(), into)]
    pub ghcn_file: String,
    #[builder(default = DatasetKind::Hisdac.default_file_name().to_string(), into)]
    pub hisdac_file: String,
    #[builder(default = DatasetKind::World.default_file_name().to_string(), into)]
    pub world_data_file: String,
    /// The world archive has no public source; without this it must be placed by hand.
    #[builder(into)]
    pub world_data_url: Option<String>,
    /// Directory under `data_dir` holding the OSM chunk files (`OSM_CHUNKS_DIR`).
    #[builder(default = DatasetKind::Osm.default_file_name().to_string(), into)]
    pub osm_chunks_dir: String,
    #[builder(default = DEFAULT_FILE_SUFFIX.to_string(), into)]
    pub default_file_suffix: String,
    /// Overrides the per-dataset file limits (`DEFAULT_FILE_LOAD_LIMIT`).
    pub default_file_load_limit: Option<usize>,
    #[builder(default = DEFAULT_CHUNK_SIZE_DEGREES)]
    pub osm_chunk_size: f64,
    #[builder(default = DEFAULT_WORKERS)]
    pub osm_workers: usize,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub lock_poll_interval: Duration,
    #[builder(default = DEFAULT_OVERPASS_URL.to_string(), into)]
    pub overpass_url: String,
    #[builder(default = DEFAULT_NOMINATIM_URL.to_string(), into)]
    pub nominatim_url: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::builder().build()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

impl DataConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Unset or empty variables fall back to their defaults; unparsable numbers
    /// are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = move |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        DataConfig::builder()
            .maybe_data_dir(lookup("DATA_DIR"))
            .maybe_airports_file(lookup(DatasetKind::Airports.file_env_var()))
            .maybe_ghcn_file(lookup(DatasetKind::Ghcn.file_env_var()))
            .maybe_hisdac_file(lookup(DatasetKind::Hisdac.file_env_var()))
            .maybe_world_data_file(lookup(DatasetKind::World.file_env_var()))
            .maybe_world_data_url(lookup("WORLD_DATA_URL"))
            .maybe_osm_chunks_dir(lookup(DatasetKind::Osm.file_env_var()))
            .maybe_default_file_suffix(lookup("DEFAULT_FILE_SUFFIX"))
            .maybe_default_file_load_limit(parse_var(&lookup, "DEFAULT_FILE_LOAD_LIMIT"))
            .maybe_osm_chunk_size(
                parse_var::<f64>(&lookup, "OSM_CHUNK_SIZE")
                    .filter(|size| size.is_finite() && *size > 0.0),
            )
            .maybe_osm_workers(parse_var::<usize>(&lookup, "OSM_WORKERS").filter(|n| *n > 0))
            .maybe_lock_poll_interval(parse_var(&lookup, "LOCK_POLL_MS").map(Duration::from_millis))
            .maybe_overpass_url(lookup("OVERPASS_URL"))
            .maybe_nominatim_url(lookup("NOMINATIM_URL"))
            .build()
    }

    fn file_name(&self, kind: DatasetKind) -> &str {
        match kind {
            DatasetKind::Airports => &self.airports_file,
            DatasetKind::Ghcn => &self.ghcn_file,
            DatasetKind::Hisdac => &self.hisdac_file,
            DatasetKind::Osm => &self.osm_chunks_dir,
            DatasetKind::World => &self.world_data_file,
        }
    }

    /// Where `kind` is stored on disk.
    pub fn path_of(&self, kind: DatasetKind) -> PathBuf {
        self.data_dir.join(self.file_name(kind))
    }

    /// The fixed description of one dataset under this configuration.
    pub fn descriptor(&self, kind: DatasetKind) -> SourceDescriptor {
        let url = match kind {
            DatasetKind::World => self.world_data_url.clone(),
            _ => kind.default_url().map(str::to_string),
        };
        let (format, filter, dedup, limit) = match kind {
            DatasetKind::Airports => (
                ArchiveFormat::GzipCsv,
                MemberFilter::default(),
                DedupKey::None,
                None,
            ),
            DatasetKind::Ghcn => (
                ArchiveFormat::TarGz,
                MemberFilter::suffix(self.default_file_suffix.as_str()),
                DedupKey::Prefix(2),
                Some(self.default_file_load_limit.unwrap_or(DEFAULT_GHCN_LIMIT)),
            ),
            DatasetKind::Hisdac => (
                ArchiveFormat::Zip,
                MemberFilter::default().with_contains(Some(HISDAC_MEMBER_MARKER.to_string())),
                DedupKey::None,
                Some(self.default_file_load_limit.unwrap_or(DEFAULT_HISDAC_LIMIT)),
            ),
            DatasetKind::Osm => (
                ArchiveFormat::ParquetChunks,
                MemberFilter::suffix(".parquet"),
                DedupKey::None,
                None,
            ),
            DatasetKind::World => (
                ArchiveFormat::ZipOfZips,
                MemberFilter::suffix(self.default_file_suffix.as_str()),
                DedupKey::None,
                None,
            ),
        };
        SourceDescriptor {
            kind,
            url,
            cache_path: self.path_of(kind),
            format,
            filter,
            dedup,
            limit,
        }
    }

    /// `<data_dir>/.lock`, polled at the configured interval.
    pub fn lock_file(&self) -> LockFile {
        LockFile::new(self.data_dir.join(LOCK_FILE_NAME), self.lock_poll_interval)
    }

    pub fn download_options(&self, network: NetworkType) -> DownloadOptions {
        DownloadOptions {
            chunk_size: self.osm_chunk_size,
            workers: self.osm_workers,
            network,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DataConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, DataConfig::default());
        assert_eq!(config.path_of(DatasetKind::Ghcn), PathBuf::from("data/ghcnd-data.tar.gz"));
        assert_eq!(config.osm_workers, 10);
        assert_eq!(config.lock_poll_interval, Duration::from_secs(1));
        assert_eq!(config.lock_file().path(), PathBuf::from("data/.lock"));
    }

    #[test]
    fn test_environment_overrides() {
        let config = DataConfig::from_lookup(lookup_from(&[
            ("DATA_DIR", "/srv/vizdata"),
            ("GHCN_FILE", "stations.tar.gz"),
            ("DEFAULT_FILE_LOAD_LIMIT", "4"),
            ("OSM_WORKERS", "3"),
            ("LOCK_POLL_MS", "250"),
            ("WORLD_DATA_URL", "https://example.org/world.zip"),
        ]));
        assert_eq!(config.path_of(DatasetKind::Ghcn), PathBuf::from("/srv/vizdata/stations.tar.gz"));
        assert_eq!(config.osm_workers, 3);
        assert_eq!(config.lock_poll_interval, Duration::from_millis(250));

        let ghcn = config.descriptor(DatasetKind::Ghcn);
        assert_eq!(ghcn.limit, Some(4));
        assert_eq!(config.descriptor(DatasetKind::Hisdac).limit, Some(4));
        assert_eq!(
            config.descriptor(DatasetKind::World).url.as_deref(),
            Some("https://example.org/world.zip")
        );
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = DataConfig::from_lookup(lookup_from(&[
            ("OSM_CHUNK_SIZE", "big"),
            ("OSM_WORKERS", "0"),
            ("DATA_DIR", "  "),
        ]));
        assert_eq!(config.osm_chunk_size, DEFAULT_CHUNK_SIZE_DEGREES);
        assert_eq!(config.osm_workers, DEFAULT_WORKERS);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));

        for size in ["inf", "NaN", "-0.5"] {
            let config = DataConfig::from_lookup(lookup_from(&[("OSM_CHUNK_SIZE", size)]));
            assert_eq!(config.osm_chunk_size, DEFAULT_CHUNK_SIZE_DEGREES, "{}", size);
        }
    }

    #[test]
    fn test_per_dataset_descriptors() {
        let config = DataConfig::default();
        let ghcn = config.descriptor(DatasetKind::Ghcn);
        assert_eq!(ghcn.format, ArchiveFormat::TarGz);
        assert_eq!(ghcn.dedup, DedupKey::Prefix(2));
        assert_eq!(ghcn.limit, Some(DEFAULT_GHCN_LIMIT));

        let hisdac = config.descriptor(DatasetKind::Hisdac);
        assert_eq!(hisdac.limit, Some(DEFAULT_HISDAC_LIMIT));
        assert!(hisdac.filter.matches("FBUY_wideformat.csv"));

        assert_eq!(config.descriptor(DatasetKind::World).url, None);
        assert!(config.descriptor(DatasetKind::Airports).url.is_some());
    }
}
