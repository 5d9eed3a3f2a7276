//! This module provides the main entry point of the crate. Every dataset is
//! loaded through [`VizData`], which serializes loads with a lock file in the
//! data directory and keeps the most recent result in memory.

use crate::cache::memo::CacheManager;
use crate::config::DataConfig;
use crate::error::VizDataError;
use crate::fetch::fetcher::ArchiveFetcher;
use crate::loaders::airports::load_airports;
use crate::loaders::ghcn::{load_ghcn, DEFAULT_STATION_PREFIX};
use crate::loaders::hisdac::load_hisdac;
use crate::loaders::osm::{load_osm, OsmDataType};
use crate::loaders::world::load_world;
use crate::loaders::LoadedData;
use crate::spatial::downloader::ChunkedDownloader;
use crate::spatial::overpass::OverpassSource;
use crate::spatial::source::NetworkType;
use crate::types::source::DatasetKind;
use crate::utils::ensure_data_dir_exists;
use bon::bon;
use std::sync::Arc;

/// The full set of arguments of one load. Two equal requests are served the
/// same cached result.
///
/// # Examples
///
/// ```
/// use vizdata::{LoadRequest, OsmDataType, NetworkType};
///
/// let roads = LoadRequest::Osm {
///     place: "Spain".to_string(),
///     data_type: OsmDataType::Roads,
///     network: NetworkType::All,
///     force_download: false,
/// };
/// assert_eq!(roads.clone(), roads);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum LoadRequest {
    Airports {
        force_download: bool,
    },
    Ghcn {
        prefix: String,
        limit: Option<usize>,
        force_download: bool,
    },
    Hisdac {
        suffix: Option<String>,
        contains: Option<String>,
        limit: Option<usize>,
        force_download: bool,
    },
    Osm {
        place: String,
        data_type: OsmDataType,
        network: NetworkType,
        force_download: bool,
    },
    World {
        suffix: Option<String>,
        force_download: bool,
    },
}

impl LoadRequest {
    pub fn kind(&self) -> DatasetKind {
        match self {
            LoadRequest::Airports { .. } => DatasetKind::Airports,
            LoadRequest::Ghcn { .. } => DatasetKind::Ghcn,
            LoadRequest::Hisdac { .. } => DatasetKind::Hisdac,
            LoadRequest::Osm { .. } => DatasetKind::Osm,
            LoadRequest::World { .. } => DatasetKind::World,
        }
    }
}

/// The main client struct for loading dashboard datasets.
///
/// Each dataset has a builder-style method returning the loaded table as a
/// Polars `LazyFrame` inside a shared [`LoadedData`]. Loads go through a
/// single-slot memo: asking for the same thing twice returns the same
/// `Arc`, asking for something else replaces it. While a load runs, a
/// `.lock` file in the data directory keeps other processes from loading at
/// the same time.
///
/// Create an instance using [`VizData::new()`] to read the configuration from
/// the environment, or [`VizData::with_config()`] to pass one explicitly.
///
/// # Examples
///
/// ```rust,no_run
/// # use vizdata::VizData;
/// # use vizdata::VizDataError;
/// # async fn run() -> Result<(), VizDataError> {
/// let client = VizData::new().await?;
/// let airports = client.airports().call().await?;
/// println!("{:?}", airports.table.clone().limit(5).collect()?);
/// # Ok(())
/// # }
/// ```
pub struct VizData {
    config: DataConfig,
    fetcher: ArchiveFetcher,
    overpass: OverpassSource,
    cache: CacheManager<LoadRequest, LoadedData>,
}

#[bon]
impl VizData {
    /// Creates a client for the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Where datasets are stored and how they are downloaded.
    ///              The data directory is created if it doesn't exist.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `VizData` client, or a [`VizDataError`] if the
    /// data directory cannot be created.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::DataDirCreation`] if the data directory cannot be created.
    /// Returns [`VizDataError::Spatial`] if the HTTP client for the map services cannot be built.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use vizdata::{DataConfig, VizData, VizDataError};
    /// # async fn run() -> Result<(), VizDataError> {
    /// let config = DataConfig::builder().data_dir("/tmp/vizdata").osm_workers(4).build();
    /// let client = VizData::with_config(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_config(config: DataConfig) -> Result<Self, VizDataError> {
        ensure_data_dir_exists(&config.data_dir).await?;
        let overpass = OverpassSource::new(config.overpass_url.as_str(), config.nominatim_url.as_str())?;
        Ok(Self {
            cache: CacheManager::new(config.lock_file()),
            fetcher: ArchiveFetcher::new(),
            overpass,
            config,
        })
    }

    /// Creates a client configured from the environment (`DATA_DIR`,
    /// `AIRPORTS_FILE`, `OSM_WORKERS`, ...). See [`DataConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Same as [`VizData::with_config`].
    pub async fn new() -> Result<Self, VizDataError> {
        Self::with_config(DataConfig::from_env()).await
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Loads the OpenFlights airport list.
    ///
    /// The list is downloaded once and stored gzip-compressed in the data
    /// directory.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.force_download(bool)`: Optional. Download the list again even if it is cached on disk.
    /// * `.reload(bool)`: Optional. Skip the in-memory result of an identical earlier call.
    ///
    /// # Returns
    ///
    /// The shared [`LoadedData`] holding a table with the columns `id, name,
    /// city, country, iata, icao, latitude, longitude, altitude, timezone, dst,
    /// tz_database_time_zone, type, source`.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::Fetch`] if the download fails,
    /// [`VizDataError::Archive`] if the cached file is not valid gzip and
    /// [`VizDataError::Normalize`] if it does not parse as the expected CSV.
    /// Returns [`VizDataError::Lock`] if the lock file cannot be created or removed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use vizdata::{VizData, VizDataError};
    /// # async fn run() -> Result<(), VizDataError> {
    /// let client = VizData::new().await?;
    /// let airports = client.airports().call().await?;
    /// let again = client.airports().call().await?;
    /// assert!(std::sync::Arc::ptr_eq(&airports, &again));
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn airports(
        &self,
        #[builder(default)] force_download: bool,
        #[builder(default)] reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        self.load(LoadRequest::Airports { force_download }, reload)
            .await
    }

    /// Loads GHCN daily station summaries.
    ///
    /// Station files are taken from the archive in order, at most one per
    /// two-letter country code, and stacked into one table. Columns missing from
    /// some stations are filled with nulls.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.prefix(&str)`: Optional. Only station files starting with this are read. Defaults to `"ES"`; an empty prefix reads every country.
    /// * `.limit(usize)`: Optional. The maximum number of station files. Defaults to `DEFAULT_FILE_LOAD_LIMIT`, or `1`.
    /// * `.force_download(bool)`: Optional. Download the archive again.
    /// * `.reload(bool)`: Optional. Skip the in-memory result of an identical earlier call.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::Fetch`] if the archive download fails,
    /// [`VizDataError::Archive`] if the archive is corrupt and
    /// [`VizDataError::Normalize`] if a station file does not parse.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use vizdata::{VizData, VizDataError};
    /// # async fn run() -> Result<(), VizDataError> {
    /// let client = VizData::new().await?;
    /// let stations = client.ghcn().prefix("FR").limit(3).call().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn ghcn(
        &self,
        #[builder(default = DEFAULT_STATION_PREFIX.to_string(), into)] prefix: String,
        limit: Option<usize>,
        #[builder(default)] force_download: bool,
        #[builder(default)] reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        let request = LoadRequest::Ghcn {
            prefix,
            limit,
            force_download,
        };
        self.load(request, reload).await
    }

    /// Loads the HISDAC settlement layers, GeoPackage attributes joined with
    /// the CSV tables on `NATCODE`. Geometries are WKT strings in `geometry`.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.suffix(&str)`: Optional. Only archive members ending with this are read.
    /// * `.contains(&str)`: Optional. Only archive members containing this are read. Defaults to `"wideformat"`.
    /// * `.limit(usize)`: Optional. Stop once this many GeoPackages or CSVs are read. Defaults to `DEFAULT_FILE_LOAD_LIMIT`, or `10`.
    /// * `.force_download(bool)`: Optional. Download the archive again.
    /// * `.reload(bool)`: Optional. Skip the in-memory result of an identical earlier call.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::GeoPackage`] if a GeoPackage member cannot be read
    /// and [`VizDataError::Merge`] if a table has no `NATCODE` column, besides
    /// the errors of [`VizData::ghcn`].
    #[builder]
    pub async fn hisdac(
        &self,
        #[builder(into)] suffix: Option<String>,
        #[builder(into)] contains: Option<String>,
        limit: Option<usize>,
        #[builder(default)] force_download: bool,
        #[builder(default)] reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        let request = LoadRequest::Hisdac {
            suffix,
            contains,
            limit,
            force_download,
        };
        self.load(request, reload).await
    }

    /// Loads OpenStreetMap buildings or roads for a place.
    ///
    /// The first call downloads the place's bounding box in square chunks
    /// (`OSM_CHUNK_SIZE` degrees, `OSM_WORKERS` at a time) into parquet files.
    /// An interrupted download resumes after the last chunk saved. Later calls
    /// read the saved chunks without touching the network.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.place(&str)`: Optional. A place name the geocoder understands. Defaults to `"Spain"`.
    /// * `.data_type(OsmDataType)`: Optional. Buildings or roads. Defaults to [`OsmDataType::Roads`].
    /// * `.network(NetworkType)`: Optional. Which ways make up the road graph. Defaults to [`NetworkType::All`].
    /// * `.force_download(bool)`: Optional. Run the chunked download even if chunks are saved.
    /// * `.reload(bool)`: Optional. Skip the in-memory result of an identical earlier call.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::Spatial`] if geocoding fails or a chunk fails
    /// for a reason other than being empty. Chunks saved before the failure are
    /// kept.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use vizdata::{OsmDataType, VizData, VizDataError};
    /// # async fn run() -> Result<(), VizDataError> {
    /// let client = VizData::new().await?;
    /// let buildings = client
    ///     .osm()
    ///     .place("Andorra")
    ///     .data_type(OsmDataType::Buildings)
    ///     .call()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn osm(
        &self,
        #[builder(default = "Spain".to_string(), into)] place: String,
        #[builder(default)] data_type: OsmDataType,
        #[builder(default)] network: NetworkType,
        #[builder(default)] force_download: bool,
        #[builder(default)] reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        let request = LoadRequest::Osm {
            place,
            data_type,
            network,
            force_download,
        };
        self.load(request, reload).await
    }

    /// Loads the world indicator tables (literacy, GDP, schools with internet,
    /// median age, population density, mental health death rate) joined on
    /// `Country`, `Code` and `Year`, together with the Natural Earth country
    /// reference when the archive contains it.
    ///
    /// The archive is not downloadable by default: place `world_data.zip` in
    /// the data directory or set `WORLD_DATA_URL`.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.suffix(&str)`: Optional. Suffix of the CSV inside each indicator zip. Defaults to `DEFAULT_FILE_SUFFIX`.
    /// * `.force_download(bool)`: Optional. Download the archive again when a URL is configured.
    /// * `.reload(bool)`: Optional. Skip the in-memory result of an identical earlier call.
    ///
    /// # Returns
    ///
    /// The shared [`LoadedData`]; `reference` holds `SOV_A3`, `ADMIN` and a WKT
    /// `geometry` per country, with codes rewritten to match the indicator table.
    ///
    /// # Errors
    ///
    /// Returns [`VizDataError::FileNotFound`] if the archive is missing and no URL is configured.
    /// Returns [`VizDataError::Schema`] if an indicator table lacks an expected column.
    /// Returns [`VizDataError::Shapefile`] if the country shapes cannot be read.
    #[builder]
    pub async fn world(
        &self,
        #[builder(into)] suffix: Option<String>,
        #[builder(default)] force_download: bool,
        #[builder(default)] reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        self.load(
            LoadRequest::World {
                suffix,
                force_download,
            },
            reload,
        )
        .await
    }

    /// Serves `request` from memory, or loads it under the lock file.
    ///
    /// With `reload` the in-memory result is ignored and replaced.
    pub async fn load(
        &self,
        request: LoadRequest,
        reload: bool,
    ) -> Result<Arc<LoadedData>, VizDataError> {
        let key = request.clone();
        self.cache.load(key, reload, || self.run(request)).await
    }

    /// Drops the in-memory result. The next load reads from disk again.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn run(&self, request: LoadRequest) -> Result<LoadedData, VizDataError> {
        let config = &self.config;
        let fetcher = &self.fetcher;
        match request {
            LoadRequest::Airports { force_download } => {
                load_airports(config, fetcher, force_download)
                    .await
                    .map(LoadedData::new)
            }
            LoadRequest::Ghcn {
                prefix,
                limit,
                force_download,
            } => load_ghcn(config, fetcher, Some(prefix), limit, force_download)
                .await
                .map(LoadedData::new),
            LoadRequest::Hisdac {
                suffix,
                contains,
                limit,
                force_download,
            } => load_hisdac(config, fetcher, suffix, contains, limit, force_download)
                .await
                .map(LoadedData::new),
            LoadRequest::Osm {
                place,
                data_type,
                network,
                force_download,
            } => {
                let downloader = ChunkedDownloader::new(
                    self.overpass.clone(),
                    config.path_of(DatasetKind::Osm),
                    config.download_options(network),
                );
                load_osm(&downloader, &place, data_type, force_download)
                    .await
                    .map(LoadedData::new)
            }
            LoadRequest::World {
                suffix,
                force_download,
            } => load_world(config, fetcher, suffix, force_download).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_archives::write_tar_gz;
    use std::time::Duration;

    async fn client(dir: &std::path::Path) -> Result<VizData, VizDataError> {
        let config = DataConfig::builder()
            .data_dir(dir.join("data"))
            .lock_poll_interval(Duration::from_millis(10))
            .build();
        VizData::with_config(config).await
    }

    fn write_stations(client: &VizData) {
        write_tar_gz(
            &client.config().path_of(DatasetKind::Ghcn),
            &[
                ("ES000008181.csv", b"STATION,TMAX\nES000008181,15\n"),
                ("FR000007150.csv", b"STATION,TMAX\nFR000007150,11\n"),
            ],
        );
    }

    #[tokio::test]
    async fn test_same_request_is_served_from_memory() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await?;
        assert!(client.config().data_dir.is_dir());
        write_stations(&client);

        let first = client.ghcn().call().await?;
        let second = client.ghcn().prefix("ES").call().await?;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!client.config().lock_file().path().exists());

        let reloaded = client.ghcn().reload(true).call().await?;
        assert!(!Arc::ptr_eq(&first, &reloaded));
        Ok(())
    }

    #[tokio::test]
    async fn test_different_request_replaces_the_result() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await?;
        write_stations(&client);

        let spain = client.ghcn().call().await?;
        let france = client.ghcn().prefix("FR").call().await?;
        let france_df = france.table.clone().collect()?;
        assert_eq!(france_df.column("STATION")?.str()?.get(0), Some("FR000007150"));

        let spain_again = client.ghcn().call().await?;
        assert!(!Arc::ptr_eq(&spain, &spain_again));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_releases_the_lock() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await?;

        let result = client.world().call().await;
        assert!(matches!(result, Err(VizDataError::FileNotFound(_))));
        assert!(!client.config().lock_file().path().exists());
        Ok(())
    }

    #[test]
    fn test_request_kind() {
        let request = LoadRequest::Hisdac {
            suffix: None,
            contains: None,
            limit: Some(2),
            force_download: false,
        };
        assert_eq!(request.kind(), DatasetKind::Hisdac);
    }
}
