use crate::archive::extractor::{extract, Selection};
use crate::config::DataConfig;
use crate::error::VizDataError;
use crate::fetch::fetcher::{ArchiveFetcher, FetchOptions, DEFAULT_COMPRESSION_LEVEL};
use crate::loaders::{empty_frame, ensure_archive};
use crate::normalize::csv::{read_csv, CsvLayout};
use crate::types::source::DatasetKind;
use log::{info, warn};
use polars::prelude::*;
use tokio::task;

/// Column names of the OpenFlights extended airport list, which has no header.
pub const AIRPORT_COLUMNS: [&str; 14] = [
    "id",
    "name",
    "city",
    "country",
    "iata",
    "icao",
    "latitude",
    "longitude",
    "altitude",
    "timezone",
    "dst",
    "tz_database_time_zone",
    "type",
    "source",
];

fn airports_layout() -> CsvLayout {
    CsvLayout::headerless(AIRPORT_COLUMNS.to_vec())
        .with_null_values(&["\\N"])
        .with_infer_schema_length(None)
}

/// Loads the airport list, downloading and gzip-compressing it first when it
/// is not cached.
pub async fn load_airports(
    config: &DataConfig,
    fetcher: &ArchiveFetcher,
    force_download: bool,
) -> Result<LazyFrame, VizDataError> {
    let descriptor = config.descriptor(DatasetKind::Airports);
    let options = FetchOptions {
        force: force_download,
        ..FetchOptions::compressed(DEFAULT_COMPRESSION_LEVEL)
    };
    let path = ensure_archive(fetcher, &descriptor, options).await?;

    let format = descriptor.format;
    let selection = Selection::from(&descriptor);
    let frame = task::spawn_blocking(move || -> Result<Option<DataFrame>, VizDataError> {
        let members = extract(&path, format, selection)?;
        match members.into_iter().next() {
            Some(member) => Ok(Some(read_csv(&member.name, &member.bytes, &airports_layout())?)),
            None => Ok(None),
        }
    })
    .await??;

    match frame {
        Some(df) => {
            info!("Loaded {} airports", df.height());
            Ok(df.lazy())
        }
        None => {
            warn!("Airport archive {:?} is empty", descriptor.cache_path);
            Ok(empty_frame())
        }
    }
}
