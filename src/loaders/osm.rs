use crate::error::VizDataError;
use crate::loaders::{concat_relaxed, empty_frame};
use crate::spatial::downloader::{parse_chunk_index, ChunkedDownloader, BUILDINGS, ROADS};
use crate::spatial::source::SpatialSource;
use log::{info, warn};
use polars::prelude::*;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

/// Which table of the chunked OSM download to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OsmDataType {
    Buildings,
    #[default]
    Roads,
}

impl OsmDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsmDataType::Buildings => BUILDINGS,
            OsmDataType::Roads => ROADS,
        }
    }
}

impl fmt::Display for OsmDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OsmDataType {
    type Err = VizDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            BUILDINGS => Ok(OsmDataType::Buildings),
            ROADS => Ok(OsmDataType::Roads),
            other => Err(VizDataError::UnknownDataType(other.to_string())),
        }
    }
}

/// Chunk files of `data_type` under `dir`, in chunk order.
async fn saved_chunks(dir: &Path, data_type: OsmDataType) -> Result<Vec<PathBuf>, VizDataError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(VizDataError::Io(dir.to_path_buf(), e)),
    };
    let mut chunks = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| VizDataError::Io(dir.to_path_buf(), e))?
    {
        let name = entry.file_name();
        if let Some(index) = parse_chunk_index(&name.to_string_lossy(), data_type.as_str()) {
            chunks.push((index, entry.path()));
        }
    }
    chunks.sort_unstable_by_key(|(index, _)| *index);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}

/// Lazily scans the saved chunks of `data_type`, downloading `place` first
/// when nothing is saved yet or when `force_download` is set.
///
/// A forced download still resumes after the highest chunk on disk.
pub async fn load_osm<S: SpatialSource>(
    downloader: &ChunkedDownloader<S>,
    place: &str,
    data_type: OsmDataType,
    force_download: bool,
) -> Result<LazyFrame, VizDataError> {
    let dir = downloader.data_dir(data_type.as_str());
    let mut chunks = saved_chunks(&dir, data_type).await?;

    if force_download || chunks.is_empty() {
        let summary = downloader.download_place(place).await?;
        info!(
            "Downloaded {}: {} chunks saved, {} empty",
            place, summary.saved, summary.skipped
        );
        chunks = saved_chunks(&dir, data_type).await?;
    }
    if chunks.is_empty() {
        warn!("No {} data available for {}", data_type, place);
        return Ok(empty_frame());
    }

    info!("Scanning {} {} chunks in {:?}", chunks.len(), data_type, dir);
    let frames = chunks
        .into_iter()
        .map(|path| LazyFrame::scan_parquet(path, Default::default()))
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok(concat_relaxed(frames)?)
}
