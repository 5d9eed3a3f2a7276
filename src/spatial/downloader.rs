use crate::spatial::error::SpatialError;
use crate::spatial::roads::{buildings_frame, fix_road, roads_frame};
use crate::spatial::source::{NetworkType, SpatialSource};
use crate::types::bbox::{BBoxChunk, BoundingBox};
use futures_util::{stream, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use polars::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::task;

pub const DEFAULT_CHUNK_SIZE_DEGREES: f64 = 0.2;
pub const DEFAULT_WORKERS: usize = 10;
pub const BUILDINGS: &str = "buildings";
pub const ROADS: &str = "roads";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadOptions {
    /// Side of a chunk in degrees.
    pub chunk_size: f64,
    /// Chunks processed at the same time.
    pub workers: usize,
    pub network: NetworkType,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_DEGREES,
            workers: DEFAULT_WORKERS,
            network: NetworkType::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Saved,
    SkippedEmpty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Chunks in the whole partition.
    pub total: usize,
    /// First chunk id processed by this run.
    pub resumed_from: usize,
    pub saved: usize,
    pub skipped: usize,
}

impl DownloadSummary {
    fn record(mut self, outcome: ChunkOutcome) -> Self {
        match outcome {
            ChunkOutcome::Saved => self.saved += 1,
            ChunkOutcome::SkippedEmpty => self.skipped += 1,
        }
        self
    }
}

/// `<data_type>_<index>.parquet`
pub fn chunk_file_name(data_type: &str, index: usize) -> String {
    format!("{}_{}.parquet", data_type, index)
}

pub(crate) fn parse_chunk_index(file_name: &str, data_type: &str) -> Option<usize> {
    file_name
        .strip_prefix(data_type)?
        .strip_prefix('_')?
        .strip_suffix(".parquet")?
        .parse()
        .ok()
}

async fn highest_saved_index(dir: &Path, data_type: &str) -> Result<Option<usize>, SpatialError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SpatialError::ChunkDirectory(dir.to_path_buf(), e)),
    };
    let mut highest = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SpatialError::ChunkDirectory(dir.to_path_buf(), e))?
    {
        let index = parse_chunk_index(&entry.file_name().to_string_lossy(), data_type);
        highest = highest.max(index);
    }
    Ok(highest)
}

/// Writes `df` next to `path` and renames it into place, so a chunk file is
/// either complete or absent.
fn write_parquet(mut df: DataFrame, path: &Path) -> Result<(), SpatialError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".chunk-")
        .suffix(".parquet")
        .tempfile_in(dir)
        .map_err(|e| SpatialError::ParquetWriteIo(path.to_path_buf(), e))?;
    let level = GzipLevel::try_new(9)
        .map_err(|e| SpatialError::ParquetWritePolars(path.to_path_buf(), e))?;
    ParquetWriter::new(staged.as_file_mut())
        .with_compression(ParquetCompression::Gzip(Some(level)))
        .finish(&mut df)
        .map_err(|e| SpatialError::ParquetWritePolars(path.to_path_buf(), e))?;
    staged
        .persist(path)
        .map_err(|e| SpatialError::ParquetWriteIo(path.to_path_buf(), e.error))?;
    Ok(())
}

/// Downloads a region chunk by chunk into `<root>/{buildings,roads}/`.
pub struct ChunkedDownloader<S> {
    source: S,
    root: PathBuf,
    options: DownloadOptions,
}

impl<S: SpatialSource> ChunkedDownloader<S> {
    pub fn new(source: S, root: impl Into<PathBuf>, options: DownloadOptions) -> Self {
        Self {
            source,
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn data_dir(&self, data_type: &str) -> PathBuf {
        self.root.join(data_type)
    }

    /// Id of the chunk after the highest one saved for either data type.
    pub async fn next_chunk_index(&self) -> Result<usize, SpatialError> {
        let buildings = highest_saved_index(&self.data_dir(BUILDINGS), BUILDINGS).await?;
        let roads = highest_saved_index(&self.data_dir(ROADS), ROADS).await?;
        Ok(buildings.max(roads).map_or(0, |index| index + 1))
    }

    pub async fn download_place(&self, place: &str) -> Result<DownloadSummary, SpatialError> {
        let bbox = self.source.area_bbox(place).await?;
        self.download_bbox(&bbox).await
    }

    /// Processes every chunk of `bbox` not saved by an earlier run.
    ///
    /// Empty regions are skipped. Any other failure stops the batch; chunks
    /// already written stay on disk for the next run.
    pub async fn download_bbox(&self, bbox: &BoundingBox) -> Result<DownloadSummary, SpatialError> {
        for data_type in [BUILDINGS, ROADS] {
            let dir = self.data_dir(data_type);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| SpatialError::ChunkDirectory(dir.clone(), e))?;
        }

        let chunks = bbox.partition(self.options.chunk_size)?;
        let start = self.next_chunk_index().await?;
        let summary = DownloadSummary {
            total: chunks.len(),
            resumed_from: start,
            ..DownloadSummary::default()
        };
        if start >= chunks.len() {
            info!("All {} chunks of {} already downloaded", chunks.len(), bbox);
            return Ok(summary);
        }
        info!(
            "Downloading chunks {}..{} of {} with {} workers",
            start,
            chunks.len(),
            bbox,
            self.options.workers
        );

        let summary = stream::iter(chunks.into_iter().skip(start))
            .map(|chunk| self.process_chunk(chunk))
            .buffer_unordered(self.options.workers.max(1))
            .try_fold(summary, |summary, outcome| async move { Ok(summary.record(outcome)) })
            .await?;
        info!(
            "Finished {}: {} chunks saved, {} empty",
            bbox, summary.saved, summary.skipped
        );
        Ok(summary)
    }

    async fn process_chunk(&self, chunk: BBoxChunk) -> Result<ChunkOutcome, SpatialError> {
        debug!("Chunk {} {}", chunk.id, chunk.bbox);

        let features = match self.source.features(&chunk.bbox).await {
            Ok(features) => features,
            Err(e) if e.is_empty_region() => {
                info!("Skipping chunk {}: {}", chunk.id, e);
                return Ok(ChunkOutcome::SkippedEmpty);
            }
            Err(e) => {
                warn!("Chunk {} failed: {}", chunk.id, e);
                return Err(e);
            }
        };
        let path = self.data_dir(BUILDINGS).join(chunk_file_name(BUILDINGS, chunk.id));
        task::spawn_blocking(move || write_parquet(buildings_frame(&features)?, &path)).await??;

        let edges = match self.source.graph(&chunk.bbox, self.options.network).await {
            Ok(edges) => edges,
            Err(e) if e.is_empty_region() => {
                info!("Skipping roads of chunk {}: {}", chunk.id, e);
                return Ok(ChunkOutcome::SkippedEmpty);
            }
            Err(e) => {
                warn!("Chunk {} failed: {}", chunk.id, e);
                return Err(e);
            }
        };
        let path = self.data_dir(ROADS).join(chunk_file_name(ROADS, chunk.id));
        task::spawn_blocking(move || {
            let rows: Vec<_> = edges.into_iter().map(fix_road).collect();
            write_parquet(roads_frame(&rows)?, &path)
        })
        .await??;

        info!("Saved chunk {}", chunk.id);
        Ok(ChunkOutcome::Saved)
    }
}
