use crate::types::source::ArchiveFormat;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open archive '{0}'")]
    Open(PathBuf, #[source] std::io::Error),

    #[error("Archive '{0}' is corrupt or not a gzip tar archive")]
    Tar(PathBuf, #[source] std::io::Error),

    #[error("Archive '{0}' is corrupt or not a zip archive")]
    Zip(PathBuf, #[source] zip::result::ZipError),

    #[error("Failed to decompress '{0}'")]
    Gzip(PathBuf, #[source] std::io::Error),

    #[error("{format:?} is not an archive format that can be extracted ('{path}')")]
    UnsupportedFormat { path: PathBuf, format: ArchiveFormat },
}

#[derive(Debug, Error)]
pub enum GeoPackageError {
    #[error("Failed to stage GeoPackage member '{0}' on disk")]
    Staging(String, #[source] std::io::Error),

    #[error("Failed to read GeoPackage member '{0}'")]
    Sqlite(String, #[source] rusqlite::Error),

    #[error("GeoPackage member '{0}' has no feature table")]
    NoFeatureTable(String),

    #[error("Failed to build a frame from GeoPackage member '{0}'")]
    Frame(String, #[source] polars::prelude::PolarsError),
}
