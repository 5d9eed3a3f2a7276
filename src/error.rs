use crate::archive::error::{ArchiveError, GeoPackageError};
use crate::cache::error::LockError;
use crate::fetch::error::FetchError;
use crate::merge::error::MergeError;
use crate::normalize::error::NormalizeError;
use crate::spatial::error::SpatialError;
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum VizDataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    GeoPackage(#[from] GeoPackageError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Spatial(#[from] SpatialError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{dataset} data is missing column '{column}'")]
    Schema { dataset: String, column: String },

    #[error("Unknown OSM data type '{0}', expected 'buildings' or 'roads'")]
    UnknownDataType(String),

    #[error("'{0}' not found and no download URL is configured")]
    FileNotFound(PathBuf),

    #[error("Failed to create data directory '{0}'")]
    DataDirCreation(PathBuf, #[source] std::io::Error),

    #[error("I/O error at '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to read shapefile '{0}'")]
    Shapefile(PathBuf, #[source] shapefile::Error),

    #[error("Polars operation failed")]
    Polars(#[from] PolarsError),

    #[error("Background task failed")]
    TaskJoin(#[from] JoinError),
}

/// Coarse classification of every error the crate can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A remote service could not be reached or answered badly.
    Network,
    /// An archive or one of its members could not be decoded.
    Archive,
    /// Data did not have the expected columns or types.
    Schema,
    /// The local filesystem failed us.
    Io,
}

impl VizDataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VizDataError::Fetch(e) => match e {
                FetchError::NetworkRequest(..)
                | FetchError::HttpStatus { .. }
                | FetchError::Stream(..) => ErrorKind::Network,
                FetchError::DirCreation(..) | FetchError::WriteIo(..) | FetchError::Persist(..) => {
                    ErrorKind::Io
                }
            },
            VizDataError::Archive(ArchiveError::Open(..)) => ErrorKind::Io,
            VizDataError::Archive(_) => ErrorKind::Archive,
            VizDataError::GeoPackage(GeoPackageError::Staging(..)) => ErrorKind::Io,
            VizDataError::GeoPackage(_) => ErrorKind::Archive,
            VizDataError::Normalize(e) => match e {
                NormalizeError::CsvReadIo { .. } => ErrorKind::Io,
                NormalizeError::CsvReadPolars { .. } => ErrorKind::Archive,
                NormalizeError::SchemaMismatch { .. }
                | NormalizeError::ColumnRenameError { .. } => ErrorKind::Schema,
            },
            VizDataError::Merge(_) => ErrorKind::Schema,
            VizDataError::Spatial(e) => match e {
                SpatialError::ChunkDirectory(..)
                | SpatialError::ParquetWriteIo(..)
                | SpatialError::ParquetWritePolars(..)
                | SpatialError::TaskJoin(_) => ErrorKind::Io,
                SpatialError::Frame(_) | SpatialError::Partition(_) => ErrorKind::Schema,
                SpatialError::NoMatchingFeatures(_)
                | SpatialError::NoGraphNodes(_)
                | SpatialError::PlaceNotFound(_)
                | SpatialError::Request(..)
                | SpatialError::HttpStatus { .. }
                | SpatialError::InvalidResponse(..) => ErrorKind::Network,
            },
            VizDataError::Lock(_) => ErrorKind::Io,
            VizDataError::Schema { .. } | VizDataError::UnknownDataType(_) => ErrorKind::Schema,
            VizDataError::Polars(_) => ErrorKind::Schema,
            VizDataError::Shapefile(..) => ErrorKind::Archive,
            VizDataError::FileNotFound(_)
            | VizDataError::DataDirCreation(..)
            | VizDataError::Io(..)
            | VizDataError::TaskJoin(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classifies_nested_errors() {
        let missing = VizDataError::FileNotFound(PathBuf::from("data/world_data.zip"));
        assert_eq!(missing.kind(), ErrorKind::Io);

        let merge: VizDataError = MergeError::MissingKey {
            key: "NATCODE".to_string(),
            index: 1,
        }
        .into();
        assert_eq!(merge.kind(), ErrorKind::Schema);

        let spatial: VizDataError = SpatialError::PlaceNotFound("Atlantis".to_string()).into();
        assert_eq!(spatial.kind(), ErrorKind::Network);

        let lock: VizDataError = LockError::Create(
            PathBuf::from("data/.lock"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        )
        .into();
        assert_eq!(lock.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_transparent_messages() {
        let err: VizDataError = MergeError::NoSources.into();
        assert_eq!(err.to_string(), "Nothing to merge: no source tables given");
    }
}
