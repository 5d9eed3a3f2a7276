use crate::types::bbox::PartitionError;
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum SpatialError {
    /// The region holds no features matching the query. Not fatal for a chunk.
    #[error("No matching features in {0}")]
    NoMatchingFeatures(String),

    /// The region holds no graph nodes. Not fatal for a chunk.
    #[error("Found no graph nodes in {0}")]
    NoGraphNodes(String),

    #[error("Place '{0}' could not be geocoded")]
    PlaceNotFound(String),

    #[error("Request to {0} failed")]
    Request(String, #[source] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Unexpected response from {0}: {1}")]
    InvalidResponse(String, String),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Failed to create chunk directory '{0}'")]
    ChunkDirectory(PathBuf, #[source] std::io::Error),

    #[error("Failed to write parquet chunk '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode parquet chunk '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("Failed to build chunk frame")]
    Frame(#[from] PolarsError),

    #[error("Background task failed")]
    TaskJoin(#[from] JoinError),
}

impl SpatialError {
    /// Outcomes that mean "this region is empty" rather than "something broke".
    pub fn is_empty_region(&self) -> bool {
        matches!(
            self,
            SpatialError::NoMatchingFeatures(_) | SpatialError::NoGraphNodes(_)
        )
    }
}
