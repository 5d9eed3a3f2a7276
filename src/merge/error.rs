use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Nothing to merge: no source tables given")]
    NoSources,

    #[error("Nothing to merge on: no key columns given")]
    NoKeys,

    #[error("Source table #{index} has no key column '{key}'")]
    MissingKey { key: String, index: usize },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}
