use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("I/O error staging CSV member {member}")]
    CsvReadIo {
        member: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV member {member}")]
    CsvReadPolars {
        member: String,
        #[source]
        source: PolarsError,
    },

    #[error("CSV member {member} has {found} columns, expected {expected}")]
    SchemaMismatch {
        member: String,
        expected: usize,
        found: usize,
    },

    #[error("Failed to rename columns of {member}")]
    ColumnRenameError {
        member: String,
        #[source]
        source: PolarsError,
    },
}
