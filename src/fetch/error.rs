use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download stream from {0} was interrupted")]
    Stream(String, #[source] reqwest::Error),

    #[error("Failed to create download directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("I/O error writing download to '{0}'")]
    WriteIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to move finished download into place at '{0}'")]
    Persist(PathBuf, #[source] std::io::Error),
}
