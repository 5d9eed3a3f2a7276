use crate::fetch::error::FetchError;
use async_compression::tokio::write::GzipEncoder;
use async_compression::Level;
use futures_util::StreamExt;
use log::{info, warn};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// How a download is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound on the size of each write.
    pub chunk_size: usize,
    /// Gzip level to compress the body with on the fly; `None` stores it as-is.
    pub compression: Option<u32>,
    /// Download again even when the destination already exists.
    pub force: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: None,
            force: false,
        }
    }
}

impl FetchOptions {
    pub fn compressed(level: u32) -> Self {
        Self {
            compression: Some(level),
            ..Self::default()
        }
    }
}

/// Streams remote archives to the local data directory.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFetcher {
    pub fn new() -> ArchiveFetcher {
        ArchiveFetcher {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> ArchiveFetcher {
        ArchiveFetcher { client }
    }

    /// Downloads `url` to `destination` unless the file is already there.
    pub async fn ensure_downloaded(
        &self,
        url: &str,
        destination: &Path,
        options: FetchOptions,
    ) -> Result<PathBuf, FetchError> {
        if !options.force && fs::metadata(destination).await.is_ok() {
            info!("Cache hit for {:?}, skipping download", destination);
            return Ok(destination.to_path_buf());
        }
        warn!("{:?} not found, downloading data", destination);
        self.fetch(url, destination, options.chunk_size, options.compression)
            .await
    }

    /// Streams the body of `url` into `destination`, optionally gzip-compressing it.
    ///
    /// The body goes to a temporary file next to `destination` that is renamed
    /// into place only after the last byte is written, so a failed download
    /// never leaves a partial file behind.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        chunk_size: usize,
        compression: Option<u32>,
    ) -> Result<PathBuf, FetchError> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| FetchError::DirCreation(parent.clone(), e))?;

        let temp_file = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&parent)
            .map_err(|e| FetchError::WriteIo(parent.clone(), e))?;
        let (std_file, temp_path) = temp_file.into_parts();
        let file = fs::File::from_std(std_file);

        info!("Downloading from {} to {:?}", url, destination);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    FetchError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    FetchError::NetworkRequest(url.to_string(), e)
                });
            }
        };

        let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match compression {
            Some(level) => Box::new(GzipEncoder::with_quality(
                file,
                Level::Precise(level.min(9) as i32),
            )),
            None => Box::new(file),
        };

        let chunk_size = chunk_size.max(1);
        let mut written = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Stream(url.to_string(), e))?;
            // keep-alive
            if chunk.is_empty() {
                continue;
            }
            for part in chunk.chunks(chunk_size) {
                writer
                    .write_all(part)
                    .await
                    .map_err(|e| FetchError::WriteIo(destination.to_path_buf(), e))?;
            }
            written += chunk.len();
        }
        writer
            .shutdown()
            .await
            .map_err(|e| FetchError::WriteIo(destination.to_path_buf(), e))?;
        drop(writer);

        temp_path
            .persist(destination)
            .map_err(|e| FetchError::Persist(destination.to_path_buf(), e.error))?;
        info!(
            "Download completed successfully: {} bytes from {} stored at {:?}",
            written, url, destination
        );
        Ok(destination.to_path_buf())
    }
}
