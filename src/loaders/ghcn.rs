use crate::archive::extractor::{ArchiveExtractor, Selection};
use crate::config::DataConfig;
use crate::error::VizDataError;
use crate::fetch::fetcher::{ArchiveFetcher, FetchOptions};
use crate::loaders::{concat_relaxed, ensure_archive};
use crate::normalize::csv::{read_csv, CsvLayout};
use crate::types::source::DatasetKind;
use log::{info, warn};
use polars::prelude::*;
use tokio::task;

/// Country prefix of the station files read when the caller gives none.
pub const DEFAULT_STATION_PREFIX: &str = "ES";

/// Loads daily station summaries from the GHCN archive.
///
/// Only station files whose name starts with `prefix` are read, at most one
/// per two-letter country code, and no more than `limit` of them.
pub async fn load_ghcn(
    config: &DataConfig,
    fetcher: &ArchiveFetcher,
    prefix: Option<String>,
    limit: Option<usize>,
    force_download: bool,
) -> Result<LazyFrame, VizDataError> {
    let descriptor = config.descriptor(DatasetKind::Ghcn);
    let options = FetchOptions {
        force: force_download,
        ..FetchOptions::default()
    };
    let path = ensure_archive(fetcher, &descriptor, options).await?;

    let mut selection = Selection::from(&descriptor);
    selection.filter = selection.filter.with_prefix(prefix);
    if limit.is_some() {
        selection.limit = limit;
    }
    let suffix = descriptor.filter.suffix.clone().unwrap_or_default();
    let format = descriptor.format;

    let frames = task::spawn_blocking(move || -> Result<Vec<LazyFrame>, VizDataError> {
        let layout = CsvLayout::default().with_infer_schema_length(None);
        let mut extractor = ArchiveExtractor::open(&path, format)?;
        let mut frames = Vec::new();
        for member in extractor.members(selection)? {
            let member = member?;
            info!("Processing file: {}", member.name);
            let df = read_csv(&member.name, &member.bytes, &layout)?;
            info!("Loaded {} records from {}", df.height(), member.name);
            frames.push(df.lazy());
        }
        Ok(frames)
    })
    .await??;

    if frames.is_empty() {
        warn!("No valid {} files found in archive", suffix);
    } else if frames.len() > 1 {
        info!("Concatenating {} station frames", frames.len());
    }
    Ok(concat_relaxed(frames)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_archives::write_tar_gz;

    fn config_with_archive(dir: &std::path::Path, limit: Option<usize>) -> DataConfig {
        let config = DataConfig::builder()
            .data_dir(dir)
            .maybe_default_file_load_limit(limit)
            .build();
        write_tar_gz(
            &config.path_of(DatasetKind::Ghcn),
            &[
                ("ES000008181.csv", b"\"STATION\",\"DATE\",\"TMAX\"\n\"ES000008181\",\"2020-01-01\",\"15\"\n"),
                ("ES000008202.csv", b"\"STATION\",\"DATE\",\"TMAX\"\n\"ES000008202\",\"2020-01-01\",\"12\"\n"),
                ("FR000007150.csv", b"\"STATION\",\"DATE\",\"PRCP\"\n\"FR000007150\",\"2020-01-01\",\"0.4\"\n"),
                ("readme.txt", b"not a station"),
            ],
        );
        config
    }

    #[tokio::test]
    async fn test_one_file_per_country_prefix() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path(), Some(10));

        let df = load_ghcn(&config, &ArchiveFetcher::new(), None, None, false)
            .await?
            .collect()?;

        // One Spanish and one French station; the second Spanish file shares the "ES" key.
        assert_eq!(df.height(), 2);
        let stations = df.column("STATION")?.str()?;
        assert_eq!(stations.get(0), Some("ES000008181"));
        assert_eq!(stations.get(1), Some("FR000007150"));
        assert_eq!(df.column("PRCP")?.null_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_prefix_and_limit() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path(), None);

        let df = load_ghcn(
            &config,
            &ArchiveFetcher::new(),
            Some(DEFAULT_STATION_PREFIX.to_string()),
            None,
            false,
        )
        .await?
        .collect()?;

        assert_eq!(df.height(), 1);
        assert_eq!(df.column("STATION")?.str()?.get(0), Some("ES000008181"));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_matching_files_is_empty() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path(), None);

        let df = load_ghcn(&config, &ArchiveFetcher::new(), Some("US".to_string()), None, false)
            .await?
            .collect()?;
        assert_eq!(df.height(), 0);
        Ok(())
    }
}
