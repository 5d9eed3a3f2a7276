use crate::archive::extractor::{ArchiveExtractor, Selection};
use crate::archive::geopackage::read_geopackage;
use crate::config::DataConfig;
use crate::error::VizDataError;
use crate::fetch::fetcher::{ArchiveFetcher, FetchOptions};
use crate::loaders::{concat_relaxed, empty_frame, ensure_archive};
use crate::merge::merger::merge;
use crate::normalize::csv::{read_csv, CsvLayout};
use crate::types::raw_member::MemberFormat;
use crate::types::source::{ArchiveFormat, DatasetKind};
use log::{debug, info, warn};
use polars::prelude::*;
use std::path::Path;
use tokio::task;

/// County code shared by the GeoPackage and CSV members.
pub const JOIN_KEY: &str = "NATCODE";

fn csv_layout() -> CsvLayout {
    CsvLayout::default()
        .with_null_values(&["NA", "NaN", "nan"])
        .with_infer_schema_length(Some(100_000))
        .with_text_columns(&[JOIN_KEY])
}

/// GeoPackages store the code as an integer while CSVs may zero-pad it
/// ("08019"); both sides are joined as integers.
fn with_integer_key(df: DataFrame) -> LazyFrame {
    if df.column(JOIN_KEY).is_ok() {
        df.lazy().with_column(col(JOIN_KEY).cast(DataType::Int64))
    } else {
        df.lazy()
    }
}

/// Reads members until both kinds hold `limit` frames. Members of a kind
/// that is already full are skipped.
fn read_members(
    path: &Path,
    format: ArchiveFormat,
    selection: Selection,
    limit: Option<usize>,
) -> Result<(Vec<LazyFrame>, Vec<LazyFrame>), VizDataError> {
    let layout = csv_layout();
    let is_full = |frames: &[LazyFrame]| limit.is_some_and(|limit| frames.len() >= limit);
    let mut extractor = ArchiveExtractor::open(path, format)?;
    let mut geopackages = Vec::new();
    let mut tables = Vec::new();

    for member in extractor.members(selection)? {
        if is_full(&geopackages) && is_full(&tables) {
            break;
        }
        let member = member?;
        let frames = match member.format {
            MemberFormat::GeoPackage => &mut geopackages,
            MemberFormat::Csv => &mut tables,
            _ => {
                warn!("Unsupported file type: {}", member.name);
                continue;
            }
        };
        if is_full(frames) {
            debug!("Skipping {}: limit of {:?} reached", member.name, limit);
            continue;
        }
        info!("Processing file: {}", member.name);
        let df = match member.format {
            MemberFormat::GeoPackage => read_geopackage(&member.name, &member.bytes)?,
            _ => read_csv(&member.name, &member.bytes, &layout)?,
        };
        info!("Loaded {} records from {}", df.height(), member.name);
        frames.push(with_integer_key(df));
    }
    Ok((geopackages, tables))
}

/// Loads the HISDAC settlement layers and joins the GeoPackage attributes
/// with the CSV tables on [`JOIN_KEY`].
///
/// `suffix` and `contains` narrow the archive members read; `contains`
/// defaults to the wide-format marker. `limit` caps the frames of each kind.
/// Layers of the same kind are stacked, so a county appears once per layer
/// until the join collapses its rows into one.
pub async fn load_hisdac(
    config: &DataConfig,
    fetcher: &ArchiveFetcher,
    suffix: Option<String>,
    contains: Option<String>,
    limit: Option<usize>,
    force_download: bool,
) -> Result<LazyFrame, VizDataError> {
    let descriptor = config.descriptor(DatasetKind::Hisdac);
    let options = FetchOptions {
        force: force_download,
        ..FetchOptions::default()
    };
    let path = ensure_archive(fetcher, &descriptor, options).await?;

    let mut filter = descriptor.filter.clone();
    if suffix.is_some() {
        filter.suffix = suffix;
    }
    if contains.is_some() {
        filter.contains = contains;
    }
    let limit = limit.or(descriptor.limit);
    let format = descriptor.format;
    let (geopackages, tables) =
        task::spawn_blocking(move || read_members(&path, format, Selection::new(filter), limit))
            .await??;

    let mut sources = Vec::new();
    for (kind, frames) in [("GeoPackage", geopackages), ("CSV", tables)] {
        if !frames.is_empty() {
            debug!("Stacking {} {} frames", frames.len(), kind);
            sources.push(concat_relaxed(frames)?);
        }
    }
    if sources.is_empty() {
        warn!("No valid files found in {:?}", descriptor.cache_path);
        return Ok(empty_frame());
    }
    info!("Joining {} sources on {}", sources.len(), JOIN_KEY);
    Ok(merge(sources, &[JOIN_KEY])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_archives::write_zip;
    use rusqlite::Connection;

    fn geopackage() -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fbuy.gpkg");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL);
             CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT);
             CREATE TABLE fbuy (fid INTEGER PRIMARY KEY, geom BLOB, NATCODE INTEGER, FBUY1900 REAL);
             INSERT INTO gpkg_contents VALUES ('fbuy', 'features');
             INSERT INTO gpkg_geometry_columns VALUES ('fbuy', 'geom');
             INSERT INTO fbuy VALUES (1, NULL, 28079, 1901.5);
             INSERT INTO fbuy VALUES (2, NULL, 8019, 1925.0);",
        )
        .unwrap();
        drop(conn);
        std::fs::read(&path).unwrap()
    }

    fn config_with_archive(dir: &Path) -> DataConfig {
        let config = DataConfig::builder().data_dir(dir).build();
        let gpkg = geopackage();
        write_zip(
            &config.path_of(DatasetKind::Hisdac),
            &[
                ("hisdac/FBUY_wideformat.gpkg", gpkg.as_slice()),
                ("hisdac/BUPR_longformat.csv", b"NATCODE,YEAR,BUPR\n28079,1900,1\n"),
                ("hisdac/BUPR_wideformat.csv", b"NATCODE,BUPR1900\n28079,12.5\n08019,4.5\n"),
                ("hisdac/BUPL_wideformat.csv", b"NATCODE,BUPL1900\n28079,7.0\n41091,NA\n"),
                ("hisdac/notes_wideformat.txt", b"readme"),
            ],
        );
        config
    }

    fn county(df: &DataFrame, code: i64) -> PolarsResult<DataFrame> {
        df.clone().lazy().filter(col(JOIN_KEY).eq(lit(code))).collect()
    }

    #[tokio::test]
    async fn test_joins_every_layer_into_one_row_per_county() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path());

        let df = load_hisdac(&config, &ArchiveFetcher::new(), None, None, None, false)
            .await?
            .collect()?;

        assert_eq!(df.height(), 3);
        assert_eq!(df.column(JOIN_KEY)?.dtype(), &DataType::Int64);

        let madrid = county(&df, 28079)?;
        assert_eq!(madrid.height(), 1);
        assert_eq!(madrid.column("FBUY1900")?.f64()?.get(0), Some(1901.5));
        assert_eq!(madrid.column("BUPR1900")?.f64()?.get(0), Some(12.5));
        assert_eq!(madrid.column("BUPL1900")?.f64()?.get(0), Some(7.0));

        let sevilla = county(&df, 41091)?;
        assert_eq!(sevilla.column("FBUY1900")?.null_count(), 1);
        assert_eq!(sevilla.column("BUPL1900")?.null_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_padded_csv_code_matches_geopackage_code() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path());

        let df = load_hisdac(&config, &ArchiveFetcher::new(), None, None, None, false)
            .await?
            .collect()?;

        let barcelona = county(&df, 8019)?;
        assert_eq!(barcelona.height(), 1);
        assert_eq!(barcelona.column("FBUY1900")?.f64()?.get(0), Some(1925.0));
        assert_eq!(barcelona.column("BUPR1900")?.f64()?.get(0), Some(4.5));
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_applies_to_each_kind() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path());

        let df = load_hisdac(&config, &ArchiveFetcher::new(), None, None, Some(1), false)
            .await?
            .collect()?;

        // The GeoPackage fills its quota first; the first CSV is still read.
        assert_eq!(df.height(), 2);
        assert_eq!(county(&df, 8019)?.column("BUPR1900")?.f64()?.get(0), Some(4.5));
        assert!(df.column("BUPL1900").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_suffix_selects_csv_only() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_archive(dir.path());

        let df = load_hisdac(
            &config,
            &ArchiveFetcher::new(),
            Some(".csv".to_string()),
            None,
            None,
            false,
        )
        .await?
        .collect()?;

        assert_eq!(df.height(), 3);
        assert!(df.column("FBUY1900").is_err());
        assert_eq!(county(&df, 8019)?.height(), 1);
        Ok(())
    }
}
