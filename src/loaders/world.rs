//! World socioeconomic indicators.
//!
//! The archive is a zip holding one zip per indicator (each with a single CSV
//! inside) next to the loose files of the Natural Earth admin-0 shapefile.
//! Indicator tables are joined on country, code and year; the shapefile
//! becomes the country reference, its sovereign codes rewritten to match the
//! indicator codes.

use crate::archive::extractor::{extract, ArchiveExtractor, Selection};
use crate::config::DataConfig;
use crate::error::VizDataError;
use crate::fetch::fetcher::{ArchiveFetcher, FetchOptions};
use crate::loaders::{empty_frame, ensure_archive, LoadedData};
use crate::merge::country_codes::{reconcile, CountryCodeMapping, MANUAL_OVERRIDES};
use crate::merge::merger::merge;
use crate::normalize::csv::{read_csv, CsvLayout};
use crate::normalize::rules::geometry_to_text;
use crate::types::source::{file_name_of, ArchiveFormat, DatasetKind, MemberFilter, SourceDescriptor};
use crate::types::tag_value::GeometryValue;
use log::{debug, info, warn};
use polars::prelude::*;
use shapefile::dbase::FieldValue;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::task;

pub const COUNTRY: &str = "Country";
pub const CODE: &str = "Code";
pub const YEAR: &str = "Year";
pub const JOIN_KEYS: [&str; 3] = [COUNTRY, CODE, YEAR];

/// Rows outside `(FIRST_YEAR, LAST_YEAR)` are dropped.
pub const FIRST_YEAR: i32 = 1950;
pub const LAST_YEAR: i32 = 2025;

/// Stem shared by the Natural Earth country files inside the archive.
pub const COUNTRY_SHAPES: &str = "ne_10m_admin_0_countries";
pub const SOVEREIGN_CODE: &str = "SOV_A3";
pub const COUNTRY_NAME: &str = "ADMIN";

/// One indicator table and how its value columns are named in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub archive: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
}

pub const INDICATORS: &[Indicator] = &[
    Indicator {
        archive: "cross-country-literacy-rates.zip",
        columns: &[("Literacy rate", "Literacy")],
    },
    Indicator {
        archive: "gdp-per-capita-maddison-project-database.zip",
        columns: &[("GDP per capita", "GDP")],
    },
    Indicator {
        archive: "primary-schools-with-access-to-internet.zip",
        columns: &[(
            "4.a.1 - Proportion of schools with access to the internet for pedagogical purposes, by education level (%) - SE_ACS_INTNT - Primary",
            "Internet%",
        )],
    },
    Indicator {
        archive: "median-age.zip",
        columns: &[
            ("Median age - Sex: all - Age: all - Variant: estimates", "Median Age Estimates"),
            ("Median age - Sex: all - Age: all - Variant: medium", "Median Age Medium"),
        ],
    },
    Indicator {
        archive: "population-density.zip",
        columns: &[("Population density", "Population density")],
    },
    Indicator {
        archive: "death-rate-from-mental-health-and-substance-use-disorders-who.zip",
        columns: &[(
            "Death rate from mental and substance use disorders among both sexes",
            "Death Rate",
        )],
    },
];

fn indicator_for(container: Option<&str>) -> Option<&'static Indicator> {
    let container = container?;
    INDICATORS.iter().find(|indicator| indicator.archive == container)
}

fn csv_layout() -> CsvLayout {
    CsvLayout::default().with_null_values(&["na", "NA", "NaN", "nan"])
}

/// Renames an indicator table to the shared schema and keeps the years of
/// interest. Columns that are not listed (annotations and the like) are dropped.
fn tidy(mut frame: LazyFrame, indicator: &Indicator) -> Result<LazyFrame, VizDataError> {
    let schema = frame.collect_schema()?;
    let required = ["Entity", CODE, YEAR]
        .into_iter()
        .chain(indicator.columns.iter().map(|(source, _)| *source));
    for column in required {
        if schema.get(column).is_none() {
            return Err(VizDataError::Schema {
                dataset: indicator.archive.to_string(),
                column: column.to_string(),
            });
        }
    }

    let mut columns = vec![
        col("Entity").cast(DataType::String).alias(COUNTRY),
        col(CODE).cast(DataType::String),
        col(YEAR).cast(DataType::Int16),
    ];
    columns.extend(
        indicator
            .columns
            .iter()
            .map(|(source, target)| col(*source).cast(DataType::Float64).alias(*target)),
    );
    Ok(frame.select(columns).filter(
        col(YEAR)
            .gt(lit(FIRST_YEAR))
            .and(col(YEAR).lt(lit(LAST_YEAR))),
    ))
}

/// A Natural Earth country: sovereign code, name and outline.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryShape {
    pub code: Option<String>,
    pub name: Option<String>,
    pub geometry: GeometryValue,
}

fn text_field(record: &shapefile::dbase::Record, name: &str) -> Option<String> {
    match record.get(name) {
        Some(FieldValue::Character(value)) => value.as_ref().map(|v| v.trim().to_string()),
        _ => None,
    }
}

fn read_country_shapes(shp_path: &Path) -> Result<Vec<CountryShape>, VizDataError> {
    let shapefile_err = |e| VizDataError::Shapefile(shp_path.to_path_buf(), e);
    let mut reader = shapefile::Reader::from_path(shp_path).map_err(shapefile_err)?;
    let mut countries = Vec::new();
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(shapefile_err)?;
        let geometry = match geo_types::Geometry::<f64>::try_from(shape) {
            Ok(geometry) => GeometryValue::Shape(geometry),
            Err(_) => GeometryValue::Missing,
        };
        countries.push(CountryShape {
            code: text_field(&record, SOVEREIGN_CODE),
            name: text_field(&record, COUNTRY_NAME),
            geometry,
        });
    }
    Ok(countries)
}

/// Unpacks the loose shapefile members next to each other and reads them.
/// `None` when the archive holds no country shapes.
fn load_country_shapes(archive: &Path) -> Result<Option<Vec<CountryShape>>, VizDataError> {
    let selection =
        Selection::new(MemberFilter::default().with_contains(Some(COUNTRY_SHAPES.to_string())));
    let members = extract(archive, ArchiveFormat::Zip, selection)?;
    if members.is_empty() {
        return Ok(None);
    }

    let staging = tempfile::tempdir().map_err(|e| VizDataError::Io(archive.to_path_buf(), e))?;
    for member in &members {
        info!("Processing file: {}", member.name);
        let target = staging.path().join(file_name_of(&member.name));
        std::fs::write(&target, &member.bytes).map_err(|e| VizDataError::Io(target.clone(), e))?;
    }
    let shp_path = staging.path().join(format!("{}.shp", COUNTRY_SHAPES));
    if !shp_path.exists() {
        warn!("{} found in archive without its .shp file", COUNTRY_SHAPES);
        return Ok(None);
    }
    read_country_shapes(&shp_path).map(Some)
}

/// The country reference with its codes rewritten through `mapping`.
pub fn reference_frame(
    countries: &[CountryShape],
    mapping: &CountryCodeMapping,
) -> PolarsResult<DataFrame> {
    df! {
        SOVEREIGN_CODE => countries
            .iter()
            .map(|c| c.code.as_deref().map(|code| mapping.resolve(code).to_string()))
            .collect::<Vec<_>>(),
        COUNTRY_NAME => countries.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
        "geometry" => countries.iter().map(|c| geometry_to_text(&c.geometry)).collect::<Vec<_>>(),
    }
}

fn distinct_codes(table: &LazyFrame) -> PolarsResult<BTreeSet<String>> {
    let codes = table
        .clone()
        .select([col(CODE).unique()])
        .collect()?;
    Ok(codes
        .column(CODE)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

fn load_blocking(descriptor: SourceDescriptor) -> Result<LoadedData, VizDataError> {
    let path = descriptor.cache_path.as_path();
    let layout = csv_layout();
    let mut extractor = ArchiveExtractor::open(path, descriptor.format)?
        .with_containers(INDICATORS.iter().map(|indicator| indicator.archive));

    let mut tables = Vec::new();
    for member in extractor.members(Selection::new(descriptor.filter.clone()))? {
        let member = member?;
        let Some(indicator) = indicator_for(member.container.as_deref()) else {
            continue;
        };
        info!("Reading CSV data from {}", member.name);
        let df = read_csv(&member.name, &member.bytes, &layout)?;
        info!("Loaded {} records from {}", df.height(), member.name);
        tables.push(tidy(df.lazy(), indicator)?);
    }
    let countries = load_country_shapes(path)?;

    if tables.is_empty() {
        warn!("No valid indicator files found in {:?}", path);
        return Ok(LoadedData::new(empty_frame()));
    }
    if tables.len() < INDICATORS.len() {
        warn!(
            "Only {} of {} indicator tables found in {:?}",
            tables.len(),
            INDICATORS.len(),
            path
        );
    }
    let table = merge(tables, &JOIN_KEYS)?;

    let reference = match countries {
        Some(countries) => {
            let data_codes = distinct_codes(&table)?;
            let mapping = reconcile(
                countries.iter().filter_map(|c| c.code.as_deref()),
                data_codes.iter().map(String::as_str),
                MANUAL_OVERRIDES,
            );
            debug!("Country code mapping: {:?}", mapping.map);
            Some(reference_frame(&countries, &mapping)?)
        }
        None => None,
    };
    Ok(LoadedData::with_reference(table, reference))
}

/// Loads and joins the world indicator tables, together with the Natural
/// Earth country reference when the archive carries one.
///
/// The archive has no public download; it is fetched only when a URL is
/// configured and must otherwise be placed in the data directory by hand.
pub async fn load_world(
    config: &DataConfig,
    fetcher: &ArchiveFetcher,
    suffix: Option<String>,
    force_download: bool,
) -> Result<LoadedData, VizDataError> {
    let mut descriptor = config.descriptor(DatasetKind::World);
    if suffix.is_some() {
        descriptor.filter.suffix = suffix;
    }
    let options = FetchOptions {
        force: force_download,
        ..FetchOptions::default()
    };
    ensure_archive(fetcher, &descriptor, options).await?;
    info!("Loading world data from {:?}", descriptor.cache_path);
    Ok(task::spawn_blocking(move || load_blocking(descriptor)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_archives::{write_zip, zip_bytes};

    fn indicator_zip(csv_name: &str, csv: &str) -> Vec<u8> {
        zip_bytes(&[("readme.md", b"source: OWID"), (csv_name, csv.as_bytes())])
    }

    fn world_archive(dir: &Path) -> DataConfig {
        let config = DataConfig::builder().data_dir(dir).build();
        let literacy = indicator_zip(
            "cross-country-literacy-rates.csv",
            "Entity,Code,Year,Literacy rate\n\
             Spain,ESP,1940,80.0\n\
             Spain,ESP,2000,97.5\n\
             France,FRA,2000,99.0\n\
             Europe,,2000,98.0\n",
        );
        let gdp = indicator_zip(
            "gdp-per-capita-maddison.csv",
            "Entity,Code,Year,GDP per capita,900793-annotations\n\
             Spain,ESP,2000,24000,\n\
             Chile,CHL,2000,9000,estimate\n\
             Spain,ESP,2030,NaN,\n",
        );
        write_zip(
            &config.path_of(DatasetKind::World),
            &[
                ("cross-country-literacy-rates.zip", literacy.as_slice()),
                ("gdp-per-capita-maddison-project-database.zip", gdp.as_slice()),
                ("unrelated.zip", gdp.as_slice()),
            ],
        );
        config
    }

    #[tokio::test]
    async fn test_joins_indicators_on_country_code_year() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let config = world_archive(dir.path());

        let loaded = load_world(&config, &ArchiveFetcher::new(), None, false).await?;
        assert!(loaded.reference.is_none());

        let df = loaded
            .table
            .sort(JOIN_KEYS, SortMultipleOptions::default())
            .collect()?;
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["Country", "Code", "Year", "Literacy", "GDP"]);
        assert_eq!(df.column(YEAR)?.dtype(), &DataType::Int16);

        // Chile (gdp only), France (literacy only), Spain 2000 (both); Europe has no code
        // and the 1940 and 2030 rows are out of range.
        assert_eq!(df.height(), 3);
        let countries = df.column(COUNTRY)?.str()?;
        assert_eq!(countries.get(2), Some("Spain"));
        assert_eq!(df.column("Literacy")?.f64()?.get(2), Some(97.5));
        assert_eq!(df.column("GDP")?.f64()?.get(2), Some(24000.0));
        assert_eq!(df.column("GDP")?.f64()?.get(1), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_archive_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = DataConfig::builder().data_dir(dir.path()).build();
        let result = load_world(&config, &ArchiveFetcher::new(), None, false).await;
        assert!(matches!(result, Err(VizDataError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_indicator_column_is_a_schema_error() {
        let frame = df! {
            "Entity" => ["Spain"],
            "Code" => ["ESP"],
            "Year" => [2000i64],
        }
        .unwrap()
        .lazy();
        let result = tidy(frame, &INDICATORS[0]);
        assert!(matches!(
            result,
            Err(VizDataError::Schema { column, .. }) if column == "Literacy rate"
        ));
    }

    #[test]
    fn test_reference_codes_follow_mapping() -> PolarsResult<()> {
        let countries = vec![
            CountryShape {
                code: Some("FR1".to_string()),
                name: Some("France".to_string()),
                geometry: GeometryValue::Wkt("POINT(2 46)".to_string()),
            },
            CountryShape {
                code: Some("ESP".to_string()),
                name: Some("Spain".to_string()),
                geometry: GeometryValue::Missing,
            },
        ];
        let mapping = reconcile(["FR1", "ESP"], ["FRA", "ESP"], MANUAL_OVERRIDES);
        let df = reference_frame(&countries, &mapping)?;

        let codes = df.column(SOVEREIGN_CODE)?.str()?;
        assert_eq!(codes.get(0), Some("FRA"));
        assert_eq!(codes.get(1), Some("ESP"));
        assert_eq!(df.column("geometry")?.str()?.get(0), Some("POINT(2 46)"));
        assert_eq!(df.column("geometry")?.null_count(), 1);
        Ok(())
    }
}
