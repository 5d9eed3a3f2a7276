use crate::archive::error::GeoPackageError;
use geozero::wkb::GpkgWkb;
use geozero::ToWkt;
use log::{debug, warn};
use polars::prelude::*;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::io::Write;

pub const GEOMETRY_COLUMN: &str = "geometry";

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    fn attribute(value: ValueRef<'_>) -> Cell {
        match value {
            ValueRef::Null | ValueRef::Blob(_) => Cell::Null,
            ValueRef::Integer(number) => Cell::Int(number),
            ValueRef::Real(number) => Cell::Real(number),
            ValueRef::Text(text) => Cell::Text(String::from_utf8_lossy(text).into_owned()),
        }
    }

    fn geometry(value: ValueRef<'_>) -> Cell {
        match value {
            ValueRef::Blob(blob) => match GpkgWkb(blob.to_vec()).to_wkt() {
                Ok(text) => Cell::Text(text),
                Err(e) => {
                    debug!("Unreadable GeoPackage geometry: {}", e);
                    Cell::Null
                }
            },
            ValueRef::Text(text) => Cell::Text(String::from_utf8_lossy(text).into_owned()),
            _ => Cell::Null,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(number) => Some(*number),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Cell::Int(number) => Some(*number as f64),
            Cell::Real(number) => Some(*number),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(number) => Some(number.to_string()),
            Cell::Real(number) => Some(number.to_string()),
            Cell::Text(text) => Some(text.clone()),
        }
    }
}

/// Column dtype follows the values: all integers give `Int64`, any mix of
/// numbers gives `Float64`, anything else `String`.
fn into_column(name: &str, cells: &[Cell]) -> Column {
    let mut present = cells.iter().filter(|cell| **cell != Cell::Null);
    if present.clone().all(|cell| matches!(cell, Cell::Int(_))) {
        Column::new(name.into(), cells.iter().map(Cell::as_int).collect::<Vec<_>>())
    } else if present.all(|cell| matches!(cell, Cell::Int(_) | Cell::Real(_))) {
        Column::new(name.into(), cells.iter().map(Cell::as_float).collect::<Vec<_>>())
    } else {
        Column::new(name.into(), cells.iter().map(Cell::as_text).collect::<Vec<_>>())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Reads the first feature table of a GeoPackage into a frame. The geometry
/// column is renamed to `geometry` and holds WKT.
///
/// SQLite needs a file, so the member is staged in a temporary file first.
pub fn read_geopackage(member_name: &str, bytes: &[u8]) -> Result<DataFrame, GeoPackageError> {
    let sqlite_err = |e: rusqlite::Error| GeoPackageError::Sqlite(member_name.to_string(), e);

    let mut staged = tempfile::Builder::new()
        .suffix(".gpkg")
        .tempfile()
        .map_err(|e| GeoPackageError::Staging(member_name.to_string(), e))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| GeoPackageError::Staging(member_name.to_string(), e))?;

    let conn = Connection::open_with_flags(
        staged.path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(sqlite_err)?;

    let table: String = conn
        .query_row(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(sqlite_err)?
        .ok_or_else(|| GeoPackageError::NoFeatureTable(member_name.to_string()))?;
    let geometry_column: Option<String> = conn
        .query_row(
            "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&table],
            |row| row.get(0),
        )
        .optional()
        .map_err(sqlite_err)?;
    debug!(
        "Reading feature table '{}' (geometry {:?}) from {}",
        table, geometry_column, member_name
    );

    let mut statement = conn
        .prepare(&format!("SELECT * FROM {}", quote_identifier(&table)))
        .map_err(sqlite_err)?;
    let names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let geometry_index = geometry_column
        .as_deref()
        .and_then(|geometry| names.iter().position(|name| name == geometry));

    let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
    let mut rows = statement.query([]).map_err(sqlite_err)?;
    while let Some(row) = rows.next().map_err(sqlite_err)? {
        for (index, column) in cells.iter_mut().enumerate() {
            let value = row.get_ref(index).map_err(sqlite_err)?;
            column.push(if Some(index) == geometry_index {
                Cell::geometry(value)
            } else {
                Cell::attribute(value)
            });
        }
    }
    if geometry_index.is_none() {
        warn!("GeoPackage member {} has no geometry column", member_name);
    }

    let columns = names
        .iter()
        .zip(&cells)
        .enumerate()
        .map(|(index, (name, column))| {
            let name = if Some(index) == geometry_index {
                GEOMETRY_COLUMN
            } else {
                name.as_str()
            };
            into_column(name, column)
        })
        .collect::<Vec<_>>();
    DataFrame::new(columns).map_err(|e| GeoPackageError::Frame(member_name.to_string(), e))
}
