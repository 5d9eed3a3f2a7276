use crate::normalize::error::NormalizeError;
use log::warn;
use polars::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// How a CSV member is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvLayout {
    pub has_header: bool,
    /// Names assigned to the columns, in order. Required when there is no header.
    pub column_names: Option<Vec<&'static str>>,
    /// Tokens read as null in every column.
    pub null_values: Vec<&'static str>,
    pub infer_schema_length: Option<usize>,
    /// Columns always read as text, so codes like `08019` keep their zeros.
    pub text_columns: Vec<&'static str>,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            has_header: true,
            column_names: None,
            null_values: Vec::new(),
            infer_schema_length: Some(100),
            text_columns: Vec::new(),
        }
    }
}

impl CsvLayout {
    pub fn headerless(column_names: Vec<&'static str>) -> Self {
        Self {
            has_header: false,
            column_names: Some(column_names),
            ..Self::default()
        }
    }

    pub fn with_null_values(mut self, null_values: &[&'static str]) -> Self {
        self.null_values = null_values.to_vec();
        self
    }

    pub fn with_text_columns(mut self, columns: &[&'static str]) -> Self {
        self.text_columns = columns.to_vec();
        self
    }

    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }
}

/// Parses raw CSV bytes into a DataFrame. Blocking; call from `spawn_blocking`.
pub fn read_csv(member: &str, bytes: &[u8], layout: &CsvLayout) -> Result<DataFrame, NormalizeError> {
    let mut temp_file = NamedTempFile::new().map_err(|e| NormalizeError::CsvReadIo {
        member: member.to_string(),
        source: e,
    })?;
    temp_file
        .write_all(bytes)
        .and_then(|_| temp_file.flush())
        .map_err(|e| NormalizeError::CsvReadIo {
            member: member.to_string(),
            source: e,
        })?;

    let mut options = CsvReadOptions::default()
        .with_has_header(layout.has_header)
        .with_infer_schema_length(layout.infer_schema_length);
    if !layout.text_columns.is_empty() {
        let overwrite = Schema::from_iter(
            layout
                .text_columns
                .iter()
                .map(|name| Field::new((*name).into(), DataType::String)),
        );
        options = options.with_schema_overwrite(Some(Arc::new(overwrite)));
    }
    if !layout.null_values.is_empty() {
        let null_values = layout.null_values.clone();
        options = options.map_parse_options(move |parse| {
            parse.with_null_values(Some(NullValues::AllColumns(
                null_values.iter().map(|token| (*token).into()).collect(),
            )))
        });
    }

    let mut df = options
        .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| NormalizeError::CsvReadPolars {
            member: member.to_string(),
            source: e,
        })?;

    if let Some(names) = &layout.column_names {
        if df.width() != names.len() {
            warn!(
                "CSV column count ({}) does not match schema length ({}) for {}",
                df.width(),
                names.len(),
                member
            );
            return Err(NormalizeError::SchemaMismatch {
                member: member.to_string(),
                expected: names.len(),
                found: df.width(),
            });
        }
        df.set_column_names(names.iter().copied())
            .map_err(|e| NormalizeError::ColumnRenameError {
                member: member.to_string(),
                source: e,
            })?;
    }
    Ok(df)
}
