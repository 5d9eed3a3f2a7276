//! One loader per dataset. Each one fetches its archive when it is missing,
//! pulls the relevant members out of it, parses them and merges the result
//! into a single lazy table.

pub mod airports;
pub mod ghcn;
pub mod hisdac;
pub mod osm;
pub mod world;

use crate::error::VizDataError;
use crate::fetch::fetcher::{ArchiveFetcher, FetchOptions};
use crate::types::source::SourceDescriptor;
use log::error;
use polars::prelude::*;
use std::path::PathBuf;
use tokio::fs;

/// The product of one load: the unified table and, for datasets that come
/// with one, a geometry reference table.
#[derive(Clone)]
pub struct LoadedData {
    pub table: LazyFrame,
    pub reference: Option<DataFrame>,
}

impl LoadedData {
    pub fn new(table: LazyFrame) -> Self {
        Self {
            table,
            reference: None,
        }
    }

    pub fn with_reference(table: LazyFrame, reference: Option<DataFrame>) -> Self {
        Self { table, reference }
    }
}

/// Makes sure the archive of `descriptor` is on disk, downloading it if it
/// is missing (or always, when `options.force` is set).
///
/// Datasets without a remote URL must already be present.
pub(crate) async fn ensure_archive(
    fetcher: &ArchiveFetcher,
    descriptor: &SourceDescriptor,
    options: FetchOptions,
) -> Result<PathBuf, VizDataError> {
    match &descriptor.url {
        Some(url) => Ok(fetcher
            .ensure_downloaded(url, &descriptor.cache_path, options)
            .await?),
        None => match fs::try_exists(&descriptor.cache_path).await {
            Ok(true) => Ok(descriptor.cache_path.clone()),
            Ok(false) => {
                error!(
                    "{} data not found at {:?}",
                    descriptor.kind, descriptor.cache_path
                );
                Err(VizDataError::FileNotFound(descriptor.cache_path.clone()))
            }
            Err(e) => Err(VizDataError::Io(descriptor.cache_path.clone(), e)),
        },
    }
}

/// Stacks frames that may disagree on their columns; missing columns become
/// nulls and clashing dtypes are widened to a common supertype.
pub(crate) fn concat_relaxed(mut frames: Vec<LazyFrame>) -> PolarsResult<LazyFrame> {
    match frames.len() {
        0 => Ok(empty_frame()),
        1 => Ok(frames.remove(0)),
        _ => concat_lf_diagonal(
            frames,
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        ),
    }
}

pub(crate) fn empty_frame() -> LazyFrame {
    DataFrame::empty().lazy()
}
