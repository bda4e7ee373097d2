//! Persistence of the locality dimension between runs.
//!
//! The file is the durable contract between runs: a CSV with the columns
//! `cidade, estado, id_cidade, id_estado, id_cidade_estado`, sorted by
//! `(estado, cidade)`. It is replaced atomically (temporary file + rename)
//! and the whole load -> merge -> save sequence should hold a
//! [`DimensionLock`].

use super::dimension::{DimensionRow, LoadedDimension, Locality, LocalityDimension};
use super::enrich::{
    CITY_COLUMN, CITY_KEY_COLUMN, COMPOSITE_KEY_COLUMN, STATE_COLUMN, STATE_KEY_COLUMN,
};
use super::keys::{KeyWidth, LocalityKey};
use crate::error::{EtlError, Result, ResultExt as _};
use crate::tables::io::{read_table, text_column, write_table};
use fs2::FileExt as _;
use polars::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Default file name of the persisted dimension.
pub const DIMENSION_FILE: &str = "dim_localidade.csv";

/// Column order of the persisted dimension.
pub const DIMENSION_COLUMNS: [&str; 5] = [
    CITY_COLUMN,
    STATE_COLUMN,
    CITY_KEY_COLUMN,
    STATE_KEY_COLUMN,
    COMPOSITE_KEY_COLUMN,
];

/// Loads the persisted dimension, or reports it as absent when the file
/// does not exist.
///
/// # Errors
///
/// A file that exists but cannot be read or violates the dimension
/// invariants is an error; it is never treated as absent.
pub fn load_dimension(path: &Path, city_width: KeyWidth) -> Result<LoadedDimension> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Locality dimension not found");
        return Ok(LoadedDimension::Absent);
    }

    let df = read_table(path).with_context(|| {
        format!("Failed to read locality dimension {}", path.display())
    })?;
    let dimension = dimension_from_frame(&df, city_width)?;

    tracing::info!(
        path = %path.display(),
        rows = dimension.len(),
        "Loaded locality dimension"
    );
    Ok(LoadedDimension::Present(dimension))
}

/// Converts a table in the persisted layout back into a dimension.
pub fn dimension_from_frame(df: &DataFrame, city_width: KeyWidth) -> Result<LocalityDimension> {
    let table = DIMENSION_FILE;
    let cities = text_column(df, table, CITY_COLUMN)?;
    let states = text_column(df, table, STATE_COLUMN)?;
    let city_ids = text_column(df, table, CITY_KEY_COLUMN)?;
    let state_ids = text_column(df, table, STATE_KEY_COLUMN)?;
    let composites = text_column(df, table, COMPOSITE_KEY_COLUMN)?;

    let mut rows = Vec::with_capacity(df.height());
    for ((((city, state), id_city), id_state), composite) in cities
        .into_iter()
        .zip(states)
        .zip(city_ids)
        .zip(state_ids)
        .zip(composites)
    {
        let key = LocalityKey::new(id_city.unwrap_or_default(), id_state.unwrap_or_default());
        if composite.as_deref() != Some(key.id_composite()) {
            return Err(EtlError::CorruptDimension(format!(
                "composite key {:?} does not match {}{}",
                composite.unwrap_or_default(),
                key.id_city(),
                key.id_state()
            )));
        }
        rows.push(DimensionRow {
            locality: Locality::new(
                city.as_deref().unwrap_or_default(),
                state.as_deref().unwrap_or_default(),
            ),
            key,
        });
    }

    LocalityDimension::from_rows(city_width, rows)
}

/// Renders the dimension in its persisted layout.
pub fn dimension_to_frame(dimension: &LocalityDimension) -> Result<DataFrame> {
    let mut columns: [Vec<String>; 5] = Default::default();
    for (locality, key) in dimension.iter() {
        let values = [
            locality.city(),
            locality.state(),
            key.id_city(),
            key.id_state(),
            key.id_composite(),
        ];
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value.to_owned());
        }
    }

    let columns = DIMENSION_COLUMNS
        .iter()
        .zip(columns)
        .map(|(name, values)| Column::from(Series::new((*name).into(), values)))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Overwrites the persisted dimension in one step.
pub fn save_dimension(dimension: &LocalityDimension, path: &Path) -> Result<()> {
    let mut df = dimension_to_frame(dimension)?;
    let staging = staging_path(path);

    write_table(&mut df, &staging)?;
    fs::rename(&staging, path).with_context(|| {
        format!("Failed to replace locality dimension {}", path.display())
    })?;

    tracing::info!(
        path = %path.display(),
        rows = dimension.len(),
        "Saved locality dimension"
    );
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DIMENSION_FILE.into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Exclusive advisory lock guarding a dimension file across processes.
/// Released on drop.
#[derive(Debug)]
pub struct DimensionLock {
    file: File,
    path: PathBuf,
}

impl DimensionLock {
    /// Blocks until the lock next to `dimension_path` is held.
    pub fn acquire(dimension_path: &Path) -> Result<Self> {
        let path = lock_path(dimension_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Acquired dimension lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DimensionLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "Failed to release dimension lock: {e}");
        }
    }
}

fn lock_path(dimension_path: &Path) -> PathBuf {
    let mut name = dimension_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DIMENSION_FILE.into());
    name.push(".lock");
    dimension_path.with_file_name(name)
}
