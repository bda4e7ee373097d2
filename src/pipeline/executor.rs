//! Run execution.
//!
//! A run loads and cleans every input table and folds the localities of the
//! source tables into the dimension. The dimension is persisted before any
//! output is written, so every key found in an output is also on disk. The
//! fact tables are then enriched and written, and the summary comes last.

use super::summary::{DimensionSummary, RunSummary, SUMMARY_FILE, TableStatus, TableSummary};
use crate::config::{DimensionMode, EtlConfig, TableRole};
use crate::locality::{
    CITY_COLUMN, DimensionLock, DimensionOrigin, KeyWidth, Locality, LocalityDimension,
    MergeOutcome, STATE_COLUMN, build, enrich, load_dimension, merge_or_build, save_dimension,
};
use crate::tables::io::OUTPUT_SUFFIX;
use crate::tables::{
    CleaningOptions, CleaningReport, clean_table, output_path, read_table, text_column,
    write_table,
};
use anyhow::{Context as _, Result};
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A table that made it through loading and cleaning.
struct LoadedTable {
    file: String,
    role: TableRole,
    df: DataFrame,
    cleaning: CleaningReport,
    elapsed: Duration,
}

impl LoadedTable {
    fn fail(self, error: impl ToString) -> TableSummary {
        TableSummary {
            cleaning: Some(self.cleaning),
            duration_secs: self.elapsed.as_secs_f64(),
            ..TableSummary::failed(self.file, self.role, error)
        }
    }
}

/// Execute a full run as described by `config`.
///
/// Per-table failures, including a failed output write, are recorded in the
/// summary and do not stop the run. Dimension failures (key space
/// exhausted, corrupt or unwritable dimension file) abort it before any
/// output is written.
#[expect(clippy::too_many_lines)]
pub fn run_pipeline(config: &EtlConfig) -> Result<RunSummary> {
    let start = Instant::now();
    config.validate()?;
    let city_width = config.city_width()?;
    let dimension_path = config.dimension_path();
    let mut summary = RunSummary::new();

    let inputs = discover_inputs(&config.input_dir, &dimension_path)?;
    if inputs.is_empty() {
        tracing::warn!(input = %config.input_dir.display(), "No CSV files found");
    }
    tracing::info!(
        tables = inputs.len(),
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        "Starting run"
    );

    let options = CleaningOptions {
        name_columns: config.name_columns.clone(),
    };
    let mut tables = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let file = file_name(path);
        let role = config.role_for(&file);
        let table_start = Instant::now();
        match load_and_clean(path, &file, &options) {
            Ok((df, cleaning)) => tables.push(LoadedTable {
                file,
                role,
                df,
                cleaning,
                elapsed: table_start.elapsed(),
            }),
            Err(e) => {
                tracing::error!(file, "Failed to load table: {e:#}");
                summary.tables.push(TableSummary::failed(file, role, format!("{e:#}")));
            }
        }
    }

    let _lock = DimensionLock::acquire(&dimension_path)?;

    let mut records = Vec::new();
    let mut sources_ok = Vec::with_capacity(tables.len());
    for table in tables {
        if !table.role.contributes_localities() {
            sources_ok.push(table);
            continue;
        }
        match source_localities(&table.df, &table.file) {
            Ok(found) => {
                records.extend(found);
                sources_ok.push(table);
            }
            Err(e) => {
                tracing::error!(file = table.file, "Cannot read localities: {e}");
                summary.tables.push(table.fail(e));
            }
        }
    }

    let (dimension, outcome) =
        resolve_dimension(config.dimension_mode, &dimension_path, city_width, records)?;
    save_dimension(&dimension, &dimension_path)?;
    summary.dimension = Some(DimensionSummary {
        path: dimension_path,
        origin: outcome.origin,
        report: outcome.report,
    });

    let mut ready = Vec::with_capacity(sources_ok.len());
    for table in sources_ok {
        let enrich_start = Instant::now();
        let Some(join) = table.role.join_keys() else {
            ready.push((table, None));
            continue;
        };
        let LoadedTable {
            file,
            role,
            df,
            cleaning,
            elapsed,
        } = table;
        match enrich(df, &file, &dimension, join) {
            Ok((df, report)) => ready.push((
                LoadedTable {
                    file,
                    role,
                    df,
                    cleaning,
                    elapsed: elapsed + enrich_start.elapsed(),
                },
                Some(report),
            )),
            Err(e) => {
                tracing::error!(file, "Failed to enrich table: {e}");
                summary.tables.push(TableSummary {
                    cleaning: Some(cleaning),
                    ..TableSummary::failed(file, role, e)
                });
            }
        }
    }

    for (mut table, enrichment) in ready {
        let write_start = Instant::now();
        let output = output_path(&config.output_dir, Path::new(&table.file));
        if let Err(e) = write_table(&mut table.df, &output) {
            tracing::error!(file = table.file, output = %output.display(), "Failed to write output: {e}");
            summary.tables.push(TableSummary {
                enrichment,
                ..table.fail(e)
            });
            continue;
        }

        let elapsed = table.elapsed + write_start.elapsed();
        tracing::info!(
            file = table.file,
            rows = table.df.height(),
            output = %output.display(),
            "Table processed in {:.2}s",
            elapsed.as_secs_f64()
        );
        summary.tables.push(TableSummary {
            file: table.file,
            role: table.role,
            status: TableStatus::Written,
            error: None,
            cleaning: Some(table.cleaning),
            enrichment,
            output: Some(output),
            duration_secs: elapsed.as_secs_f64(),
        });
    }
    summary.tables.sort_by(|a, b| a.file.cmp(&b.file));

    summary.duration_secs = start.elapsed().as_secs_f64();
    std::fs::create_dir_all(&config.output_dir)?;
    summary.write_json(&config.output_dir.join(SUMMARY_FILE))?;

    if summary.has_failures() {
        tracing::warn!("{}", summary.summary());
    } else {
        tracing::info!("{}", summary.summary());
    }
    Ok(summary)
}

/// Build or merge the dimension from a single table and persist it.
pub fn update_dimension(
    input: &Path,
    dimension_path: &Path,
    city_width: KeyWidth,
    mode: DimensionMode,
) -> Result<(LocalityDimension, MergeOutcome)> {
    let file = file_name(input);
    let (df, _) = load_and_clean(input, &file, &CleaningOptions::default())?;
    let records = source_localities(&df, &file)?;

    let _lock = DimensionLock::acquire(dimension_path)?;
    let (dimension, outcome) = resolve_dimension(mode, dimension_path, city_width, records)?;
    save_dimension(&dimension, dimension_path)?;
    Ok((dimension, outcome))
}

/// Sorted `*.csv` files of `input_dir`, leaving out the dimension file and
/// earlier outputs.
pub fn discover_inputs(input_dir: &Path, dimension_path: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read input directory {}", input_dir.display()))?;

    let dimension_name = file_name(dimension_path);
    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !path.is_file() || !is_csv {
            continue;
        }
        let name = file_name(&path);
        let is_output = path
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy().ends_with(OUTPUT_SUFFIX));
        if name == dimension_name || is_output {
            tracing::debug!(file = name, "Skipping generated file");
            continue;
        }
        inputs.push(path);
    }
    inputs.sort();
    Ok(inputs)
}

fn load_and_clean(
    path: &Path,
    file: &str,
    options: &CleaningOptions,
) -> Result<(DataFrame, CleaningReport)> {
    let df = read_table(path)?;
    let (df, report) = clean_table(df, file, options)?;
    tracing::debug!(
        file,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        duplicates = report.duplicates_removed,
        "Table cleaned"
    );
    Ok((df, report))
}

/// Raw `(cidade, estado)` pairs of a source table, nulls read as empty.
fn source_localities(df: &DataFrame, file: &str) -> crate::error::Result<Vec<(String, String)>> {
    let cities = text_column(df, file, CITY_COLUMN)?;
    let states = text_column(df, file, STATE_COLUMN)?;
    Ok(cities
        .into_iter()
        .zip(states)
        .map(|(city, state)| (city.unwrap_or_default(), state.unwrap_or_default()))
        .collect())
}

fn resolve_dimension(
    mode: DimensionMode,
    dimension_path: &Path,
    city_width: KeyWidth,
    records: Vec<(String, String)>,
) -> Result<(LocalityDimension, MergeOutcome)> {
    match mode {
        DimensionMode::Rebuild => {
            tracing::warn!(
                path = %dimension_path.display(),
                "Rebuilding locality dimension, previously issued keys may change"
            );
            let (dimension, report) = build(records, city_width)?;
            Ok((
                dimension,
                MergeOutcome {
                    origin: DimensionOrigin::Built,
                    report: report.into(),
                },
            ))
        }
        DimensionMode::Merge => {
            let loaded = load_dimension(dimension_path, city_width)?;
            let incoming = records
                .iter()
                .map(|(city, state)| Locality::new(city, state));
            Ok(merge_or_build(loaded, incoming, city_width)?)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
