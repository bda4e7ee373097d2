//! Run summary: per-table and dimension counters for one run.

use crate::config::TableRole;
use crate::locality::{DimensionOrigin, EnrichReport, MergeReport};
use crate::tables::CleaningReport;
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name of the summary written next to the outputs.
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Written,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub file: String,
    pub role: TableRole,
    pub status: TableStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaning: Option<CleaningReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub duration_secs: f64,
}

impl TableSummary {
    pub fn failed(file: impl Into<String>, role: TableRole, error: impl ToString) -> Self {
        Self {
            file: file.into(),
            role,
            status: TableStatus::Failed,
            error: Some(error.to_string()),
            cleaning: None,
            enrichment: None,
            output: None,
            duration_secs: 0.0,
        }
    }

    pub fn unmatched(&self) -> usize {
        self.enrichment.map_or(0, |e| e.unmatched)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionSummary {
    pub path: PathBuf,
    pub origin: DimensionOrigin,
    #[serde(flatten)]
    pub report: MergeReport,
}

/// Everything a run did, in a form fit for logs and `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub tables: Vec<TableSummary>,
    pub dimension: Option<DimensionSummary>,
    pub duration_secs: f64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Local::now().to_rfc3339(),
            tables: Vec::new(),
            dimension: None,
            duration_secs: 0.0,
        }
    }

    pub fn table(&self, file: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.file == file)
    }

    pub fn failed_tables(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_tables() > 0
    }

    pub fn unmatched_rows(&self) -> usize {
        self.tables.iter().map(TableSummary::unmatched).sum()
    }

    /// One-line description of the run.
    pub fn summary(&self) -> String {
        let written = self.tables.len() - self.failed_tables();
        let dimension = match &self.dimension {
            Some(d) => format!(
                "dimension {:?}: {} -> {} localities ({} new, {} new states, {} skipped rows)",
                d.origin,
                d.report.rows_before,
                d.report.rows_after,
                d.report.new_localities,
                d.report.new_states,
                d.report.skipped_rows
            ),
            None => "dimension not updated".to_owned(),
        };
        format!(
            "Run completed: {written} tables written, {} failed, {} unmatched rows; {dimension}; {:.2}s",
            self.failed_tables(),
            self.unmatched_rows(),
            self.duration_secs
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary {}", path.display()))
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
