use super::io::{column_names, put_text_column, text_column};
use crate::error::Result;
use crate::locality::normalize_person_name;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Columns whose name matches are treated as dates.
static DATE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)data|date").expect("date column pattern is valid"));

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Output format of every date column.
pub const DATE_OUTPUT_FORMAT: &str = "%d/%m/%Y";

/// What [`clean_table`] should do besides the fixed steps.
#[derive(Debug, Clone, Default)]
pub struct CleaningOptions {
    /// Columns (post-standardization names) cleaned as person names.
    pub name_columns: Vec<String>,
}

/// Counters from cleaning one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub empty_rows_removed: usize,
    pub duplicates_removed: usize,
    /// Non-empty values in date columns that matched no known format.
    pub invalid_dates: usize,
}

/// Lowercases, trims and replaces spaces with underscores. Clashing names
/// get `_1`, `_2`, ... suffixes.
pub fn standardize_column_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(names.len());

    for name in names {
        let base = name.trim().to_lowercase().replace(' ', "_");
        let mut candidate = base.clone();
        let mut count = 0;
        while seen.contains(&candidate) {
            count += 1;
            candidate = format!("{base}_{count}");
        }
        seen.insert(candidate.clone());
        cleaned.push(candidate);
    }
    cleaned
}

pub fn rename_columns(df: &DataFrame) -> Result<DataFrame> {
    let names = standardize_column_names(&column_names(df));
    let columns: Vec<Column> = df
        .get_columns()
        .iter()
        .zip(names)
        .map(|(column, name)| column.clone().with_name(name.into()))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Removes rows in which every cell is null.
pub fn drop_empty_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    if df.width() == 0 {
        return Ok((df.clone(), 0));
    }
    let mut keep = BooleanChunked::full("keep".into(), false, df.height());
    for column in df.get_columns() {
        keep = &keep | &column.as_materialized_series().is_not_null();
    }
    let filtered = df.filter(&keep)?;
    let removed = df.height() - filtered.height();
    Ok((filtered, removed))
}

/// Removes exact duplicate rows, keeping the first occurrence in place.
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    if df.width() == 0 {
        return Ok((df.clone(), 0));
    }
    let unique = df
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let removed = df.height() - unique.height();
    Ok((unique, removed))
}

/// Parses a date in any accepted format.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|datetime| datetime.date())
        })
}

pub fn is_date_column(name: &str) -> bool {
    DATE_COLUMN.is_match(name)
}

/// Rewrites every date column as `dd/mm/yyyy`. Unparseable values become
/// null; returns how many there were.
pub fn reformat_dates(df: &mut DataFrame, table: &str) -> Result<usize> {
    let mut invalid = 0;
    for name in column_names(df).iter().filter(|name| is_date_column(name)) {
        let values = text_column(df, table, name)?
            .into_iter()
            .map(|value| {
                let value = value.filter(|v| !v.trim().is_empty())?;
                let parsed = parse_date(&value);
                if parsed.is_none() {
                    invalid += 1;
                }
                parsed.map(|date| date.format(DATE_OUTPUT_FORMAT).to_string())
            })
            .collect();
        put_text_column(df, name, values)?;
    }
    if invalid > 0 {
        tracing::warn!(table, invalid, "Date values could not be parsed and were cleared");
    }
    Ok(invalid)
}

/// Applies [`normalize_person_name`] to each listed column that exists.
pub fn normalize_name_columns(df: &mut DataFrame, table: &str, columns: &[String]) -> Result<()> {
    let present = column_names(df);
    for name in columns.iter().filter(|name| present.contains(name)) {
        let values = text_column(df, table, name)?
            .into_iter()
            .map(|value| {
                let cleaned = normalize_person_name(value.as_deref());
                (!cleaned.is_empty()).then_some(cleaned)
            })
            .collect();
        put_text_column(df, name, values)?;
    }
    Ok(())
}

/// Standard cleaning for every input table: column names, empty rows,
/// duplicate rows, date formats and person names, in that order.
pub fn clean_table(
    df: DataFrame,
    table: &str,
    options: &CleaningOptions,
) -> Result<(DataFrame, CleaningReport)> {
    let mut report = CleaningReport {
        rows_in: df.height(),
        ..CleaningReport::default()
    };

    let df = rename_columns(&df)?;
    let (df, empty) = drop_empty_rows(&df)?;
    report.empty_rows_removed = empty;
    let (mut df, duplicates) = drop_duplicate_rows(&df)?;
    report.duplicates_removed = duplicates;

    report.invalid_dates = reformat_dates(&mut df, table)?;
    normalize_name_columns(&mut df, table, &options.name_columns)?;

    report.rows_out = df.height();
    Ok((df, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn frame(columns: Vec<(&str, Vec<Option<&str>>)>) -> Result<DataFrame> {
        let columns = columns
            .into_iter()
            .map(|(name, values)| Column::from(Series::new(name.into(), values)))
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    #[test]
    fn test_standardize_column_names() {
        let names = vec![
            " Nome Cliente ".to_owned(),
            "CIDADE".to_owned(),
            "cidade".to_owned(),
            "Data Adesao".to_owned(),
        ];
        assert_eq!(
            standardize_column_names(&names),
            vec!["nome_cliente", "cidade", "cidade_1", "data_adesao"]
        );
    }

    #[test]
    fn test_drop_empty_rows() -> Result<()> {
        let df = frame(vec![
            ("a", vec![Some("1"), None, None]),
            ("b", vec![None, None, Some("x")]),
        ])?;
        let (cleaned, removed) = drop_empty_rows(&df)?;
        assert_eq!(removed, 1);
        assert_eq!(cleaned.height(), 2);
        Ok(())
    }

    #[test]
    fn test_drop_duplicate_rows_keeps_order() -> Result<()> {
        let df = frame(vec![
            ("cidade", vec![Some("Recife"), Some("Natal"), Some("Recife"), Some("Olinda")]),
            ("estado", vec![Some("PE"), Some("RN"), Some("PE"), Some("PE")]),
        ])?;
        let (cleaned, removed) = drop_duplicate_rows(&df)?;
        assert_eq!(removed, 1);
        assert_eq!(
            text_column(&cleaned, "t", "cidade")?,
            vec![
                Some("Recife".to_owned()),
                Some("Natal".to_owned()),
                Some("Olinda".to_owned())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7);
        assert_eq!(parse_date("2024-03-07"), expected);
        assert_eq!(parse_date("07/03/2024"), expected);
        assert_eq!(parse_date("07-03-2024"), expected);
        assert_eq!(parse_date("2024-03-07 14:30:00"), expected);
        assert_eq!(parse_date("ontem"), None);
    }

    #[test]
    fn test_reformat_dates_only_touches_date_columns() -> Result<()> {
        let mut df = frame(vec![
            ("data_perda", vec![Some("2024-01-31"), Some("invalida"), None]),
            ("valor", vec![Some("2024-01-31"), Some("x"), None]),
        ])?;
        let invalid = reformat_dates(&mut df, "perdas")?;
        assert_eq!(invalid, 1);
        assert_eq!(
            text_column(&df, "perdas", "data_perda")?,
            vec![Some("31/01/2024".to_owned()), None, None]
        );
        assert_eq!(
            text_column(&df, "perdas", "valor")?.first().cloned().flatten(),
            Some("2024-01-31".to_owned())
        );
        Ok(())
    }

    #[test]
    fn test_clean_table_pipeline() -> Result<()> {
        let df = frame(vec![
            ("Nome Cliente", vec![Some("Sr. Carlos Carlos Lima"), None, Some("Sr. Carlos Carlos Lima")]),
            ("Cidade", vec![Some("Niterói"), None, Some("Niterói")]),
            ("Data Adesao", vec![Some("2023-05-02"), None, Some("2023-05-02")]),
        ])?;
        let options = CleaningOptions {
            name_columns: vec!["nome_cliente".to_owned()],
        };
        let (cleaned, report) = clean_table(df, "clientes", &options)?;

        assert_eq!(report.rows_in, 3);
        assert_eq!(report.empty_rows_removed, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rows_out, 1);
        assert_eq!(
            text_column(&cleaned, "clientes", "nome_cliente")?,
            vec![Some("Carlos Lima".to_owned())]
        );
        assert_eq!(
            text_column(&cleaned, "clientes", "data_adesao")?,
            vec![Some("02/05/2023".to_owned())]
        );
        // City text is left for the locality engine.
        assert_eq!(
            text_column(&cleaned, "clientes", "cidade")?,
            vec![Some("Niterói".to_owned())]
        );
        Ok(())
    }
}
