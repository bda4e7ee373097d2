use crate::error::{EtlError, Result, ResultExt as _};
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Delimiters tried when sniffing a header line.
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Suffix appended to the stem of every processed table.
pub const OUTPUT_SUFFIX: &str = "_tratado";

/// Text encoding an input file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

/// Decodes raw file bytes as UTF-8, falling back to Latin-1 (windows-1252).
pub fn decode_bytes(bytes: Vec<u8>) -> (String, SourceEncoding) {
    match String::from_utf8(bytes) {
        Ok(text) => {
            let text = match text.strip_prefix('\u{feff}') {
                Some(stripped) => stripped.to_owned(),
                None => text,
            };
            (text, SourceEncoding::Utf8)
        }
        Err(err) => {
            let bytes = err.into_bytes();
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
            (text.into_owned(), SourceEncoding::Latin1)
        }
    }
}

/// Picks the candidate delimiter occurring most often, outside quotes, in
/// the first non-empty line. Defaults to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(header) = text.lines().find(|line| !line.trim().is_empty()) else {
        return b',';
    };

    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for byte in header.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        for (count, candidate) in counts.iter_mut().zip(CANDIDATE_DELIMITERS) {
            if byte == candidate {
                *count += 1;
            }
        }
    }

    counts
        .iter()
        .zip(CANDIDATE_DELIMITERS)
        .filter(|(count, _)| **count > 0)
        // max_by_key keeps the last maximum; reverse so ties go to the earlier candidate
        .rev()
        .max_by_key(|(count, _)| **count)
        .map(|(_, delimiter)| delimiter)
        .unwrap_or(b',')
}

/// Parses CSV text with every column read as a string.
pub fn parse_csv_text(text: String, separator: u8) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()
        .context("Failed to parse CSV")
}

/// Loads a CSV file, sniffing its delimiter and encoding.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (text, encoding) = decode_bytes(bytes);
    if text.trim().is_empty() {
        return Err(EtlError::DataProcessing(format!(
            "{} is empty",
            path.display()
        )));
    }
    let separator = sniff_delimiter(&text);

    tracing::debug!(
        file = %path.display(),
        ?encoding,
        delimiter = %char::from(separator).escape_default(),
        "Reading table"
    );

    parse_csv_text(text, separator)
}

/// Writes a table as comma-separated UTF-8 with a header row.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}

/// `<output_dir>/<stem>_tratado.csv`
pub fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tabela".to_owned());
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}.csv"))
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|c| c.as_str().to_owned())
        .collect()
}

/// Reads a column as owned optional strings, casting if needed.
pub fn text_column(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>> {
    if !has_column(df, name) {
        return Err(EtlError::MissingColumn {
            table: table.to_owned(),
            column: name.to_owned(),
        });
    }
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let values = series.str()?;
    Ok(values
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect())
}

/// Adds or replaces a string column.
pub fn put_text_column(df: &mut DataFrame, name: &str, values: Vec<Option<String>>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}
