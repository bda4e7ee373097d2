//! Loading, cleaning and writing the tabular extracts.
//!
//! Every input is read with all columns as text, so identifiers such as
//! `0001` keep their leading zeros from disk to disk.

pub mod cleaning;
pub mod io;

pub use cleaning::{CleaningOptions, CleaningReport, clean_table, standardize_column_names};
pub use io::{
    SourceEncoding, has_column, output_path, put_text_column, read_table, text_column, write_table,
};
