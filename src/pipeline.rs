//! Batch runs over a directory of CSV extracts.
//!
//! # Example
//!
//! ```no_run
//! use light_etl::config::EtlConfig;
//! use light_etl::pipeline::run_pipeline;
//!
//! let summary = run_pipeline(&EtlConfig::default())?;
//! println!("{}", summary.summary());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Each table is matched to a [`TableRole`](crate::config::TableRole) by
//! file name: `source` tables feed the locality dimension, `join_*` tables
//! only receive keys, `passthrough` tables are cleaned and copied.

pub mod executor;
pub mod summary;

pub use executor::{discover_inputs, run_pipeline, update_dimension};
pub use summary::{DimensionSummary, RunSummary, SUMMARY_FILE, TableStatus, TableSummary};
