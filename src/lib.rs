//! # light-etl
//!
//! Cleans heterogeneous CSV extracts from an energy utility (customers,
//! technical occurrences, energy losses, ...) and keys them against a
//! locality dimension whose surrogate keys never change once issued.
//!
//! ## Quick Start
//!
//! ```no_run
//! use light_etl::config::EtlConfig;
//!
//! let config = EtlConfig::from_file("etl.json")?;
//! let summary = light_etl::pipeline::run_pipeline(&config)?;
//! println!("{}", summary.summary());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`locality`]: text normalization, key allocation, dimension build and
//!   merge, fact enrichment and dimension persistence
//! - [`tables`]: CSV loading and the cleaning applied to every table
//! - [`pipeline`]: a whole run over an input directory
//! - [`config`]: JSON run configuration
//! - [`logging`]: console and rolling file logs
//! - [`error`]: error types and handling utilities
//!
//! ## Key stability
//!
//! Running twice over the same inputs produces the same dimension. Running
//! again with new localities appends rows after the current maximum keys:
//!
//! ```
//! use light_etl::locality::{KeyWidth, Locality, build, merge};
//!
//! let (dimension, _) = build([("Sao Paulo", "SP")], KeyWidth::DEFAULT_CITY)?;
//! let (dimension, _) = merge(dimension, [Locality::new("Campinas", "SP")])?;
//!
//! let campinas = dimension.get(&Locality::new("CAMPINAS", "SP")).map(|k| k.id_composite());
//! assert_eq!(campinas, Some("000201"));
//! # Ok::<(), light_etl::error::EtlError>(())
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod locality;
pub mod logging;
pub mod pipeline;
pub mod tables;
