//! # light-etl
//!
//! ```bash
//! light-etl run --config etl.json
//! light-etl dimension --input database/clientes.csv
//! light-etl normalize city "São  Paulo"
//! ```
//!
//! Set `RUST_LOG=debug` for per-table detail.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::run_command(cli.command)
}
