use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use light_etl::config::{DimensionMode, EtlConfig};
use light_etl::locality::{normalize_city, normalize_person_name, normalize_state};
use light_etl::{logging, pipeline};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "light-etl",
    version,
    about = "Cleans utility CSV extracts and keys them against a stable locality dimension"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every CSV in the input directory
    Run {
        /// Path to a JSON configuration file
        #[arg(short, long, env = "LIGHT_ETL_CONFIG")]
        config: Option<PathBuf>,

        /// Input directory (overrides the configuration)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Discard the persisted dimension and assign keys from scratch
        #[arg(long)]
        rebuild: bool,
    },
    /// Build or extend the locality dimension from a single table
    Dimension {
        /// Table with `cidade` and `estado` columns
        #[arg(short, long)]
        input: PathBuf,

        /// Dimension file. Defaults to the configured one.
        #[arg(short, long)]
        dimension: Option<PathBuf>,

        /// Path to a JSON configuration file
        #[arg(short, long, env = "LIGHT_ETL_CONFIG")]
        config: Option<PathBuf>,

        /// Discard the persisted dimension and assign keys from scratch
        #[arg(long)]
        rebuild: bool,
    },
    /// Print the canonical form of a value
    Normalize {
        #[arg(value_enum)]
        kind: NormalizeKind,

        text: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NormalizeKind {
    City,
    State,
    Name,
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            input,
            output,
            rebuild,
        } => handle_run(config, input, output, rebuild),
        Commands::Dimension {
            input,
            dimension,
            config,
            rebuild,
        } => handle_dimension(input, dimension, config, rebuild),
        Commands::Normalize { kind, text } => {
            println!("{}", normalize(kind, &text));
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EtlConfig> {
    match path {
        Some(path) => EtlConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(EtlConfig::default()),
    }
}

fn handle_run(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    rebuild: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(input) = input {
        config.input_dir = input;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if rebuild {
        config.dimension_mode = DimensionMode::Rebuild;
    }
    logging::init(&config.log_dir)?;

    let summary = pipeline::run_pipeline(&config)?;
    println!("{}", summary.summary());
    if summary.has_failures() {
        anyhow::bail!(
            "{} table(s) failed, see {}",
            summary.failed_tables(),
            logging::current_error_log_path(&config.log_dir).display()
        );
    }
    Ok(())
}

fn handle_dimension(
    input: PathBuf,
    dimension: Option<PathBuf>,
    config_path: Option<PathBuf>,
    rebuild: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    logging::init(&config.log_dir)?;

    let dimension_path = dimension.unwrap_or_else(|| config.dimension_path());
    let mode = if rebuild {
        DimensionMode::Rebuild
    } else {
        config.dimension_mode
    };

    let (dimension, outcome) =
        pipeline::update_dimension(&input, &dimension_path, config.city_width()?, mode)?;
    println!(
        "{} ({:?}): {} localities, {} new, {} new states, {} skipped rows",
        dimension_path.display(),
        outcome.origin,
        dimension.len(),
        outcome.report.new_localities,
        outcome.report.new_states,
        outcome.report.skipped_rows
    );
    Ok(())
}

fn normalize(kind: NormalizeKind, text: &str) -> String {
    match kind {
        NormalizeKind::City => normalize_city(text),
        NormalizeKind::State => normalize_state(text),
        NormalizeKind::Name => normalize_person_name(Some(text)),
    }
}
