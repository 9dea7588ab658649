//! PhiSym dataset CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use phisym::config::ReductionConfig;
use phisymdf::dataset::PhiSymDataset;
use phisymdf::pipeline::reduce_dataset;
use phisymdf::schema::discover_trials;

#[derive(Parser)]
#[command(name = "phisymdf")]
#[command(about = "Reduce ECAL PhiSym calibration datasets")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections, record names, shapes and trial widths
    Inspect {
        /// Input dataset (JSON columnar)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Reduce every collection along one axis
    Reduce {
        /// Input dataset (JSON columnar)
        #[arg(short, long)]
        input: PathBuf,

        /// Axis to reduce
        #[arg(long, default_value = "0")]
        axis: usize,

        /// Threads for partitioned reductions. Overrides the config file.
        #[arg(long)]
        threads: Option<usize>,

        /// Reduction config (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Inspect { input } => cmd_inspect(&input),
        Commands::Reduce { input, axis, threads, config, output } => {
            cmd_reduce(&input, axis, threads, config.as_ref(), output.as_ref())
        }
    }
}

fn cmd_inspect(input: &Path) -> Result<()> {
    let dataset = load_dataset(input)?;

    let collections = dataset
        .collections()
        .map(|collection| -> phisymdf::Result<serde_json::Value> {
            let trials = match collection.record_name {
                "Info" => None,
                _ => Some(discover_trials(collection.fields.keys().map(String::as_str))?),
            };
            Ok(serde_json::json!({
                "collection": collection.name,
                "record": collection.record_name,
                "shape": collection.shape(),
                "fields": collection.fields.keys().collect::<Vec<_>>(),
                "trials": trials,
            }))
        })
        .collect::<phisymdf::Result<Vec<_>>>()?;

    let single_items: Vec<&String> = dataset.schema.single_items.keys().collect();

    write_json(
        None,
        serde_json::json!({
            "collections": collections,
            "single_items": single_items,
        }),
    )
}

fn cmd_reduce(
    input: &Path,
    axis: usize,
    threads: Option<usize>,
    config: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(threads) = threads {
        config.num_threads = threads;
    }

    let dataset = load_dataset(input)?;
    let reduced = reduce_dataset(&dataset, axis, &config).context("reduction failed")?;
    tracing::info!(axis, "reduction complete");

    write_json(output, serde_json::to_value(&reduced)?)
}

fn load_dataset(input: &Path) -> Result<PhiSymDataset> {
    tracing::info!(path = %input.display(), "loading dataset");
    let dataset = PhiSymDataset::open(input).with_context(|| format!("failed to load {}", input.display()))?;
    tracing::info!(collections = dataset.schema.collections.len(), "dataset loaded");
    Ok(dataset)
}

fn load_config(path: Option<&PathBuf>) -> Result<ReductionConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(ReductionConfig::default()),
    }
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
