//! `txgraph` - print metrics for a transaction database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use txgraph::load_database;

#[derive(Parser)]
#[command(name = "txgraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transaction DAG metrics", long_about = None)]
struct Cli {
    /// Database file
    file: PathBuf,

    /// Also print every transaction
    #[arg(short, long)]
    verbose: bool,

    /// Print metrics as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let graph = load_database(&cli.file)
        .with_context(|| format!("Failed to load database {}", cli.file.display()))?;
    info!(
        transactions = graph.transaction_count(),
        "Computing metrics"
    );
    let metrics = graph.metrics();

    if cli.verbose {
        print!("{}", graph);
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print!("{}", metrics);
    }
    Ok(())
}
