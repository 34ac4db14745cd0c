//! `tally`: batch jobs for the vote warehouse.
//!
//! # Usage
//!
//! ```text
//! tally ingest uncommitted/votes.jsonl
//! tally outliers
//! tally --config tally.toml outliers
//! ```
//!
//! A rejected batch (a record failing validation) is reported and the process
//! still exits successfully; the table is left as it was.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use settings::Settings;
use tally_core::{VOTE_COLUMNS, VoteStore as _, build_outlier_view, ensure_schema, ingest};
use tally_store_sqlite::SqliteWarehouse;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Vote warehouse batch jobs")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tally.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load a newline-delimited JSON file of votes and deduplicate the table.
  Ingest {
    /// The `.jsonl` file to load.
    path: PathBuf,
  },
  /// (Re)build the outlier-weeks view and print its rows.
  Outliers,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let result = match cli.command {
    Command::Ingest { path } => run_ingest(&settings, path),
    Command::Outliers => run_outliers(&settings),
  };
  if let Err(e) = &result {
    tracing::error!("{e:#}");
  }
  result
}

fn open(settings: &Settings) -> anyhow::Result<SqliteWarehouse> {
  SqliteWarehouse::open(&settings.database_path)
    .with_context(|| format!("failed to open warehouse at {:?}", settings.database_path))
}

fn run_ingest(settings: &Settings, path: PathBuf) -> anyhow::Result<()> {
  if !path.exists() {
    anyhow::bail!(
      "input file {} not found; download the dataset before ingesting",
      path.display()
    );
  }

  let table = settings.votes_table()?;
  let mut warehouse = open(settings)?;

  ensure_schema(&mut warehouse, &table, &VOTE_COLUMNS)
    .with_context(|| format!("failed to prepare table {table}"))?;
  tracing::info!(%table, "schema and table ready");

  match ingest(&mut warehouse, &table, &path) {
    Ok(summary) => {
      println!(
        "loaded {}: {} rows read, {} new, {} total",
        summary.source.display(),
        summary.rows_read,
        summary.rows_added(),
        summary.rows_after
      );
      Ok(())
    }
    Err(e) if e.is_rejection() => {
      tracing::warn!(source = %path.display(), "{e}");
      eprintln!("batch {} rejected, nothing loaded: {e}", path.display());
      Ok(())
    }
    Err(e) => Err(e).with_context(|| format!("failed to ingest {}", path.display())),
  }
}

fn run_outliers(settings: &Settings) -> anyhow::Result<()> {
  let table = settings.votes_table()?;
  let mut warehouse = open(settings)?;

  let view = build_outlier_view(&mut warehouse, &table, &settings.view)
    .with_context(|| format!("failed to build view {}", settings.view))?;

  let weeks = warehouse
    .outlier_weeks(&view)
    .with_context(|| format!("failed to read view {view}"))?;

  println!("{:>4}  {:>4}  {:>6}", "year", "week", "votes");
  for w in &weeks {
    println!("{:>4}  {:>4}  {:>6}", w.year_number, w.week_number, w.week_vote_count);
  }
  tracing::info!(%view, outliers = weeks.len(), "view creation successful");
  Ok(())
}
