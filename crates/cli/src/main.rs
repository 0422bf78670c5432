//! `exportdw`: run the export warehouse pipeline and print its reports.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exportdw_core::{Config, Period};
use exportdw_warehouse::{
    BatchOutcome, LoadStats, MergeStats, Pipeline, RankedTotal, StagingReport, Warehouse,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "exportdw", about = "Stage, merge and load monthly export batches into a star schema.")]
struct Cli {
    /// JSON configuration file. Built-in defaults when omitted.
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage, merge and load.
    Run,
    /// Normalize every configured raw batch into its staging extract.
    Stage,
    /// Merge staging extracts into the core dataset.
    Merge,
    /// Rebuild the star schema from the core dataset.
    Load,
    /// Print the standard aggregate reports.
    Report {
        /// Period for the company ranking (YYYY-MM). Latest loaded when omitted.
        #[arg(long)]
        period: Option<Period>,
        /// First period of the destination range. Earliest loaded when omitted.
        #[arg(long)]
        from: Option<Period>,
        /// Last period of the destination range. Latest loaded when omitted.
        #[arg(long)]
        to: Option<Period>,
        /// Rows per ranking.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;

    match cli.command {
        Command::Run => {
            let report = pipeline.run()?;
            print_staging(&report.staging);
            print_merge(&report.merge);
            print_load(&report.load);
        }
        Command::Stage => print_staging(&pipeline.stage()?),
        Command::Merge => print_merge(&pipeline.merge()?),
        Command::Load => print_load(&pipeline.load()?),
        Command::Report {
            period,
            from,
            to,
            limit,
        } => {
            let warehouse = pipeline.warehouse()?;
            print_report(&warehouse, period, from, to, limit)?;
        }
    }

    info!("done");
    Ok(())
}

fn print_staging(report: &StagingReport) {
    println!("staging");
    for batch in &report.batches {
        match batch {
            BatchOutcome::Staged { period, path, stats } => {
                println!(
                    "  {period}  read {:>7}  kept {:>7}  rejected {:>6}  blank {:>4}  unparseable {:>5}  -> {}",
                    stats.rows_read,
                    stats.rows_normalized,
                    stats.rows_rejected,
                    stats.blank_rows,
                    stats.unparseable_values,
                    path.display()
                );
                if !stats.dropped_columns.is_empty() {
                    println!("           dropped columns: {}", stats.dropped_columns.join(", "));
                }
            }
            BatchOutcome::Skipped { period, raw_path } => {
                println!("  {period}  skipped, {} not found", raw_path.display());
            }
        }
    }
    let totals = report.totals();
    println!(
        "  total    read {:>7}  kept {:>7}  rejected {:>6}",
        totals.rows_read, totals.rows_normalized, totals.rows_rejected
    );
}

fn print_merge(stats: &MergeStats) {
    println!("merge");
    println!(
        "  batches {}  input {}  excluded {}  duplicates {}  core {}",
        stats.batches, stats.input_rows, stats.excluded, stats.duplicates, stats.core_rows
    );
}

fn print_load(stats: &LoadStats) {
    println!("load");
    println!(
        "  companies {}  countries {}  products {}  periods {}  facts {}",
        stats.companies, stats.countries, stats.products, stats.periods, stats.facts
    );
}

fn print_ranking(title: &str, rows: &[RankedTotal]) {
    println!("{title}");
    if rows.is_empty() {
        println!("  (none)");
    }
    for (i, row) in rows.iter().enumerate() {
        println!("  {:>2}. {:<48} {:>20.2}", i + 1, row.label, row.total);
    }
}

fn print_report(
    warehouse: &Warehouse,
    period: Option<Period>,
    from: Option<Period>,
    to: Option<Period>,
    limit: usize,
) -> Result<()> {
    let counts = warehouse.table_counts()?;
    println!(
        "model: {} facts, {} companies, {} countries, {} products, {} periods, {} orphaned",
        counts.facts,
        counts.companies,
        counts.countries,
        counts.products,
        counts.periods,
        warehouse.orphaned_facts()?
    );

    let ranked_period = match period {
        Some(p) => Some(p),
        None => warehouse.latest_period()?,
    };
    let label = ranked_period.map_or_else(|| "-".to_string(), |p| p.to_string());
    print_ranking(
        &format!("top companies by FOB USD, {label}"),
        &warehouse.top_companies(ranked_period, limit)?,
    );

    let totals = warehouse.totals_by_period()?;
    println!("FOB USD by period");
    for t in &totals {
        println!("  {}  {:>20.2}  ({} facts)", t.period, t.total_fob_usd, t.facts);
    }

    let first = totals.first().map(|t| t.period);
    let last = totals.last().map(|t| t.period);
    if let (Some(from), Some(to)) = (from.or(first), to.or(last)) {
        print_ranking(
            &format!("top destinations by FOB USD, {from} to {to}"),
            &warehouse.top_destinations(from, to, limit)?,
        );
    }

    print_ranking("top products by FOB USD", &warehouse.top_products(limit)?);
    print_ranking(
        "top destinations by net weight (kg)",
        &warehouse.top_destinations_by_weight(limit)?,
    );
    Ok(())
}
