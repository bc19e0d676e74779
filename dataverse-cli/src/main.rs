//! Dataverse CLI.
//!
//! Commands:
//! - `extract <source>` — fetch one source into a bronze snapshot
//! - `promote <source>` — latest bronze to silver and gold
//! - `cycle` — extract and promote every enabled source once
//! - `daemon` — repeat the cycle on the configured schedule
//! - `runs` — print the run audit log
//! - `snapshots` — list published snapshots

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dataverse_core::domain::{Source, Tier};
use dataverse_core::storage::SnapshotReader;
use dataverse_runner::{Pipeline, PipelineConfig, RunLogger, RunRecord};

#[derive(Parser)]
#[command(name = "dataverse", about = "Market data pipeline: bronze, silver and gold snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one source (crypto, stock, forex) into a bronze snapshot.
    Extract { source: Source },
    /// Promote the latest bronze snapshot of a source to silver and gold.
    Promote { source: Source },
    /// Extract and promote every enabled source once.
    Cycle,
    /// Run the cycle repeatedly on the configured schedule.
    Daemon {
        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// Print recorded runs, newest first.
    Runs {
        #[arg(long)]
        source: Option<Source>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Print raw JSON records instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List published snapshots.
    Snapshots {
        #[arg(long, default_value = "bronze")]
        tier: Tier,

        /// Defaults to every source.
        #[arg(long)]
        source: Option<Source>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(storage_root = %config.storage_root.display(), "configuration loaded");

    match cli.command {
        Commands::Extract { source } => {
            let record = pipeline(config)?.run_extraction(source);
            print_record(&record);
            exit_on_failure([&record])
        }
        Commands::Promote { source } => {
            let outcome = pipeline(config)?.run_promotion(source);
            outcome.records().for_each(print_record);
            exit_on_failure(outcome.records())
        }
        Commands::Cycle => {
            let summary = pipeline(config)?.run_cycle();
            summary
                .outcomes
                .iter()
                .flat_map(|o| o.records())
                .for_each(print_record);
            println!("Succeeded: {}  Failed: {}", summary.succeeded, summary.failed);
            if !summary.all_succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Daemon { max_cycles } => {
            let cycles = pipeline(config)?.run_daemon(max_cycles);
            println!("Ran {cycles} cycle(s).");
            Ok(())
        }
        Commands::Runs {
            source,
            limit,
            json,
        } => print_runs(&RunLogger::new(&config.log_dir), source, limit, json),
        Commands::Snapshots { tier, source } => {
            print_snapshots(&SnapshotReader::new(&config.storage_root), tier, source)
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dataverse_core={level},dataverse_runner={level},dataverse={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn pipeline(config: PipelineConfig) -> Result<Pipeline> {
    Pipeline::new(config).context("building pipeline")
}

fn exit_on_failure<'a>(records: impl IntoIterator<Item = &'a RunRecord>) -> Result<()> {
    if records.into_iter().any(|r| !r.is_success()) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_record(record: &RunRecord) {
    let stage = format!("{}/{}", record.stage, record.source);
    if record.is_success() {
        let path = record
            .snapshot_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let dropped = if record.partial {
            format!(" ({} dropped)", record.dropped_records)
        } else {
            String::new()
        };
        println!("OK    {stage:<14} {:>6} rows  {path}{dropped}", record.rows_written);
    } else {
        println!(
            "FAIL  {stage:<14} {}",
            record.error_detail.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_runs(logger: &RunLogger, source: Option<Source>, limit: usize, json: bool) -> Result<()> {
    let records = logger
        .recent(source, limit)
        .with_context(|| format!("reading run log in {}", logger.dir().display()))?;

    if json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }
    if records.is_empty() {
        println!("No runs recorded in {}", logger.dir().display());
        return Ok(());
    }

    println!(
        "{:<20} {:<17} {:<7} {:<8} {:<8} {:>6} {:>9}",
        "Finished", "Run", "Source", "Stage", "Status", "Rows", "Duration"
    );
    println!("{}", "-".repeat(81));
    for r in &records {
        let status = if r.is_success() { "ok" } else { "failed" };
        println!(
            "{:<20} {:<17} {:<7} {:<8} {:<8} {:>6} {:>8.2}s",
            r.finished_at.format("%Y-%m-%d %H:%M:%S"),
            r.run_id,
            r.source,
            r.stage,
            status,
            r.rows_written,
            r.duration_ms as f64 / 1000.0
        );
        if let Some(detail) = &r.error_detail {
            println!("    {detail}");
        }
    }
    Ok(())
}

fn print_snapshots(reader: &SnapshotReader, tier: Tier, source: Option<Source>) -> Result<()> {
    let sources = source.map_or_else(|| Source::ALL.to_vec(), |s| vec![s]);
    let mut total = 0;

    for source in sources {
        let entries = reader
            .list(tier, source)
            .with_context(|| format!("listing {tier}/{source}"))?;
        for entry in &entries {
            let size = std::fs::metadata(&entry.path).map(|m| m.len()).unwrap_or(0);
            println!(
                "{:<7} {:<24} {:>10}  {}",
                source,
                entry.taken_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                format_size(size),
                entry.path.display()
            );
        }
        total += entries.len();
    }

    if total == 0 {
        println!("No {tier} snapshots under {}", reader.root().display());
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
