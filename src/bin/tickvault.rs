//! tickvault admin binary
//!
//! Inspects and maintains a database directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tickvault::store::Store;
use tickvault::wal::WalRecovery;
use tickvault::{Engine, EngineOptions, SeriesId, TransactionMode};

/// tickvault admin tool
#[derive(Parser, Debug)]
#[command(name = "tickvault")]
#[command(about = "Inspect and maintain a tickvault database")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./tickvault_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print store statistics
    Stats,

    /// List every series with its point count
    Series,

    /// Print the points of one series
    Dump {
        /// Series id (UUID)
        series: SeriesId,

        /// Print at most this many points
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check the write-ahead log without modifying it
    VerifyWal,

    /// Merge all SSTables into one
    Compact,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tickvault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("tickvault v{}", tickvault::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir.display());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_storage_failure() => {
            tracing::error!("Storage failure: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> tickvault::Result<()> {
    // Must run before the engine opens: opening replays and truncates the WAL
    if let Commands::VerifyWal = args.command {
        return verify_wal(&args.data_dir);
    }

    let engine: Engine = Engine::open(EngineOptions::new(&args.data_dir).create(false))?;

    match args.command {
        Commands::Stats => println!("{}", engine.stats()),
        Commands::Series => {
            let tx = engine.begin_transaction(TransactionMode::ReadOnly)?;
            let ids = tx.timeseries_ids()?;
            for id in &ids {
                let cursor = tx.open_timeseries(*id)?;
                println!("{}  {} points", id, cursor.len()?);
            }
            println!("{} series", ids.len());
        }
        Commands::Dump { series, limit } => {
            let tx = engine.begin_transaction(TransactionMode::ReadOnly)?;
            let mut cursor = tx.open_timeseries(series)?;
            cursor.dump()?;

            let limit = limit.unwrap_or(usize::MAX);
            let mut printed = 0;
            while printed < limit && cursor.move_next()? {
                let point = cursor.current()?;
                println!("{}\t{:#x}\t{}", point.timestamp, point.flags, point.value);
                printed += 1;
            }
        }
        Commands::Compact => {
            engine.compact()?;
            println!("{}", engine.stats());
        }
        Commands::VerifyWal => {}
    }

    engine.close()
}

fn verify_wal(data_dir: &std::path::Path) -> tickvault::Result<()> {
    let wal_path = data_dir.join(Store::WAL_FILENAME);
    if !wal_path.exists() {
        println!("No WAL at {}", wal_path.display());
        return Ok(());
    }

    let result = WalRecovery::verify(&wal_path)?;
    println!(
        "entries_recovered={} entries_corrupted={} last_lsn={} needs_truncation={}",
        result.entries_recovered, result.entries_corrupted, result.last_lsn, result.was_truncated
    );
    Ok(())
}
