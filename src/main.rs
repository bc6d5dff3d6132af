use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use parkcard::application::engine::CardEngine;
use parkcard::config::EngineArgs;
use parkcard::domain::ports::{ClockRef, PaymentGatewayRef, Stores};
use parkcard::infrastructure::clock::{ManualClock, SystemClock};
use parkcard::infrastructure::in_memory::InMemoryStore;
use parkcard::infrastructure::phonepe::PhonePeGateway;
use parkcard::interfaces::csv::card_writer::CardWriter;
use parkcard::interfaces::script::command_reader::CommandReader;
use parkcard::interfaces::script::runner::ScriptRunner;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replays a JSON-lines command script and prints one response per line.
    Replay {
        /// Script file, one command per line
        script: PathBuf,

        /// Print the card roster as CSV after the script has run
        #[arg(long)]
        roster: bool,

        /// Starting instant of the replay clock (RFC 3339). Defaults to now.
        #[arg(long)]
        start_at: Option<DateTime<Utc>>,
    },
    /// Prints every issued card as CSV.
    Roster,
    /// Runs the one-off data migrations and prints their report.
    Migrate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            use parkcard::infrastructure::rocksdb::RocksDBStore;
            let store = RocksDBStore::open(&path)?;
            info!(path = %path.display(), "opened persistent storage");
            Ok(Stores::from_backend(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Stores::from_backend(InMemoryStore::new()))
        }
        None => Ok(Stores::from_backend(InMemoryStore::new())),
    }
}

fn build_gateway(args: &EngineArgs) -> Result<Option<PaymentGatewayRef>> {
    if args.bypass_payments {
        return Ok(None);
    }
    match args.gateway_settings() {
        Ok(settings) => {
            let gateway: PaymentGatewayRef =
                Arc::new(PhonePeGateway::new(settings).into_diagnostic()?);
            Ok(Some(gateway))
        }
        Err(err) => {
            warn!(error = %err, "payment gateway is not configured");
            Ok(None)
        }
    }
}

async fn write_roster(engine: &CardEngine) -> Result<()> {
    let cards = engine.roster().await?;
    let stdout = io::stdout();
    CardWriter::new(stdout.lock()).write_cards(&cards)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = cli.engine.engine_config()?;
    let stores = open_stores(cli.db_path)?;
    let gateway = build_gateway(&cli.engine)?;

    match cli.command {
        Commands::Replay {
            script,
            roster,
            start_at,
        } => {
            let clock = Arc::new(ManualClock::new(start_at.unwrap_or_else(Utc::now)));
            let engine = CardEngine::new(stores, gateway, clock.clone() as ClockRef, &config);
            let mut runner = ScriptRunner::new(engine, clock);

            let file = File::open(&script).into_diagnostic()?;
            let reader = CommandReader::new(BufReader::new(file));
            let stdout = io::stdout();
            for (line_no, command) in reader.commands() {
                match command {
                    Ok(command) => {
                        let line = runner.run(command).await;
                        writeln!(stdout.lock(), "{line}").into_diagnostic()?;
                    }
                    Err(err) => {
                        error!(line = line_no, error = %err, "skipping unreadable command");
                    }
                }
            }

            info!(script = %script.display(), "replay finished");
            if roster {
                write_roster(runner.engine()).await?;
            }
        }
        Commands::Roster => {
            let engine = CardEngine::new(stores, gateway, Arc::new(SystemClock), &config);
            write_roster(&engine).await?;
        }
        Commands::Migrate => {
            let engine = CardEngine::new(stores, gateway, Arc::new(SystemClock), &config);
            let report = engine.run_maintenance().await?;
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
    }

    Ok(())
}
