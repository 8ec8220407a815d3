//! Operator command surface for a payment database.
//!
//! Every command prints JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use paymentdb_core::{PaymentHash, PaymentStatus};
use paymentdb_store_sqlite::{
    DbConfig, DbError, DumpEntry, MigrationReport, MigrationSet, PaymentDb,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "paydb")]
#[command(about = "Payment database maintenance CLI")]
pub struct Cli {
    #[arg(long, default_value = "./payments.sqlite3")]
    db: PathBuf,

    /// TOML file with database settings.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations.
    Migrate(MigrateArgs),
    /// Report the stored and the latest known schema version.
    Version,
    Payments {
        #[command(subcommand)]
        command: PaymentsCommand,
    },
    /// Print every bucket, key and value, hex encoded.
    Dump,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Run the migrations and roll them back.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum PaymentsCommand {
    List,
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long)]
    hash: String,
}

#[derive(Debug, Serialize)]
struct MigrateOutput {
    dry_run: bool,
    #[serde(flatten)]
    report: MigrationReport,
}

#[derive(Debug, Serialize)]
struct VersionOutput {
    db_version: Option<u32>,
    latest_version: u32,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    payment_hash: PaymentHash,
    status: PaymentStatus,
}

/// Executes a parsed command line.
///
/// # Errors
/// Returns an error when the configuration cannot be loaded, the database
/// cannot be opened or upgraded, or the command itself fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Migrate(args) => {
            let config = DbConfig {
                dry_run_migrations: config.dry_run_migrations || args.dry_run,
                ..config
            };
            let dry_run = config.dry_run_migrations;
            let db = connect(&cli.db, config)?;
            let report = match db.upgrade(&MigrationSet::latest()) {
                Ok(report) => report,
                Err(DbError::DryRunMigration(report)) => report,
                Err(err) => return Err(err).context("migration failed"),
            };
            info!(
                from_version = report.from_version,
                to_version = report.to_version,
                dry_run,
                "migrate finished"
            );
            print_json(&MigrateOutput { dry_run, report })
        }
        Command::Version => {
            let db = connect(&cli.db, config)?;
            let db_version = match db.current_version() {
                Ok(version) => Some(version),
                Err(DbError::MetaNotFound) => None,
                Err(err) => return Err(err).context("failed to read schema version"),
            };
            print_json(&VersionOutput {
                db_version,
                latest_version: MigrationSet::latest().latest_version(),
            })
        }
        Command::Payments { command } => {
            let db = PaymentDb::open(&cli.db, config)
                .with_context(|| format!("failed to open {}", cli.db.display()))?;
            match command {
                PaymentsCommand::List => print_json(&db.fetch_payments()?),
                PaymentsCommand::Status(args) => {
                    let payment_hash: PaymentHash = args
                        .hash
                        .parse()
                        .with_context(|| format!("invalid payment hash: {}", args.hash))?;
                    let status = db.fetch_payment_status(&payment_hash)?;
                    print_json(&StatusOutput {
                        payment_hash,
                        status,
                    })
                }
            }
        }
        Command::Dump => {
            let db = connect(&cli.db, config)?;
            let entries = db.view(|tx| tx.dump())?;
            print_json(&entries.iter().map(dump_entry_json).collect::<Vec<_>>())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DbConfig> {
    match path {
        Some(path) => DbConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(DbConfig::default()),
    }
}

fn connect(path: &Path, config: DbConfig) -> Result<PaymentDb> {
    PaymentDb::connect(path, config).with_context(|| format!("failed to open {}", path.display()))
}

fn hex_path(path: &[Vec<u8>]) -> Vec<String> {
    path.iter().map(hex::encode).collect()
}

fn dump_entry_json(entry: &DumpEntry) -> Value {
    match entry {
        DumpEntry::Bucket { path: bucket, sequence } => json!({
            "bucket": hex_path(bucket),
            "sequence": sequence,
        }),
        DumpEntry::Value {
            path: bucket,
            key,
            value,
        } => json!({
            "bucket": hex_path(bucket),
            "key": hex::encode(key),
            "value": hex::encode(value),
        }),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
