use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proofdesk_core::docx::{extract_items, is_docx_file_name};
use chrono::{DateTime, Duration, Utc};
use proofdesk_core::{
    Clock, ExportFormat, IngestOptions, ProductRecord, ReviewStatus, SystemClock,
    DEFAULT_LOCK_TTL_MINUTES,
};
use proofdesk_server::{RecordFilter, RecordStore, SqliteRepository};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Proofdesk: offline maintenance of the product review database
#[derive(Parser, Debug)]
#[command(name = "proofdesk")]
#[command(about = "Import, list and export product review records", long_about = None)]
struct Cli {
    /// Path of the SQLite review database
    #[arg(long, global = true, env = "PROOFDESK_DB", default_value = "proofdesk.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest the product sections of a DOCX catalogue
    Import(ImportArgs),
    /// List records, optionally filtered
    List(ListArgs),
    /// Write approved records as a shop import file
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// DOCX document to ingest
    file: PathBuf,

    /// Identity recorded as the last editor of ingested records
    #[arg(long, default_value = "cli@local")]
    user: String,

    /// Also clear any editorial locks on re-ingested records
    #[arg(long)]
    clear_locks: bool,
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Only show records in this review status
    #[arg(long, value_parser = ["pending", "in_review", "approved", "rejected"])]
    status: Option<String>,

    /// Case-insensitive substring of the article number or name
    #[arg(long)]
    query: Option<String>,

    /// Minutes after which a lock is shown as expired
    #[arg(
        long,
        env = "LOCK_TTL_MINUTES",
        default_value_t = DEFAULT_LOCK_TTL_MINUTES,
        value_parser = clap::value_parser!(i64).range(1..=1_000_000_000)
    )]
    lock_ttl_minutes: i64,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Output format
    #[arg(long, default_value = "csv", value_parser = ["csv", "xlsx"])]
    format: String,

    /// Output file (defaults to shop_export.<format>)
    #[arg(long)]
    output: Option<PathBuf>,
}

async fn import(store: &RecordStore, args: ImportArgs) -> Result<()> {
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !is_docx_file_name(&file_name) {
        anyhow::bail!("{} is not a .docx file", args.file.display());
    }

    let bytes =
        fs::read(&args.file).with_context(|| format!("Failed to read {}", args.file.display()))?;
    let items = extract_items(&bytes)
        .with_context(|| format!("Failed to extract products from {}", args.file.display()))?;

    let options = IngestOptions {
        clear_locks: args.clear_locks,
    };
    let summary = store
        .ingest(items, &args.user, SystemClock.now(), options)
        .await?;

    println!(
        "Imported {} products ({} new, {} updated)",
        summary.total(),
        summary.created,
        summary.updated
    );
    Ok(())
}

async fn list(store: &RecordStore, args: ListArgs) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(str::parse::<ReviewStatus>)
        .transpose()?;
    let filter = RecordFilter { status, text: None }.text(args.query.unwrap_or_default());

    let ttl = Duration::try_minutes(args.lock_ttl_minutes).context("lock TTL is out of range")?;
    let now = SystemClock.now();

    let records = store.list(&filter).await?;
    for record in &records {
        println!(
            "{}\t{}\t{}\t{}",
            record.art_nr,
            record.review_status,
            lock_column(record, now, ttl),
            record.name
        );
    }
    info!("Listed {} records", records.len());
    Ok(())
}

/// Lock holder, marked when the lock may already be taken over.
fn lock_column(record: &ProductRecord, now: DateTime<Utc>, ttl: Duration) -> String {
    match record.lock_holder() {
        None => "-".to_string(),
        Some(holder) if record.is_locked(now, ttl) => holder.to_string(),
        Some(holder) => format!("{} (expired)", holder),
    }
}

async fn export(store: &RecordStore, args: ExportArgs) -> Result<()> {
    let format: ExportFormat = args.format.parse()?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format.file_name()));

    let rows = store.select_approved().await?;
    let bytes = format.encode(&rows)?;
    write_output(&output, &bytes)?;

    println!("Exported {} approved products to {}", rows.len(), output.display());
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let repository = SqliteRepository::new(&cli.db)
        .with_context(|| format!("Failed to open database {}", cli.db.display()))?;
    let store = RecordStore::new(Arc::new(repository));

    match cli.command {
        Commands::Import(args) => import(&store, args).await,
        Commands::List(args) => list(&store, args).await,
        Commands::Export(args) => export(&store, args).await,
    }
}
