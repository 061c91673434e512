//! nubz CLI - operator tool for a guide's local data directory.
//!
//! This tool inspects the durable store, the report snapshots and the
//! cached catalog, imports map descriptors and runs report recovery.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{NubzConfig, CONFIG_FILE};
use nubz_catalog::{ExhibitsData, MapData};
use nubz_common::{Floor, ReportId, VersionItem};
use nubz_report::{snapshot, ReadyReports};
use nubz_storage::{create_default_registry, DurableStore};
use nubz_sync::{translate_maps, NewMapImagesResponse};

#[derive(Parser)]
#[command(name = "nubz")]
#[command(about = "nubz - museum guide data directory tool")]
#[command(version)]
struct Cli {
    /// Data directory (default: the platform data directory).
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the directories.
    Init,

    /// Show cached versions, map files and report counts.
    Status,

    /// List report records.
    Reports,

    /// Print a report snapshot.
    Report {
        /// Local report id.
        id: u32,
    },

    /// List cached exhibits.
    Exhibits {
        /// Only exhibits placed on this floor.
        #[arg(short, long)]
        floor: Option<u8>,
    },

    /// Apply a JSON map descriptor as a map update.
    ImportMap {
        /// File holding a map images response.
        file: PathBuf,
    },

    /// Finalize interrupted reports and print the upload queue.
    Recover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("No platform data directory, pass --data-dir")?
            .join("nubz"),
    };

    match cli.command {
        Commands::Init => cmd_init(&data_dir).await,
        Commands::Status => cmd_status(&data_dir).await,
        Commands::Reports => cmd_reports(&data_dir).await,
        Commands::Report { id } => cmd_report(&data_dir, ReportId::new(id)).await,
        Commands::Exhibits { floor } => cmd_exhibits(&data_dir, floor).await,
        Commands::ImportMap { file } => cmd_import_map(&data_dir, &file).await,
        Commands::Recover => cmd_recover(&data_dir).await,
    }
}

/// Load the configuration and open the store it names.
async fn open(data_dir: &Path) -> Result<(NubzConfig, Arc<DurableStore>)> {
    let config = NubzConfig::load(data_dir).await?;
    let store = create_default_registry()
        .open_store(&config.store)
        .await
        .context("Failed to open store")?;
    Ok((config, Arc::new(store)))
}

async fn cmd_init(data_dir: &Path) -> Result<()> {
    info!("Initializing data directory: {}", data_dir.display());

    let config = NubzConfig::default_for(data_dir);
    tokio::fs::create_dir_all(&config.report.reports_dir)
        .await
        .context("Failed to create reports directory")?;
    tokio::fs::create_dir_all(&config.maps_dir)
        .await
        .context("Failed to create maps directory")?;

    if tokio::fs::try_exists(data_dir.join(CONFIG_FILE)).await? {
        println!("Configuration already present, left untouched.");
    } else {
        config.save(data_dir).await?;
        println!("Configuration written to {}", data_dir.join(CONFIG_FILE).display());
    }
    Ok(())
}

async fn cmd_status(data_dir: &Path) -> Result<()> {
    let (_, store) = open(data_dir).await?;

    println!("Store backend: {}", store.backend_name());
    println!("Versions:");
    for item in [VersionItem::Map, VersionItem::Exhibits, VersionItem::Reports] {
        match store.get_version(item).await? {
            Some(version) => println!("  {}: {}", item, version),
            None => println!("  {}: none", item),
        }
    }

    println!("Map files:");
    for floor in Floor::all() {
        match store.get_map_file(floor).await? {
            Some(path) => println!("  {}: {}", floor, path.display()),
            None => println!("  {}: none", floor),
        }
    }

    let mut counts = BTreeMap::new();
    for record in store.all_reports().await? {
        *counts.entry(record.state).or_insert(0usize) += 1;
    }
    println!("Reports:");
    if counts.is_empty() {
        println!("  none");
    }
    for (state, count) in counts {
        println!("  {}: {}", state, count);
    }
    Ok(())
}

async fn cmd_reports(data_dir: &Path) -> Result<()> {
    let (_, store) = open(data_dir).await?;
    let records = store.all_reports().await?;

    if records.is_empty() {
        println!("No reports.");
        return Ok(());
    }
    for record in records {
        let server_id = record
            .server_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>5}  {:<14} server={:<6} {}",
            record.id,
            record.state,
            server_id,
            record.file.display()
        );
    }
    Ok(())
}

async fn cmd_report(data_dir: &Path, id: ReportId) -> Result<()> {
    let (_, store) = open(data_dir).await?;
    let record = store
        .get_report_record(id)
        .await?
        .with_context(|| format!("No report {}", id))?;

    let report = snapshot::load(&record.file)
        .await
        .with_context(|| format!("Failed to read snapshot {}", record.file.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_exhibits(data_dir: &Path, floor: Option<u8>) -> Result<()> {
    let (_, store) = open(data_dir).await?;
    let exhibits = ExhibitsData::new(store);
    exhibits.load_from_store().await?;

    let floors: Vec<Floor> = match floor {
        Some(number) => vec![Floor::new(number)?],
        None => Floor::all().collect(),
    };
    match exhibits.version().await {
        Some(version) => println!("Exhibits version {}", version),
        None => println!("No exhibits cached."),
    }
    for floor in floors {
        println!("Floor {}:", floor);
        for exhibit in exhibits.exhibits_of_floor(floor).await {
            println!("  {:>5}  {}", exhibit.id, exhibit.name);
        }
    }
    Ok(())
}

async fn cmd_import_map(data_dir: &Path, file: &Path) -> Result<()> {
    info!("Importing map descriptor: {}", file.display());

    let content = tokio::fs::read(file)
        .await
        .context("Failed to read map descriptor")?;
    let response: NewMapImagesResponse =
        serde_json::from_slice(&content).context("Invalid map descriptor")?;
    let floors = translate_maps(&response).context("Map descriptor rejected")?;

    let (config, store) = open(data_dir).await?;
    let maps = MapData::new(store, config.maps_dir);
    maps.load_from_store().await?;

    if maps.set_maps(response.version, floors).await? {
        println!("Maps updated to version {}", response.version);
    } else {
        println!(
            "Cached maps are already at version {} or newer, nothing imported.",
            response.version
        );
    }
    Ok(())
}

async fn cmd_recover(data_dir: &Path) -> Result<()> {
    let (_, store) = open(data_dir).await?;
    let ready = ReadyReports::load(store)
        .await
        .context("Report recovery failed")?;

    let pending = ready.all_ready().await;
    if pending.is_empty() {
        println!("No reports waiting for upload.");
    }
    for entry in pending {
        println!(
            "  {:>5}  events={:<4} server={}",
            entry.report.id(),
            entry.report.history().len(),
            entry
                .server_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}
