mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use dropshelf_core::format::{AUTO_CONVERT_MOBI, AUTO_CONVERT_TXT};
use dropshelf_core::storage::ImportStatus;
use dropshelf_core::{
    import_existing, AppConfig, DetectedFile, ImportEngine, ImportOrchestrator, SqliteCatalog,
};
use progress::CliReporter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match dropshelf_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let outcome = match args.command {
        Some(Commands::Watch) => run_watch(config).await,
        Some(Commands::Import { path }) => run_import(&config, &path).await,
        Some(Commands::ScanOnce) => run_scan_once(&config).await,
        Some(Commands::History { limit, json }) => show_history(&config, limit, json),
        Some(Commands::SetFlag { key, value }) => set_flag(&config, &key, value),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = &outcome {
        error!("Error: {:#}", err);
    }
    outcome
}

fn open_catalog(config: &AppConfig) -> Result<Arc<SqliteCatalog>> {
    let catalog = SqliteCatalog::open(&config.catalog.db_path)
        .with_context(|| format!("opening catalog {}", config.catalog.db_path))?;
    Ok(Arc::new(catalog))
}

fn build_orchestrator(config: &AppConfig, catalog: Arc<SqliteCatalog>) -> ImportOrchestrator {
    ImportOrchestrator::new(config, catalog.clone(), catalog)
        .with_reporter(Arc::new(CliReporter::new()))
}

async fn run_watch(config: AppConfig) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let orchestrator = Arc::new(build_orchestrator(&config, catalog));

    let engine = ImportEngine::spawn(config, orchestrator);
    engine.start().await?;
    info!(
        "Watching {} every {}ms (Ctrl-C to stop)",
        engine.config().watch.dir.display().to_string().cyan(),
        engine.config().watch.poll_interval_ms
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    let status = engine.status().await?;
    info!(
        "Stopping: {} in registry ({} failed), {} settling",
        status.processed_count.to_string().yellow(),
        status.failed_count.to_string().red(),
        status.pending_count
    );
    engine.shutdown().await;
    Ok(())
}

async fn run_import(config: &AppConfig, path: &Path) -> Result<()> {
    let file = DetectedFile::from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let catalog = open_catalog(config)?;
    let orchestrator = build_orchestrator(config, catalog);

    let result = orchestrator.import(&file).await;
    if !result.success {
        bail!(result.error.unwrap_or_else(|| "import failed".to_string()));
    }
    if let Some(id) = &result.book_id {
        info!("Book id: {}", id.green());
    }
    Ok(())
}

async fn run_scan_once(config: &AppConfig) -> Result<()> {
    let catalog = open_catalog(config)?;
    let orchestrator = build_orchestrator(config, catalog);

    let outcomes = import_existing(config, &orchestrator).await?;
    let imported = outcomes
        .iter()
        .filter(|(_, r)| r.success && !r.is_duplicate)
        .count();
    let duplicates = outcomes.iter().filter(|(_, r)| r.is_duplicate).count();
    let failed = outcomes.iter().filter(|(_, r)| !r.success).count();

    println!();
    info!(
        "{} imported, {} duplicates, {} failed",
        imported.to_string().green(),
        duplicates.to_string().yellow(),
        failed.to_string().red(),
    );
    Ok(())
}

fn show_history(config: &AppConfig, limit: i64, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let rows = catalog.recent_history(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No imports recorded yet");
        return Ok(());
    }

    for row in rows {
        let status = match row.status {
            ImportStatus::Success => row.status.to_string().green(),
            ImportStatus::Skipped => row.status.to_string().yellow(),
            ImportStatus::Error => row.status.to_string().red(),
        };
        println!(
            "{}  {:<8} {}  {}",
            row.created_at.dimmed(),
            status,
            row.file_name,
            row.message
        );
    }
    Ok(())
}

fn set_flag(config: &AppConfig, key: &str, value: bool) -> Result<()> {
    if key != AUTO_CONVERT_TXT && key != AUTO_CONVERT_MOBI {
        bail!(
            "unknown flag '{}', expected {} or {}",
            key,
            AUTO_CONVERT_TXT,
            AUTO_CONVERT_MOBI
        );
    }
    let catalog = open_catalog(config)?;
    catalog.set_flag(key, value)?;
    println!("{} = {}", key, value.to_string().cyan());
    Ok(())
}
