use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use seowatch::cli::{Cli, Commands};
use seowatch::config::Config;
use seowatch::export;
use seowatch::extract::SignalExtractor;
use seowatch::logging;
use seowatch::network::{FetchError, HttpClient};
use seowatch::robots::RobotsChecker;
use seowatch::scheduler::{SchedulerState, Watcher, WatcherConfig};
use seowatch::store::{ObservationStore, StoreError};
use seowatch::targets;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Fetch(#[from] FetchError),

    #[error("export error: {0}")]
    Export(#[from] export::ExportError),

    #[error("{0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            links,
            pages,
            db,
            interval,
            workers,
            timeout,
            user_agent,
            strict,
            log_dir,
        } => {
            let _log_guard =
                logging::init_logging(&log_dir).map_err(|e| MainError::Logging(e.to_string()))?;
            run_watch(
                links, pages, db, interval, workers, timeout, user_agent, strict,
            )
            .await
        }
        Commands::Export {
            db,
            observations,
            differences,
            keep_latest,
            clear_differences,
        } => run_export(db, observations, differences, keep_latest, clear_differences),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_watch(
    links: Option<PathBuf>,
    pages: Option<PathBuf>,
    db: PathBuf,
    interval: u64,
    workers: usize,
    timeout: u64,
    user_agent: String,
    strict: bool,
) -> Result<(), MainError> {
    let link_pairs = match &links {
        Some(path) => targets::read_links_csv(path)?,
        None => Vec::new(),
    };
    let page_urls = match &pages {
        Some(path) => targets::read_pages_file(path)?,
        None => Vec::new(),
    };

    let target_list = targets::build_targets(link_pairs, page_urls, strict);
    if target_list.is_empty() {
        return Err(MainError::Config(
            "no valid links or pages to check".to_string(),
        ));
    }

    // Startup failures here are the only fatal ones; per-target errors
    // during ticks are logged and skipped.
    let store = Arc::new(ObservationStore::open(&db)?);
    tracing::info!(db = %db.display(), targets = target_list.len(), "store opened");

    let http = Arc::new(HttpClient::new(user_agent.clone(), timeout)?);
    let robots = RobotsChecker::new(Arc::clone(&http), user_agent);
    let extractor = Arc::new(SignalExtractor::new(http, robots));

    let watcher = Watcher::new(
        WatcherConfig {
            interval_mins: interval.max(Config::MIN_INTERVAL_MINS),
            max_workers: workers,
        },
        store,
        extractor,
    );
    let state = SchedulerState::new(target_list);

    tokio::select! {
        _ = watcher.run(state) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    Ok(())
}

fn run_export(
    db: PathBuf,
    observations: Option<PathBuf>,
    differences: Option<PathBuf>,
    keep_latest: bool,
    clear_differences: bool,
) -> Result<(), MainError> {
    let store = ObservationStore::open(&db)?;

    if observations.is_none() && differences.is_none() && !keep_latest && !clear_differences {
        eprintln!("Nothing to do: pass --observations, --differences, --keep-latest or --clear-differences");
        return Ok(());
    }

    if let Some(path) = observations {
        let rows = export::export_observations_csv(&store, &path)?;
        println!("Exported {} observation(s) to {}", rows, path.display());
    }

    if let Some(path) = differences {
        let rows = export::export_differences_csv(&store, &path)?;
        println!("Exported {} difference(s) to {}", rows, path.display());
    }

    if keep_latest {
        let deleted = store.keep_latest_only()?;
        println!("Pruned {} older observation(s)", deleted);
    }

    if clear_differences {
        let deleted = store.clear_differences()?;
        println!("Cleared {} difference record(s)", deleted);
    }

    Ok(())
}
