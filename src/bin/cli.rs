//! planwatch CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use planwatch::{
    error::Result,
    models::Config,
    pipeline,
    services::HttpFetcher,
    storage::{LocalStorage, StateStore},
};

/// planwatch - Regional planning portal watcher
#[derive(Parser, Debug)]
#[command(
    name = "planwatch",
    version,
    about = "Watches planning portals and publishes changes as RSS feeds"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check all sites and publish feeds
    Run {
        /// Run a single pass instead of polling on the configured interval
        #[arg(long)]
        once: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show state and feed locations
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run { once } => {
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }

            let fetcher = HttpFetcher::new(&config.watcher)?;
            if once {
                let outcome = pipeline::run_once(&config, &fetcher).await?;
                if outcome.feeds.failed > 0 {
                    log::warn!("{} feeds could not be written", outcome.feeds.failed);
                }
            } else {
                pipeline::run_watch(&config, &fetcher).await?;
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let sites = config.active_sites();
            log::info!(
                "✓ Config OK ({} of {} site entries usable)",
                sites.len(),
                config.sites.len()
            );
            for site in &sites {
                log::info!("  {} [{}] {}", site.slug(), site.region, site.url);
            }
        }

        Command::Info => {
            log::info!("Storage directory: {}", config.paths.storage_dir.display());
            log::info!("Feeds directory: {}", config.paths.feeds_dir.display());
            log::info!("Audit log: {}", config.paths.audit_log.display());

            let storage = LocalStorage::new(&config.paths.storage_dir);
            if !storage.path(planwatch::storage::local::STATE_KEY).exists() {
                log::info!("No state found yet.");
                return Ok(());
            }

            let store = StateStore::load(Box::new(storage), config.state.max_events).await;
            let metadata = &store.document().metadata;
            if let Some(version) = metadata.get("version") {
                log::info!("State version: {}", version);
            }
            if let Some(saved) = metadata.get("last_save") {
                log::info!("Last saved: {}", saved);
            }
            log::info!(
                "{} sites tracked, {} events in history",
                store.records().len(),
                store.events().len()
            );
            for (slug, record) in store.records() {
                log::info!(
                    "  {} last change {}, last checked {}",
                    slug,
                    record.last_change.to_rfc3339(),
                    record.last_checked.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
