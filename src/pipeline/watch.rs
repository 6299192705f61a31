// src/pipeline/watch.rs

//! Watch pipeline: fetch, extract, detect, persist, publish.
//!
//! Fetching and extraction run concurrently per site. Their results are
//! consumed by a single loop, the only writer of the [`StateStore`], so
//! detection for one site never races another.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, SiteDescriptor};
use crate::pipeline::feed::FeedBuilder;
use crate::pipeline::publish::{PublishReport, publish_feeds};
use crate::services::detector::{ChangeDetector, Detection, content_hash, short_hash};
use crate::services::extractor::{Extraction, extract};
use crate::services::fetcher::PageSource;
use crate::storage::{LocalStorage, StateStore};

/// Summary of one watch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub sites: usize,
    pub initial: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Fetch failures (transport, timeout, non-2xx)
    pub fetch_failures: usize,
    /// Blank responses and pages where no node could be selected
    pub empty: usize,
    /// Detection errors
    pub errors: usize,
    pub feeds: PublishReport,
}

impl WatchOutcome {
    /// Sites that produced an event this run.
    pub fn changed(&self) -> usize {
        self.initial + self.updated
    }
}

/// Run the pipeline once over all configured sites.
pub async fn run_once(config: &Config, source: &dyn PageSource) -> Result<WatchOutcome> {
    let sites = config.active_sites();
    if sites.is_empty() {
        return Err(AppError::config("No valid site configurations found"));
    }

    let state_storage = LocalStorage::new(&config.paths.storage_dir);
    let mut store = StateStore::load(Box::new(state_storage), config.state.max_events).await;
    let detector = ChangeDetector::new(config.state.preview_graphemes);
    let concurrency = config.watcher.max_concurrent.max(1);

    log::info!("Checking {} sites ({} concurrent)", sites.len(), concurrency);

    let mut outcome = WatchOutcome {
        sites: sites.len(),
        ..WatchOutcome::default()
    };

    let mut results = stream::iter(sites.iter())
        .map(|site| async move {
            let result = source
                .fetch(&site.url)
                .await
                .map(|markup| extract(&markup, site));
            (site, result)
        })
        .buffer_unordered(concurrency);

    while let Some((site, result)) = results.next().await {
        let extraction = match result {
            Ok(Some(extraction)) => extraction,
            Ok(None) => {
                outcome.empty += 1;
                log::warn!("No content extracted for {}", site.name);
                continue;
            }
            Err(e) => {
                outcome.fetch_failures += 1;
                log::warn!("Fetch failed for {}: {}", site.name, e);
                continue;
            }
        };

        let now = Utc::now();
        write_audit_line(config, site, &extraction, now).await;

        match detector.detect(&mut store, site, &extraction, now) {
            Ok(Detection::Initial(_)) => outcome.initial += 1,
            Ok(Detection::Updated(_)) => outcome.updated += 1,
            Ok(Detection::Unchanged) => outcome.unchanged += 1,
            Err(e) => {
                outcome.errors += 1;
                log::error!("Detection failed for {}: {}", site.name, e);
            }
        }
    }

    store.save().await?;

    let builder = FeedBuilder::new(config.feeds.clone());
    let feeds = builder.build_all(&store, &sites, Utc::now());
    let feed_storage = LocalStorage::new(&config.paths.feeds_dir);
    outcome.feeds = publish_feeds(&feed_storage, feeds).await;

    log::info!(
        "Run complete: {} changed, {} unchanged, {} failed, {} empty; {} feeds written",
        outcome.changed(),
        outcome.unchanged,
        outcome.fetch_failures,
        outcome.empty,
        outcome.feeds.written
    );
    Ok(outcome)
}

/// Run the pipeline every `watcher.interval_secs` until the process stops.
pub async fn run_watch(config: &Config, source: &dyn PageSource) -> Result<()> {
    let interval = Duration::from_secs(config.watcher.interval_secs.max(1));
    loop {
        if let Err(e) = run_once(config, source).await {
            log::error!("Run failed: {}", e);
        }
        log::info!("Next run in {}s", interval.as_secs());
        tokio::time::sleep(interval).await;
    }
}

/// Tab-separated audit line for one extraction.
pub fn audit_line(
    site: &SiteDescriptor,
    extraction: &Extraction,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}\t{}\t{}\t{}\tnodes={}\thash={}",
        at.to_rfc3339(),
        site.slug(),
        extraction.strategy,
        extraction.selectors_used.join(","),
        extraction.node_count,
        short_hash(&content_hash(&extraction.comparison))
    )
}

async fn write_audit_line(
    config: &Config,
    site: &SiteDescriptor,
    extraction: &Extraction,
    at: DateTime<Utc>,
) {
    let line = audit_line(site, extraction, at);
    if let Err(e) = LocalStorage::append_line(&config.paths.audit_log, &line).await {
        log::warn!("Could not write selection audit: {}", e);
    }
}
