//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SiteDescriptor;

/// Upper bound for `feeds.retention_days`.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and scheduling settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Feed rendering settings
    #[serde(default)]
    pub feeds: FeedConfig,

    /// State retention settings
    #[serde(default)]
    pub state: StateConfig,

    /// Watched sites
    #[serde(default)]
    pub sites: Vec<SiteDescriptor>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Sites carrying both a name and a URL. Incomplete entries are skipped.
    pub fn active_sites(&self) -> Vec<SiteDescriptor> {
        self.sites
            .iter()
            .filter(|site| {
                let complete = site.is_complete();
                if !complete {
                    log::warn!("Skipping site entry without name or url: {:?}", site.name);
                }
                complete
            })
            .cloned()
            .collect()
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.watcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("watcher.user_agent is empty"));
        }
        if self.watcher.timeout_secs == 0 {
            return Err(AppError::validation("watcher.timeout_secs must be > 0"));
        }
        if self.watcher.max_concurrent == 0 {
            return Err(AppError::validation("watcher.max_concurrent must be > 0"));
        }
        if self.state.max_events == 0 {
            return Err(AppError::validation("state.max_events must be > 0"));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.feeds.retention_days) {
            return Err(AppError::validation(format!(
                "feeds.retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }

        let sites = self.active_sites();
        if sites.is_empty() {
            return Err(AppError::config("No valid site configurations found"));
        }
        for site in &sites {
            url::Url::parse(&site.url)
                .map_err(|e| AppError::validation(format!("{}: bad url: {}", site.name, e)))?;
        }
        Ok(())
    }
}

/// HTTP client and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-fetch timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Pause between runs when not started with `--once`
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            interval_secs: defaults::interval(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `state.json`
    #[serde(default = "defaults::storage_dir")]
    pub storage_dir: PathBuf,

    /// Directory receiving feed files
    #[serde(default = "defaults::feeds_dir")]
    pub feeds_dir: PathBuf,

    /// Append-only selection audit log
    #[serde(default = "defaults::audit_log")]
    pub audit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            storage_dir: defaults::storage_dir(),
            feeds_dir: defaults::feeds_dir(),
            audit_log: defaults::audit_log(),
        }
    }
}

/// Feed rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Events older than this are left out of feeds
    #[serde(default = "defaults::retention_days")]
    pub retention_days: i64,

    /// Maximum items in a per-site feed
    #[serde(default = "defaults::site_item_limit")]
    pub site_item_limit: usize,

    /// Maximum items in a region feed
    #[serde(default = "defaults::region_item_limit")]
    pub region_item_limit: usize,

    /// File name prefix of region feeds
    #[serde(default = "defaults::region_prefix")]
    pub region_prefix: String,

    /// Channel link of region feeds
    #[serde(default = "defaults::region_link")]
    pub region_link: String,

    /// Channel language
    #[serde(default = "defaults::language")]
    pub language: String,

    /// Feed file extension
    #[serde(default = "defaults::extension")]
    pub extension: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            retention_days: defaults::retention_days(),
            site_item_limit: defaults::site_item_limit(),
            region_item_limit: defaults::region_item_limit(),
            region_prefix: defaults::region_prefix(),
            region_link: defaults::region_link(),
            language: defaults::language(),
            extension: defaults::extension(),
        }
    }
}

/// State retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Change history length kept in `state.json`
    #[serde(default = "defaults::max_events")]
    pub max_events: usize,

    /// Length of the prior-content preview stored with each event
    #[serde(default = "defaults::preview_graphemes")]
    pub preview_graphemes: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_events: defaults::max_events(),
            preview_graphemes: defaults::preview_graphemes(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Watcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; planwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn interval() -> u64 {
        3600
    }

    // Path defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn feeds_dir() -> PathBuf {
        PathBuf::from("feeds")
    }
    pub fn audit_log() -> PathBuf {
        PathBuf::from("data/selection_audit.log")
    }

    // Feed defaults
    pub fn retention_days() -> i64 {
        120
    }
    pub fn site_item_limit() -> usize {
        20
    }
    pub fn region_item_limit() -> usize {
        50
    }
    pub fn region_prefix() -> String {
        "DE".into()
    }
    pub fn region_link() -> String {
        "https://example.invalid/".into()
    }
    pub fn language() -> String {
        "de-DE".into()
    }
    pub fn extension() -> String {
        "xml".into()
    }

    // State defaults
    pub fn max_events() -> usize {
        2000
    }
    pub fn preview_graphemes() -> usize {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
[watcher]
max_concurrent = 4

[paths]
storage_dir = "/tmp/planwatch"

[[sites]]
name = "Regionalplan Köln"
bundesland = "Nordrhein-Westfalen"
url = "https://example.com/koeln"
selectors = ["#content", ".news"]

[[sites]]
name = "Broken entry"

[[sites]]
name = "RP Kassel"
url = "https://example.com/kassel"
mode = "html"
update_frequency = "slow"
"##;

    #[test]
    fn parse_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.watcher.max_concurrent, 4);
        assert_eq!(config.watcher.timeout_secs, 30);
        assert_eq!(config.paths.storage_dir, PathBuf::from("/tmp/planwatch"));
        assert_eq!(config.feeds.retention_days, 120);
        assert_eq!(config.state.max_events, 2000);
        assert_eq!(config.sites.len(), 3);
    }

    #[test]
    fn active_sites_skip_incomplete_entries() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let sites = config.active_sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[1].region, "Unknown");
    }

    #[test]
    fn validate_sample_config_ok() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_config_without_sites() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.watcher.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_retention() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.feeds.retention_days = 100_000_000;
        assert!(config.validate().is_err());
        config.feeds.retention_days = 0;
        assert!(config.validate().is_err());
        config.feeds.retention_days = MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.sites[0].url = "not a url".into();
        assert!(config.validate().is_err());
    }
}
