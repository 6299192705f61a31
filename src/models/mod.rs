// src/models/mod.rs

//! Domain models for the watcher.
//!
//! Configuration, watched site descriptors and the persisted state entities.

mod config;
mod site;
mod state;

// Re-export all public types
pub use config::{
    Config, FeedConfig, MAX_RETENTION_DAYS, PathsConfig, StateConfig, WatcherConfig,
};
pub use site::{ExtractionMode, SiteDescriptor, slugify};
pub use state::{ChangeEvent, ChangeKind, STATE_VERSION, SiteRecord, StateDocument};
