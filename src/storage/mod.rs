//! State persistence.
//!
//! [`StateStore`] owns the [`StateDocument`] for a run and is the only place
//! that mutates it: record updates, history appends with retention, and
//! atomic saves all go through here. Bytes reach the disk through a
//! [`StateBackend`].

pub mod local;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, STATE_VERSION, SiteRecord, StateDocument};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for state storage backends.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the raw state document, `None` if it was never written.
    async fn read_state(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the raw state document atomically.
    async fn write_state(&self, bytes: &[u8]) -> Result<()>;

    /// Location for log messages.
    fn describe(&self) -> String;
}

/// A mutation of one site record.
#[derive(Debug, Clone)]
pub enum RecordUpdate {
    /// First sighting of a site
    Created(SiteRecord),
    /// Fetched again without a change
    Checked { at: DateTime<Utc> },
    /// Content changed; the current content becomes the previous one
    Changed {
        hash: String,
        content: String,
        content_length: usize,
        selectors_used: Vec<String>,
        at: DateTime<Utc>,
    },
}

/// Typed access to the persisted state.
pub struct StateStore {
    backend: Box<dyn StateBackend>,
    document: StateDocument,
    max_events: usize,
}

impl StateStore {
    /// Load the state document, starting empty when it is missing or unreadable.
    pub async fn load(backend: Box<dyn StateBackend>, max_events: usize) -> Self {
        let now = Utc::now();
        let document = match backend.read_state().await {
            Ok(None) => {
                log::info!("No state found at {}, starting fresh", backend.describe());
                StateDocument::fresh("created", now)
            }
            Ok(Some(bytes)) => match serde_json::from_slice::<StateDocument>(&bytes) {
                Ok(mut document) => {
                    if document.metadata.is_empty() {
                        document
                            .metadata
                            .insert("version".into(), Value::from(STATE_VERSION));
                        document
                            .metadata
                            .insert("migrated".into(), Value::from(now.to_rfc3339()));
                    }
                    document
                }
                Err(e) => {
                    log::error!(
                        "Could not parse state {}: {}. Starting fresh.",
                        backend.describe(),
                        e
                    );
                    StateDocument::fresh("error_recovery", now)
                }
            },
            Err(e) => {
                log::error!(
                    "Could not read state {}: {}. Starting fresh.",
                    backend.describe(),
                    e
                );
                StateDocument::fresh("error_recovery", now)
            }
        };

        Self {
            backend,
            document,
            max_events: max_events.max(1),
        }
    }

    /// Record of a site, if it has been seen before.
    pub fn record(&self, slug: &str) -> Option<&SiteRecord> {
        self.document.sites.get(slug)
    }

    /// All site records by slug.
    pub fn records(&self) -> &BTreeMap<String, SiteRecord> {
        &self.document.sites
    }

    /// Change history, oldest first.
    pub fn events(&self) -> &[ChangeEvent] {
        &self.document.items
    }

    /// The underlying document.
    pub fn document(&self) -> &StateDocument {
        &self.document
    }

    /// Apply an update to the record of `slug`.
    pub fn apply_change(&mut self, slug: &str, update: RecordUpdate) -> Result<()> {
        if let RecordUpdate::Created(record) = update {
            self.document.sites.insert(slug.to_string(), record);
            return Ok(());
        }

        let record = self
            .document
            .sites
            .get_mut(slug)
            .ok_or_else(|| AppError::validation(format!("No state record for site '{slug}'")))?;

        match update {
            RecordUpdate::Created(_) => {}
            RecordUpdate::Checked { at } => {
                record.last_checked = at;
            }
            RecordUpdate::Changed {
                hash,
                content,
                content_length,
                selectors_used,
                at,
            } => {
                record.previous_content = std::mem::replace(&mut record.current_content, content);
                record.hash = hash;
                record.content_length = content_length;
                record.selectors_used = selectors_used;
                record.last_change = at;
                record.last_checked = at;
            }
        }
        Ok(())
    }

    /// Append a change event, dropping the oldest beyond the retention limit.
    pub fn append_event(&mut self, event: ChangeEvent) {
        self.document.items.push(event);
        self.enforce_retention();
    }

    /// Events of `active` sites observed at or after `cutoff`.
    pub fn events_for_feeds(
        &self,
        active: &HashSet<String>,
        cutoff: DateTime<Utc>,
    ) -> Vec<&ChangeEvent> {
        self.document
            .items
            .iter()
            .filter(|event| active.contains(&event.slug) && event.checked_at >= cutoff)
            .collect()
    }

    fn enforce_retention(&mut self) {
        let items = &mut self.document.items;
        if items.len() > self.max_events {
            let excess = items.len() - self.max_events;
            items.drain(..excess);
        }
    }

    /// Persist the document atomically.
    pub async fn save(&mut self) -> Result<()> {
        self.enforce_retention();
        self.document
            .metadata
            .insert("last_save".into(), Value::from(Utc::now().to_rfc3339()));

        let bytes = serde_json::to_vec_pretty(&self.document)?;
        self.backend.write_state(&bytes).await?;
        log::debug!(
            "State saved to {} ({} sites, {} items)",
            self.backend.describe(),
            self.document.sites.len(),
            self.document.items.len()
        );
        Ok(())
    }
}
