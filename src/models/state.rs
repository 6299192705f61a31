// src/models/state.rs

//! Persisted state entities: site records and change events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version written into new state documents.
pub const STATE_VERSION: &str = "2.0";

/// Latest known state of one watched site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Site display name
    pub name: String,

    /// Region label
    #[serde(rename = "bundesland")]
    pub region: String,

    /// Page URL
    pub url: String,

    /// SHA-256 of the normalized comparison text behind `current_content`
    pub hash: String,

    /// Display content of the latest detected version
    #[serde(default)]
    pub current_content: String,

    /// Display content from before the latest detected change
    #[serde(default)]
    pub previous_content: String,

    pub first_seen: DateTime<Utc>,
    pub last_change: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,

    /// Plain-text length of the latest extraction
    #[serde(default)]
    pub content_length: usize,

    /// Selectors that produced the latest extraction
    #[serde(default)]
    pub selectors_used: Vec<String>,
}

/// Kind of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// First capture of a site
    Initial,
    /// Content differs from the stored version
    Update,
}

/// One entry of the change history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Stable identifier: `<slug>:<checked_at>`
    pub id: String,

    pub slug: String,
    pub name: String,

    #[serde(rename = "bundesland")]
    pub region: String,

    pub url: String,

    /// When the site was first seen; absent in histories written before it was tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,

    /// When the change was observed; orders and dates the event everywhere
    #[serde(alias = "timestamp")]
    pub checked_at: DateTime<Utc>,

    #[serde(alias = "change_type")]
    pub kind: ChangeKind,

    #[serde(default)]
    pub selectors_used: Vec<String>,

    /// Description of the matched nodes
    #[serde(default)]
    pub matched_nodes: String,

    /// Added-content fragment (HTML)
    #[serde(default)]
    pub changes_html: String,

    /// Prior-content fragment (HTML)
    #[serde(default)]
    pub previous_html: String,
}

impl ChangeEvent {
    /// Build the stable identifier for an event.
    pub fn make_id(slug: &str, checked_at: &DateTime<Utc>) -> String {
        format!("{}:{}", slug, checked_at.to_rfc3339())
    }
}

/// Root of the persisted state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    /// Slug to record
    #[serde(default)]
    pub sites: BTreeMap<String, SiteRecord>,

    /// Change history, oldest first
    #[serde(default)]
    pub items: Vec<ChangeEvent>,

    /// Opaque metadata, preserved across loads
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StateDocument {
    /// Create an empty document stamped with the schema version and `stamp_key`.
    pub fn fresh(stamp_key: &str, now: DateTime<Utc>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("version".into(), Value::from(STATE_VERSION));
        metadata.insert(stamp_key.into(), Value::from(now.to_rfc3339()));
        Self {
            sites: BTreeMap::new(),
            items: Vec::new(),
            metadata,
        }
    }
}
